use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::StreamExt;

use crate::client::{GenericClient, RecordStream};
use crate::error::DbResult;
use crate::qb::builder::QueryBuilder;
use crate::record::Record;

/// Forward-only sequence over a query, fetched `chunk_size` rows at a time.
///
/// Nothing is fetched until the first record is requested, and no further
/// chunk is requested once the consumer stops pulling.
pub struct LazyRecords<'c, C> {
    conn: &'c C,
    builder: QueryBuilder,
    chunk_size: u64,
    page: u64,
    buffer: VecDeque<Record>,
    exhausted: bool,
}

impl<'c, C: GenericClient> LazyRecords<'c, C> {
    pub(crate) fn new(conn: &'c C, builder: QueryBuilder, chunk_size: u64) -> Self {
        Self {
            conn,
            builder,
            chunk_size,
            page: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Number of chunk queries issued so far.
    pub fn fetched_chunks(&self) -> u64 {
        self.page
    }

    pub async fn next_record(&mut self) -> DbResult<Option<Record>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_next_chunk().await?;
        }
        Ok(self.buffer.pop_front())
    }

    async fn fetch_next_chunk(&mut self) -> DbResult<()> {
        self.page += 1;
        let records = self
            .builder
            .clone()
            .for_page(self.page, self.chunk_size)
            .get(self.conn)
            .await?;
        if (records.len() as u64) < self.chunk_size {
            self.exhausted = true;
        }
        tracing::trace!(
            target: "querykit.cursor",
            page = self.page,
            rows = records.len(),
            "lazy chunk fetched"
        );
        self.buffer.extend(records);
        Ok(())
    }

    /// Pull at most `n` records.
    pub async fn take(&mut self, n: usize) -> DbResult<Vec<Record>> {
        let mut out = Vec::with_capacity(n.min(self.chunk_size as usize));
        while out.len() < n {
            match self.next_record().await? {
                Some(record) => out.push(record),
                None => break,
            }
        }
        Ok(out)
    }

    /// Drain the remaining records.
    pub async fn collect(mut self) -> DbResult<Vec<Record>> {
        let mut out = Vec::new();
        while let Some(record) = self.next_record().await? {
            out.push(record);
        }
        Ok(out)
    }

    /// Start again from the first chunk. The query is re-executed.
    pub fn restart(&mut self) {
        self.page = 0;
        self.buffer.clear();
        self.exhausted = false;
    }

    /// Adapt into a [`Stream`]. The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = DbResult<Record>> + 'c
    where
        C: 'c,
    {
        futures_util::stream::unfold(Some(self), |state| async move {
            let mut lazy = state?;
            match lazy.next_record().await {
                Ok(Some(record)) => Some((Ok(record), Some(lazy))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

/// Records streamed from one open server-side result.
///
/// Holds the result open until drained, closed or dropped.
#[must_use]
pub struct CursorStream {
    inner: Option<RecordStream>,
    sql: String,
    yielded: u64,
}

impl CursorStream {
    pub(crate) fn new(inner: RecordStream, sql: String) -> Self {
        Self {
            inner: Some(inner),
            sql,
            yielded: 0,
        }
    }

    pub async fn next_record(&mut self) -> DbResult<Option<Record>> {
        self.next().await.transpose()
    }

    /// Records yielded so far.
    pub fn yielded(&self) -> u64 {
        self.yielded
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Release the underlying result early.
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            tracing::debug!(
                target: "querykit.cursor",
                sql = %self.sql,
                yielded = self.yielded,
                "cursor closed before exhaustion"
            );
        }
    }
}

impl Stream for CursorStream {
    type Item = DbResult<Record>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };
        match Pin::new(inner).poll_next(cx) {
            Poll::Ready(Some(Ok(record))) => {
                this.yielded += 1;
                Poll::Ready(Some(Ok(record)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
            Poll::Ready(None) => {
                this.inner = None;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for CursorStream {
    fn drop(&mut self) {
        self.close();
    }
}
