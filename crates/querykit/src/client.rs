//! Generic client trait for unified database access.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio_postgres::Row;

use crate::compile::BoundStatement;
use crate::config::{ConnectionConfig, DEFAULT_CONFIG};
use crate::error::{DbError, DbResult};
use crate::record::{Record, records_from_rows, row_columns};

/// A trait that unifies database clients, managed connections and transactions.
///
/// Every execution entry point takes `&impl GenericClient`, so the same builder
/// runs unchanged on a bare client, a [`crate::Connection`] or a
/// [`crate::Transaction`] handle.
pub trait GenericClient: Send + Sync {
    /// Execute a statement and return all rows.
    fn query(
        &self,
        stmt: &BoundStatement,
    ) -> impl std::future::Future<Output = DbResult<Vec<Record>>> + Send;

    /// Execute a statement and return the number of affected rows.
    fn execute(
        &self,
        stmt: &BoundStatement,
    ) -> impl std::future::Future<Output = DbResult<u64>> + Send;

    /// Run one or more parameterless statements (transaction control).
    fn batch_execute(&self, sql: &str) -> impl std::future::Future<Output = DbResult<()>> + Send;

    /// Execute a statement and return the first row, if any.
    fn query_opt(
        &self,
        stmt: &BoundStatement,
    ) -> impl std::future::Future<Output = DbResult<Option<Record>>> + Send {
        async move { Ok(self.query(stmt).await?.into_iter().next()) }
    }

    /// Configuration that shapes compilation and policies on this client.
    ///
    /// Clients that carry none use [`ConnectionConfig::new`].
    fn config(&self) -> &ConnectionConfig {
        &DEFAULT_CONFIG
    }

    /// Whether statements on this client run inside an open transaction.
    fn in_transaction(&self) -> bool {
        false
    }
}

impl<C: GenericClient> GenericClient for &C {
    fn query(
        &self,
        stmt: &BoundStatement,
    ) -> impl std::future::Future<Output = DbResult<Vec<Record>>> + Send {
        (**self).query(stmt)
    }

    fn execute(
        &self,
        stmt: &BoundStatement,
    ) -> impl std::future::Future<Output = DbResult<u64>> + Send {
        (**self).execute(stmt)
    }

    fn batch_execute(&self, sql: &str) -> impl std::future::Future<Output = DbResult<()>> + Send {
        (**self).batch_execute(sql)
    }

    fn config(&self) -> &ConnectionConfig {
        (**self).config()
    }

    fn in_transaction(&self) -> bool {
        (**self).in_transaction()
    }
}

impl GenericClient for tokio_postgres::Client {
    async fn query(&self, stmt: &BoundStatement) -> DbResult<Vec<Record>> {
        let rows = tokio_postgres::Client::query(self, stmt.sql(), &stmt.params_ref())
            .await
            .map_err(DbError::from_db_error)?;
        records_from_rows(&rows)
    }

    async fn execute(&self, stmt: &BoundStatement) -> DbResult<u64> {
        tokio_postgres::Client::execute(self, stmt.sql(), &stmt.params_ref())
            .await
            .map_err(DbError::from_db_error)
    }

    async fn batch_execute(&self, sql: &str) -> DbResult<()> {
        tokio_postgres::Client::batch_execute(self, sql)
            .await
            .map_err(DbError::from_db_error)
    }
}

impl GenericClient for tokio_postgres::Transaction<'_> {
    async fn query(&self, stmt: &BoundStatement) -> DbResult<Vec<Record>> {
        let rows = tokio_postgres::Transaction::query(self, stmt.sql(), &stmt.params_ref())
            .await
            .map_err(DbError::from_db_error)?;
        records_from_rows(&rows)
    }

    async fn execute(&self, stmt: &BoundStatement) -> DbResult<u64> {
        tokio_postgres::Transaction::execute(self, stmt.sql(), &stmt.params_ref())
            .await
            .map_err(DbError::from_db_error)
    }

    async fn batch_execute(&self, sql: &str) -> DbResult<()> {
        tokio_postgres::Transaction::batch_execute(self, sql)
            .await
            .map_err(DbError::from_db_error)
    }

    fn in_transaction(&self) -> bool {
        true
    }
}

/// A stream of records over one open server-side result.
///
/// This is a type-erased wrapper so that different client implementations can
/// return a uniform streaming type.
#[must_use]
pub struct RecordStream {
    inner: Pin<Box<dyn Stream<Item = DbResult<Record>> + Send>>,
}

impl RecordStream {
    /// Create a new `RecordStream` from any compatible stream.
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = DbResult<Record>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }
}

impl Stream for RecordStream {
    type Item = DbResult<Record>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// Streaming query support.
///
/// Separate from [`GenericClient`] so that only clients that can hold a single
/// result open (e.g. via `tokio-postgres`'s `query_raw`) need to implement it.
pub trait StreamingClient: GenericClient {
    /// Execute a statement and return a `RecordStream` for incremental consumption.
    fn query_stream(
        &self,
        stmt: &BoundStatement,
    ) -> impl std::future::Future<Output = DbResult<RecordStream>> + Send;
}

impl<C: StreamingClient> StreamingClient for &C {
    fn query_stream(
        &self,
        stmt: &BoundStatement,
    ) -> impl std::future::Future<Output = DbResult<RecordStream>> + Send {
        (**self).query_stream(stmt)
    }
}

/// Maps driver rows to records, sharing one column list across the result.
struct MapRecordStream<S> {
    inner: Pin<Box<S>>,
    columns: Option<Arc<[String]>>,
}

impl<S> MapRecordStream<S> {
    fn new(stream: S) -> Self {
        Self {
            inner: Box::pin(stream),
            columns: None,
        }
    }
}

impl<S> Stream for MapRecordStream<S>
where
    S: Stream<Item = Result<Row, tokio_postgres::Error>> + Send + 'static,
{
    type Item = DbResult<Record>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(row))) => {
                let columns = self
                    .columns
                    .get_or_insert_with(|| row_columns(&row))
                    .clone();
                Poll::Ready(Some(Record::from_row(&row, &columns)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(DbError::from_db_error(e)))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl StreamingClient for tokio_postgres::Client {
    async fn query_stream(&self, stmt: &BoundStatement) -> DbResult<RecordStream> {
        let stream = tokio_postgres::Client::query_raw(self, stmt.sql(), stmt.bindings().iter())
            .await
            .map_err(DbError::from_db_error)?;
        Ok(RecordStream::new(MapRecordStream::new(stream)))
    }
}

impl StreamingClient for tokio_postgres::Transaction<'_> {
    async fn query_stream(&self, stmt: &BoundStatement) -> DbResult<RecordStream> {
        let stream =
            tokio_postgres::Transaction::query_raw(self, stmt.sql(), stmt.bindings().iter())
                .await
                .map_err(DbError::from_db_error)?;
        Ok(RecordStream::new(MapRecordStream::new(stream)))
    }
}

// ===== deadpool-postgres support =====

#[cfg(feature = "pool")]
impl GenericClient for deadpool_postgres::Client {
    async fn query(&self, stmt: &BoundStatement) -> DbResult<Vec<Record>> {
        // Delegate to the deref target (tokio_postgres::Client).
        GenericClient::query(&***self, stmt).await
    }

    async fn execute(&self, stmt: &BoundStatement) -> DbResult<u64> {
        GenericClient::execute(&***self, stmt).await
    }

    async fn batch_execute(&self, sql: &str) -> DbResult<()> {
        GenericClient::batch_execute(&***self, sql).await
    }
}

#[cfg(feature = "pool")]
impl StreamingClient for deadpool_postgres::Client {
    async fn query_stream(&self, stmt: &BoundStatement) -> DbResult<RecordStream> {
        StreamingClient::query_stream(&***self, stmt).await
    }
}
