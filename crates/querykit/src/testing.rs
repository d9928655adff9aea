//! In-memory client for unit tests.

use std::sync::Mutex;
use std::time::Duration;

use crate::client::{GenericClient, RecordStream, StreamingClient};
use crate::compile::BoundStatement;
use crate::config::ConnectionConfig;
use crate::error::{DbError, DbResult};
use crate::record::Record;

pub(crate) enum Reply {
    Rows(Vec<Record>),
    Affected(u64),
}

type Responder = Box<dyn Fn(&BoundStatement) -> DbResult<Reply> + Send + Sync>;

/// Records every statement and answers through a responder closure.
pub(crate) struct MockClient {
    config: ConnectionConfig,
    responder: Responder,
    statements: Mutex<Vec<BoundStatement>>,
    batches: Mutex<Vec<String>>,
    failing_batch: Option<String>,
    delay: Option<Duration>,
    in_transaction: bool,
}

impl MockClient {
    pub(crate) fn new(
        responder: impl Fn(&BoundStatement) -> DbResult<Reply> + Send + Sync + 'static,
    ) -> Self {
        Self {
            config: ConnectionConfig::new(),
            responder: Box::new(responder),
            statements: Mutex::new(Vec::new()),
            batches: Mutex::new(Vec::new()),
            failing_batch: None,
            delay: None,
            in_transaction: false,
        }
    }

    /// Answers every query with no rows and every mutation with 0.
    pub(crate) fn empty() -> Self {
        Self::new(|_| Ok(Reply::Rows(Vec::new())))
    }

    pub(crate) fn with_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn fail_batch(mut self, sql: &str) -> Self {
        self.failing_batch = Some(sql.to_string());
        self
    }

    pub(crate) fn inside_transaction(mut self) -> Self {
        self.in_transaction = true;
        self
    }

    pub(crate) fn statements(&self) -> Vec<BoundStatement> {
        self.statements.lock().unwrap().clone()
    }

    pub(crate) fn sql_log(&self) -> Vec<String> {
        self.statements()
            .into_iter()
            .map(|s| s.sql().to_string())
            .collect()
    }

    pub(crate) fn batches(&self) -> Vec<String> {
        self.batches.lock().unwrap().clone()
    }

    async fn respond(&self, stmt: &BoundStatement) -> DbResult<Reply> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.statements.lock().unwrap().push(stmt.clone());
        (self.responder)(stmt)
    }
}

impl GenericClient for MockClient {
    async fn query(&self, stmt: &BoundStatement) -> DbResult<Vec<Record>> {
        match self.respond(stmt).await? {
            Reply::Rows(rows) => Ok(rows),
            Reply::Affected(_) => Ok(Vec::new()),
        }
    }

    async fn execute(&self, stmt: &BoundStatement) -> DbResult<u64> {
        match self.respond(stmt).await? {
            Reply::Rows(rows) => Ok(rows.len() as u64),
            Reply::Affected(n) => Ok(n),
        }
    }

    async fn batch_execute(&self, sql: &str) -> DbResult<()> {
        self.batches.lock().unwrap().push(sql.to_string());
        if self.failing_batch.as_deref() == Some(sql) {
            return Err(DbError::connection(format!("{sql} failed")));
        }
        Ok(())
    }

    fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}

impl StreamingClient for MockClient {
    async fn query_stream(&self, stmt: &BoundStatement) -> DbResult<RecordStream> {
        let rows = GenericClient::query(self, stmt).await?;
        Ok(RecordStream::new(futures_util::stream::iter(
            rows.into_iter().map(Ok),
        )))
    }
}

/// Parse the `LIMIT n OFFSET m` tail of a compiled statement.
pub(crate) fn window(sql: &str) -> (Option<usize>, usize) {
    let number_after = |keyword: &str| {
        sql.find(keyword).and_then(|pos| {
            sql[pos + keyword.len()..]
                .split_whitespace()
                .next()
                .and_then(|n| n.parse::<usize>().ok())
        })
    };
    (number_after(" LIMIT "), number_after(" OFFSET ").unwrap_or(0))
}
