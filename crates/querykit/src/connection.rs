//! A client bound to its configuration and transaction state.
//!
//! [`Connection`] wraps any [`GenericClient`] and adds what a bare client
//! cannot know on its own: the SQL dialect and policies from
//! [`ConnectionConfig`], structured logging of every statement, timeouts, and
//! the transaction depth that drives manual `begin` / `commit` / `rollback`.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use crate::client::{GenericClient, RecordStream, StreamingClient};
use crate::compile::BoundStatement;
use crate::config::{ConnectionConfig, NestedTransactionPolicy};
use crate::error::{DbError, DbResult};
use crate::record::Record;
use crate::transaction::Transaction;

const NO_PENDING_ROLLBACK: u32 = u32::MAX;

/// A database client with configuration, logging and transaction tracking.
///
/// Transactions are connection-scoped: statements issued through the connection
/// (or any [`Transaction`] handle borrowed from it) while a transaction is open
/// run inside it.
#[derive(Debug)]
pub struct Connection<C> {
    client: C,
    config: ConnectionConfig,
    depth: AtomicU32,
    /// Level a dropped handle asked to unwind to; applied before the next statement.
    pending_rollback: AtomicU32,
}

impl<C: GenericClient> Connection<C> {
    pub fn new(client: C) -> Self {
        Self::with_config(client, ConnectionConfig::new())
    }

    pub fn with_config(client: C, config: ConnectionConfig) -> Self {
        Self {
            client,
            config,
            depth: AtomicU32::new(0),
            pending_rollback: AtomicU32::new(NO_PENDING_ROLLBACK),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn into_client(self) -> C {
        self.client
    }

    /// Number of open transaction levels (0 = none, 1 = transaction, 2+ = savepoints).
    pub fn transaction_depth(&self) -> u32 {
        self.depth.load(Ordering::Acquire)
    }

    /// Open a transaction, or a savepoint when one is already open.
    pub async fn begin(&self) -> DbResult<()> {
        self.settle().await?;
        self.begin_level().await.map(|_| ())
    }

    /// Commit the innermost level.
    pub async fn commit(&self) -> DbResult<()> {
        self.settle().await?;
        self.commit_level().await
    }

    /// Roll back the innermost level.
    pub async fn rollback(&self) -> DbResult<()> {
        self.settle().await?;
        self.rollback_level().await
    }

    /// Open a transaction (or savepoint) and return a handle scoped to it.
    ///
    /// Dropping the handle without calling [`Transaction::commit`] or
    /// [`Transaction::rollback`] rolls the level back before the connection's
    /// next statement.
    pub async fn begin_transaction(&self) -> DbResult<Transaction<'_, C>> {
        self.settle().await?;
        let level = self.begin_level().await?;
        Ok(Transaction::new(self, level))
    }

    /// Run `work` inside a transaction.
    ///
    /// Commits when `work` returns `Ok`. On `Err` the transaction is rolled back
    /// and the same error is returned; if the rollback fails as well the result
    /// is [`DbError::RollbackFailed`] carrying both.
    ///
    /// ```ignore
    /// conn.transaction(async |tx| {
    ///     table("customers").insert(tx, [("id", "eko"), ("name", "Eko")]).await?;
    ///     table("customers").insert(tx, [("id", "eko"), ("name", "Eko")]).await?;
    ///     Ok(())
    /// })
    /// .await?;
    /// ```
    pub async fn transaction<T, F>(&self, work: F) -> DbResult<T>
    where
        F: AsyncFnOnce(&Transaction<'_, C>) -> DbResult<T>,
    {
        let tx = self.begin_transaction().await?;
        let result = work(&tx).await;
        tx.finish(result).await
    }

    pub(crate) async fn begin_level(&self) -> DbResult<u32> {
        let depth = self.transaction_depth();
        if depth == 0 {
            self.client.batch_execute("BEGIN").await?;
        } else {
            if self.config.nested_transactions == NestedTransactionPolicy::Reject {
                return Err(DbError::transaction_state(
                    "a transaction is already active and nested transactions are disabled",
                ));
            }
            if !self.config.dialect.supports_savepoints() {
                return Err(DbError::unsupported(self.config.dialect, "SAVEPOINT"));
            }
            self.client
                .batch_execute(&format!("SAVEPOINT trans{}", depth + 1))
                .await?;
        }
        let level = depth + 1;
        self.depth.store(level, Ordering::Release);
        tracing::debug!(target: "querykit.tx", level, "begin");
        Ok(level)
    }

    pub(crate) async fn commit_level(&self) -> DbResult<()> {
        let depth = self.transaction_depth();
        match depth {
            0 => {
                return Err(DbError::transaction_state(
                    "commit without an active transaction",
                ));
            }
            1 => {
                // The server ends the transaction whether or not COMMIT succeeds.
                self.depth.store(0, Ordering::Release);
                self.client.batch_execute("COMMIT").await?;
            }
            _ => {
                self.client
                    .batch_execute(&format!("RELEASE SAVEPOINT trans{depth}"))
                    .await?;
                self.depth.store(depth - 1, Ordering::Release);
            }
        }
        tracing::debug!(target: "querykit.tx", level = depth, "commit");
        Ok(())
    }

    pub(crate) async fn rollback_level(&self) -> DbResult<()> {
        let depth = self.transaction_depth();
        match depth {
            0 => {
                return Err(DbError::transaction_state(
                    "rollback without an active transaction",
                ));
            }
            1 => {
                self.depth.store(0, Ordering::Release);
                self.client.batch_execute("ROLLBACK").await?;
            }
            _ => {
                self.client
                    .batch_execute(&format!("ROLLBACK TO SAVEPOINT trans{depth}"))
                    .await?;
                self.depth.store(depth - 1, Ordering::Release);
            }
        }
        tracing::debug!(target: "querykit.tx", level = depth, "rollback");
        Ok(())
    }

    /// Record that every level from `level` up must be rolled back.
    pub(crate) fn schedule_rollback(&self, level: u32) {
        self.pending_rollback.fetch_min(level, Ordering::AcqRel);
    }

    /// Apply a rollback scheduled by a dropped transaction handle.
    async fn settle(&self) -> DbResult<()> {
        let target = self
            .pending_rollback
            .swap(NO_PENDING_ROLLBACK, Ordering::AcqRel);
        if target == NO_PENDING_ROLLBACK {
            return Ok(());
        }
        while self.transaction_depth() >= target && self.transaction_depth() > 0 {
            self.rollback_level().await?;
        }
        Ok(())
    }

    /// Log, time and bound one statement.
    async fn observe<T, F>(&self, stmt: &BoundStatement, fut: F) -> DbResult<T>
    where
        F: Future<Output = DbResult<T>> + Send,
    {
        tracing::debug!(
            target: "querykit.sql",
            sql = %stmt.sql(),
            bindings = stmt.bindings().len(),
            depth = self.transaction_depth(),
            "executing"
        );
        let start = Instant::now();
        let result = match self.config.query_timeout {
            Some(timeout) => tokio::time::timeout(timeout, fut)
                .await
                .map_err(|_| DbError::Timeout(timeout))?,
            None => fut.await,
        };
        let elapsed = start.elapsed();
        if let Some(threshold) = self.config.slow_query_threshold
            && elapsed >= threshold
        {
            tracing::warn!(
                target: "querykit.sql",
                sql = %stmt.sql(),
                elapsed_ms = elapsed.as_millis() as u64,
                "slow query"
            );
        }
        if let Err(err) = &result {
            tracing::debug!(target: "querykit.sql", error = %err, "statement failed");
        }
        result
    }
}

impl<C: GenericClient> GenericClient for Connection<C> {
    async fn query(&self, stmt: &BoundStatement) -> DbResult<Vec<Record>> {
        self.settle().await?;
        self.observe(stmt, self.client.query(stmt)).await
    }

    async fn execute(&self, stmt: &BoundStatement) -> DbResult<u64> {
        self.settle().await?;
        self.observe(stmt, self.client.execute(stmt)).await
    }

    async fn batch_execute(&self, sql: &str) -> DbResult<()> {
        self.settle().await?;
        tracing::debug!(target: "querykit.sql", sql, "batch");
        self.client.batch_execute(sql).await
    }

    fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn in_transaction(&self) -> bool {
        self.transaction_depth() > 0
    }
}

impl<C: StreamingClient> StreamingClient for Connection<C> {
    async fn query_stream(&self, stmt: &BoundStatement) -> DbResult<RecordStream> {
        self.settle().await?;
        self.observe(stmt, self.client.query_stream(stmt)).await
    }
}

/// Connect to PostgreSQL without TLS and drive the connection on a background task.
///
/// ```ignore
/// let conn = querykit::connect(&database_url, ConnectionConfig::new()).await?;
/// ```
pub async fn connect(
    database_url: &str,
    config: ConnectionConfig,
) -> DbResult<Connection<tokio_postgres::Client>> {
    let (client, connection) = tokio_postgres::connect(database_url, tokio_postgres::NoTls)
        .await
        .map_err(DbError::from_db_error)?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(target: "querykit.conn", error = %e, "connection error");
        }
    });
    Ok(Connection::with_config(client, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockClient;

    #[tokio::test]
    async fn manual_commit_without_begin_is_a_state_error() {
        let conn = Connection::new(MockClient::empty());
        let err = conn.commit().await.unwrap_err();
        assert!(err.is_transaction_state());
        assert!(conn.rollback().await.unwrap_err().is_transaction_state());
        assert!(conn.client().batches().is_empty());
    }

    #[tokio::test]
    async fn nested_begin_uses_savepoints() {
        let conn = Connection::new(MockClient::empty());
        conn.begin().await.unwrap();
        conn.begin().await.unwrap();
        assert_eq!(conn.transaction_depth(), 2);
        conn.rollback().await.unwrap();
        conn.commit().await.unwrap();
        assert_eq!(conn.transaction_depth(), 0);
        assert_eq!(
            conn.client().batches(),
            vec![
                "BEGIN",
                "SAVEPOINT trans2",
                "ROLLBACK TO SAVEPOINT trans2",
                "COMMIT"
            ]
        );
    }

    #[tokio::test]
    async fn nested_begin_can_be_rejected() {
        let config = ConnectionConfig::new().nested_transactions(NestedTransactionPolicy::Reject);
        let conn = Connection::with_config(MockClient::empty(), config);
        conn.begin().await.unwrap();
        assert!(conn.begin().await.unwrap_err().is_transaction_state());
        assert_eq!(conn.transaction_depth(), 1);
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let client = MockClient::empty().with_delay(std::time::Duration::from_millis(200));
        let config = ConnectionConfig::new().query_timeout(std::time::Duration::from_millis(10));
        let conn = Connection::with_config(client, config);
        let stmt = BoundStatement::new("SELECT 1", vec![]);
        assert!(conn.query(&stmt).await.unwrap_err().is_timeout());
    }
}
