//! Transaction handles and the `transaction!` macro.
//!
//! A [`Transaction`] is one level of work on a [`Connection`]: the outer
//! transaction or a savepoint inside it. It moves from `Active` to either
//! `Committed` or `RolledBack` exactly once, by consuming `commit` / `rollback`.
//!
//! # Example
//!
//! ```ignore
//! use querykit::{table, DbResult};
//!
//! # async fn demo(conn: &querykit::Connection<tokio_postgres::Client>) -> DbResult<()> {
//! querykit::transaction!(conn, tx, {
//!     table("products")
//!         .where_eq("id", "P0001")
//!         .decrement(&tx, "stock", 1)
//!         .await?;
//!     Ok(())
//! })?;
//! # Ok(()) }
//! ```

use crate::client::{GenericClient, RecordStream, StreamingClient};
use crate::compile::BoundStatement;
use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::error::{DbError, DbResult};
use crate::record::Record;

/// Runs the given block inside a database transaction.
///
/// - Begins a transaction (or a savepoint) via `$conn.begin_transaction().await`.
/// - Commits on `Ok(_)`.
/// - Rolls back on `Err(_)` and returns the same error.
///
/// The block must evaluate to `querykit::DbResult<T>`.
#[macro_export]
macro_rules! transaction {
    ($conn:expr, $tx:ident, $body:block) => {{
        let $tx = ($conn).begin_transaction().await?;
        let __querykit_tx_result = async { $body }.await;
        $tx.finish(__querykit_tx_result).await
    }};
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

/// One open transaction level on a [`Connection`].
#[must_use = "a transaction is rolled back when dropped without commit"]
pub struct Transaction<'a, C: GenericClient> {
    conn: &'a Connection<C>,
    level: u32,
    state: TransactionState,
}

impl<'a, C: GenericClient> Transaction<'a, C> {
    pub(crate) fn new(conn: &'a Connection<C>, level: u32) -> Self {
        Self {
            conn,
            level,
            state: TransactionState::Active,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// 1 for the outer transaction, 2+ for savepoints.
    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn connection(&self) -> &'a Connection<C> {
        self.conn
    }

    /// Open a savepoint inside this transaction.
    pub async fn begin_nested(&self) -> DbResult<Transaction<'a, C>> {
        self.conn.begin_transaction().await
    }

    fn ensure_innermost(&self) -> DbResult<()> {
        let depth = self.conn.transaction_depth();
        if depth != self.level {
            return Err(DbError::transaction_state(format!(
                "transaction level {} is not the innermost open level ({depth})",
                self.level
            )));
        }
        Ok(())
    }

    pub async fn commit(mut self) -> DbResult<()> {
        self.ensure_innermost()?;
        let result = self.conn.commit_level().await;
        // A failed RELEASE leaves the savepoint open; let drop unwind it.
        if result.is_ok() || self.level == 1 {
            self.state = TransactionState::Committed;
        }
        result
    }

    pub async fn rollback(mut self) -> DbResult<()> {
        self.ensure_innermost()?;
        let result = self.conn.rollback_level().await;
        if result.is_ok() || self.level == 1 {
            self.state = TransactionState::RolledBack;
        }
        result
    }

    /// Commit on `Ok`, roll back and return the original error on `Err`.
    #[doc(hidden)]
    pub async fn finish<T>(self, result: DbResult<T>) -> DbResult<T> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(error) => {
                tracing::debug!(target: "querykit.tx", %error, "rolling back after failure");
                match self.rollback().await {
                    Ok(()) => Err(error),
                    Err(rollback) => Err(DbError::RollbackFailed {
                        original: Box::new(error),
                        rollback: Box::new(rollback),
                    }),
                }
            }
        }
    }
}

impl<C: GenericClient> Drop for Transaction<'_, C> {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            tracing::warn!(
                target: "querykit.tx",
                level = self.level,
                "transaction dropped while active; rolling back before next statement"
            );
            self.conn.schedule_rollback(self.level);
        }
    }
}

impl<C: GenericClient> GenericClient for Transaction<'_, C> {
    async fn query(&self, stmt: &BoundStatement) -> DbResult<Vec<Record>> {
        GenericClient::query(self.conn, stmt).await
    }

    async fn execute(&self, stmt: &BoundStatement) -> DbResult<u64> {
        GenericClient::execute(self.conn, stmt).await
    }

    async fn batch_execute(&self, sql: &str) -> DbResult<()> {
        GenericClient::batch_execute(self.conn, sql).await
    }

    fn config(&self) -> &ConnectionConfig {
        self.conn.config()
    }

    fn in_transaction(&self) -> bool {
        true
    }
}

impl<C: StreamingClient> StreamingClient for Transaction<'_, C> {
    async fn query_stream(&self, stmt: &BoundStatement) -> DbResult<RecordStream> {
        StreamingClient::query_stream(self.conn, stmt).await
    }
}
