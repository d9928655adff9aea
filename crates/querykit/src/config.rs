//! Connection-level configuration.

use std::time::Duration;

use crate::dialect::Dialect;

/// What to do with `lock_for_update` / `lock_for_share` when no transaction is open.
///
/// Outside a transaction the lock is released as soon as the statement finishes,
/// so it rarely does what the caller meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockPolicy {
    /// Send the lock clause unchanged.
    Ignore,
    /// Send the lock clause and emit a warning on `querykit.lock`.
    #[default]
    Warn,
    /// Drop the lock clause silently.
    Strip,
    /// Refuse with [`crate::DbError::TransactionState`].
    Reject,
}

/// Behavior of `begin` while a transaction is already open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NestedTransactionPolicy {
    /// Open a savepoint (when the dialect supports them).
    #[default]
    Savepoint,
    /// Refuse with [`crate::DbError::TransactionState`].
    Reject,
}

/// Policy for DELETE/UPDATE statements without a WHERE clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DangerousDmlPolicy {
    #[default]
    Allow,
    Warn,
    Error,
}

/// Configuration carried by a [`crate::Connection`].
///
/// ```ignore
/// let config = ConnectionConfig::new()
///     .dialect(Dialect::Postgres)
///     .query_timeout(Duration::from_secs(5))
///     .delete_without_where(DangerousDmlPolicy::Error);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub dialect: Dialect,
    pub lock_outside_transaction: LockPolicy,
    pub nested_transactions: NestedTransactionPolicy,
    pub delete_without_where: DangerousDmlPolicy,
    pub update_without_where: DangerousDmlPolicy,
    /// `None` means no timeout (default).
    pub query_timeout: Option<Duration>,
    /// Statements slower than this are logged at WARN.
    pub slow_query_threshold: Option<Duration>,
}

/// Configuration used by clients that carry none of their own.
pub(crate) static DEFAULT_CONFIG: ConnectionConfig = ConnectionConfig::new();

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionConfig {
    pub const fn new() -> Self {
        Self {
            dialect: Dialect::Postgres,
            lock_outside_transaction: LockPolicy::Warn,
            nested_transactions: NestedTransactionPolicy::Savepoint,
            delete_without_where: DangerousDmlPolicy::Allow,
            update_without_where: DangerousDmlPolicy::Allow,
            query_timeout: None,
            slow_query_threshold: None,
        }
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn lock_outside_transaction(mut self, policy: LockPolicy) -> Self {
        self.lock_outside_transaction = policy;
        self
    }

    pub fn nested_transactions(mut self, policy: NestedTransactionPolicy) -> Self {
        self.nested_transactions = policy;
        self
    }

    pub fn delete_without_where(mut self, policy: DangerousDmlPolicy) -> Self {
        self.delete_without_where = policy;
        self
    }

    pub fn update_without_where(mut self, policy: DangerousDmlPolicy) -> Self {
        self.update_without_where = policy;
        self
    }

    /// Set the query timeout duration.
    ///
    /// Statements exceeding this duration return [`crate::DbError::Timeout`].
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    pub fn slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = Some(threshold);
        self
    }
}
