//! Error types for querykit

use std::time::Duration;
use thiserror::Error;

use crate::dialect::Dialect;

/// Result type alias for querykit operations
pub type DbResult<T> = Result<T, DbError>;

/// Boxed error kept as the `source()` of wrapped store errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Which integrity constraint rejected a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    Check,
    NotNull,
    Exclusion,
    Other,
}

impl ConstraintKind {
    fn from_sqlstate(code: &str) -> Self {
        match code {
            "23505" => Self::Unique,
            "23503" => Self::ForeignKey,
            "23514" => Self::Check,
            "23502" => Self::NotNull,
            "23P01" => Self::Exclusion,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unique => "unique",
            Self::ForeignKey => "foreign key",
            Self::Check => "check",
            Self::NotNull => "not null",
            Self::Exclusion => "exclusion",
            Self::Other => "integrity",
        };
        f.write_str(name)
    }
}

/// Error types for query building and execution
#[derive(Debug, Error)]
pub enum DbError {
    /// The builder state cannot be rendered into valid SQL
    #[error("Syntax error: {0}")]
    Syntax(String),

    /// Cursor pagination needs an explicit, named ORDER BY
    #[error("Ambiguous cursor order: {0}")]
    AmbiguousCursorOrder(String),

    /// The target dialect cannot express a requested clause
    #[error("{feature} is not supported by the {dialect} dialect")]
    UnsupportedFeature {
        dialect: Dialect,
        feature: &'static str,
    },

    /// Integrity constraint rejected the statement
    #[error("{kind} constraint violation on '{constraint}': {message}")]
    ConstraintViolation {
        kind: ConstraintKind,
        constraint: String,
        message: String,
        #[source]
        source: BoxError,
    },

    /// Database connection error
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Commit/rollback without an active transaction, or a stale handle
    #[error("Transaction state error: {0}")]
    TransactionState(String),

    /// Any other error reported by the database
    #[error("Query error: {0}")]
    Query(#[source] tokio_postgres::Error),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// A pagination cursor could not be decoded
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// Query timeout error
    #[error("Query timeout after {0:?}")]
    Timeout(Duration),

    /// The unit of work failed and the rollback that followed failed too
    #[error("{original} (rollback failed: {rollback})")]
    RollbackFailed {
        original: Box<DbError>,
        #[source]
        rollback: Box<DbError>,
    },

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),
}

impl DbError {
    /// Create a syntax error
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::Syntax(message.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn unsupported(dialect: Dialect, feature: &'static str) -> Self {
        Self::UnsupportedFeature { dialect, feature }
    }

    pub fn transaction_state(message: impl Into<String>) -> Self {
        Self::TransactionState(message.into())
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Syntax errors include an ambiguous cursor order.
    pub fn is_syntax(&self) -> bool {
        matches!(self, Self::Syntax(_) | Self::AmbiguousCursorOrder(_))
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedFeature { .. })
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            Self::ConstraintViolation {
                kind: ConstraintKind::Unique,
                ..
            }
        )
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    pub fn is_transaction_state(&self) -> bool {
        matches!(self, Self::TransactionState(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Parse a tokio_postgres error into a more specific DbError.
    ///
    /// SQLSTATE class `23` becomes [`DbError::ConstraintViolation`], class `08` and
    /// closed connections become [`DbError::Connection`]. The original error stays
    /// reachable through `source()`.
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let code = db_err.code().code();
            if code.starts_with("23") {
                return Self::ConstraintViolation {
                    kind: ConstraintKind::from_sqlstate(code),
                    constraint: db_err.constraint().unwrap_or("unknown").to_string(),
                    message: db_err.message().to_string(),
                    source: Box::new(err),
                };
            }
            if code.starts_with("08") {
                return Self::Connection {
                    message: db_err.message().to_string(),
                    source: Some(Box::new(err)),
                };
            }
        } else if err.is_closed() {
            return Self::Connection {
                message: "connection closed".to_string(),
                source: Some(Box::new(err)),
            };
        }
        Self::Query(err)
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for DbError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}
