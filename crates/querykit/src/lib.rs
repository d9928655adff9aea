//! # querykit
//!
//! A fluent query builder for async PostgreSQL, with offset and cursor
//! pagination and transactions.
//!
//! ## Features
//!
//! - **Plans, not strings**: builders accumulate a [`QueryPlan`](qb::QueryPlan);
//!   nothing runs until an execution method is awaited with a client
//! - **Bindings line up**: placeholders are numbered in the order they are written,
//!   raw fragments included
//! - **Explicit connections**: every execution call takes a client, a
//!   [`Connection`] or a [`Transaction`]; there is no ambient connection
//! - **Dialect aware**: quoting, LIMIT/OFFSET and lock clauses for Postgres,
//!   MySQL and SQLite; unsupported clauses fail before reaching the server
//! - **Observable**: statements, transactions and locking reads are logged
//!   through `tracing`
//!
//! ## Query Builder
//!
//! ```ignore
//! use querykit::prelude::*;
//!
//! let conn = querykit::connect(&database_url, ConnectionConfig::new()).await?;
//!
//! table("categories")
//!     .insert(&conn, [("id", "GADGET"), ("name", "Gadget")])
//!     .await?;
//!
//! let products = table("products")
//!     .join("categories", "products.category_id", Op::Eq, "categories.id")
//!     .select(&["products.id", "products.name", "categories.name as category_name"])
//!     .where_cmp("products.price", Op::Gt, 15_000)
//!     .order_by("products.id", Direction::Asc)
//!     .get(&conn)
//!     .await?;
//!
//! let page = table("products")
//!     .order_by("id", Direction::Asc)
//!     .paginate(&conn, 10, 1)
//!     .await?;
//! ```
//!
//! ## Transactions
//!
//! ```ignore
//! conn.transaction(async |tx| {
//!     query("INSERT INTO customers (id, name) VALUES (?, ?)")
//!         .bind("C1")
//!         .bind("Eko")
//!         .execute(tx)
//!         .await?;
//!     Ok(())
//! })
//! .await?;
//! ```

pub mod client;
pub mod compile;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod paginate;
pub mod prelude;
pub mod qb;
pub mod query;
pub mod record;
pub mod transaction;
pub mod value;

#[cfg(test)]
mod testing;

pub use client::{GenericClient, RecordStream, StreamingClient};
pub use compile::{Aggregate, BoundStatement, SetValue};
pub use config::{ConnectionConfig, DangerousDmlPolicy, LockPolicy, NestedTransactionPolicy};
pub use connection::{Connection, connect};
pub use dialect::{Dialect, LockMode};
pub use error::{ConstraintKind, DbError, DbResult};
pub use paginate::{Cursor, CursorPage, Paginator, SimplePaginator};
pub use qb::{
    Combinator, CursorStream, Direction, Filter, JoinClause, JoinKind, LazyRecords, Op,
    QueryBuilder, WhereGroup, table,
};
pub use query::{Query, query};
pub use record::{FromRecord, Record};
pub use transaction::{Transaction, TransactionState};
pub use value::{ConversionError, FromValue, Value};

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(feature = "pool")]
pub use pool::{connect_pool, create_pool, create_pool_with_config, create_pool_with_tls};
