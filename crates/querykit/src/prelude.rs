//! Convenient imports for typical `querykit` usage.
//!
//! ```ignore
//! use querykit::prelude::*;
//! ```

pub use crate::{
    Connection, ConnectionConfig, Cursor, DbError, DbResult, Direction, Filter, FromRecord,
    FromValue, GenericClient, Op, QueryBuilder, Record, Value, connect, query, table,
};

#[cfg(feature = "pool")]
pub use crate::{connect_pool, create_pool};
