//! Fluent query builder.
//!
//! A [`QueryBuilder`] accumulates a [`QueryPlan`] through chained calls and only
//! talks to the database when one of its execution methods is awaited with a
//! client:
//!
//! ```ignore
//! use querykit::{table, Direction, Filter, Op};
//!
//! let rows = table("products")
//!     .select(&["id", "name", "price"])
//!     .where_cmp("price", Op::Gt, 1_000_000)
//!     .where_group(|g| g.where_eq("category_id", "SMARTPHONE").or_where_eq("category_id", "LAPTOP"))
//!     .order_by("price", Direction::Desc)
//!     .limit(10)
//!     .get(&conn)
//!     .await?;
//! ```
//!
//! WHERE composition lives on the [`Filter`] trait so that nested groups and
//! join clauses share the same methods.

mod builder;
mod exec;
pub mod expr;
mod filter;
pub mod plan;
mod stream;

#[cfg(test)]
mod tests;

pub use crate::dialect::LockMode;
pub use builder::{QueryBuilder, table};
pub use expr::{Combinator, Conditions, Op, Predicate, Raw};
pub use filter::{Filter, JoinClause, WhereGroup};
pub use plan::{Direction, JoinKind, JoinSpec, OrderBy, QueryPlan, Selection};
pub use stream::{CursorStream, LazyRecords};
