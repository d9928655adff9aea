//! Hand-written SQL with `?` placeholders.

use crate::client::GenericClient;
use crate::compile::{BoundStatement, SqlWriter};
use crate::error::{DbError, DbResult};
use crate::qb::Raw;
use crate::record::{FromRecord, Record};
use crate::value::{FromValue, Value};

/// A raw statement whose `?` placeholders are rewritten for the client's dialect.
///
/// # Example
///
/// ```ignore
/// use querykit::query;
///
/// query("INSERT INTO customers (id, name) VALUES (?, ?)")
///     .bind("C1")
///     .bind("Eko")
///     .execute(&tx)
///     .await?;
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub struct Query {
    raw: Raw,
}

/// Create a new query with the given SQL
pub fn query(sql: impl Into<String>) -> Query {
    Query { raw: Raw::new(sql) }
}

impl Query {
    /// Bind the value for the next `?`.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.raw.bindings.push(value.into());
        self
    }

    pub fn sql(&self) -> &str {
        &self.raw.sql
    }

    /// Rewrite placeholders for `conn`'s dialect.
    fn statement(&self, conn: &impl GenericClient) -> DbResult<BoundStatement> {
        let mut w = SqlWriter::new(conn.config().dialect);
        w.push_raw(&self.raw)?;
        Ok(w.finish())
    }

    /// Execute the query and return all rows
    pub async fn fetch_all(&self, conn: &impl GenericClient) -> DbResult<Vec<Record>> {
        let stmt = self.statement(conn)?;
        conn.query(&stmt).await
    }

    /// Execute the query and return all rows mapped to type T
    pub async fn fetch_all_as<T: FromRecord>(&self, conn: &impl GenericClient) -> DbResult<Vec<T>> {
        let records = self.fetch_all(conn).await?;
        records.iter().map(T::from_record).collect()
    }

    /// Execute the query and return exactly one row
    pub async fn fetch_one(&self, conn: &impl GenericClient) -> DbResult<Record> {
        self.fetch_opt(conn)
            .await?
            .ok_or_else(|| DbError::not_found(format!("no row for: {}", self.raw.sql)))
    }

    /// Execute the query and return at most one row
    pub async fn fetch_opt(&self, conn: &impl GenericClient) -> DbResult<Option<Record>> {
        let stmt = self.statement(conn)?;
        conn.query_opt(&stmt).await
    }

    /// First column of the first row.
    pub async fn fetch_scalar<T: FromValue>(&self, conn: &impl GenericClient) -> DbResult<T> {
        self.fetch_one(conn).await?.try_get_index(0)
    }

    /// Execute the query and return the number of affected rows
    pub async fn execute(&self, conn: &impl GenericClient) -> DbResult<u64> {
        let stmt = self.statement(conn)?;
        conn.execute(&stmt).await
    }
}
