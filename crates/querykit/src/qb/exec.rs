//! Execution methods on [`QueryBuilder`].

use std::borrow::Cow;
use std::ops::ControlFlow;

use rust_decimal::Decimal;

use crate::client::{GenericClient, StreamingClient};
use crate::compile::{self, Aggregate, BoundStatement, SetValue};
use crate::config::{DangerousDmlPolicy, LockPolicy};
use crate::dialect::LockMode;
use crate::error::{DbError, DbResult};
use crate::qb::builder::QueryBuilder;
use crate::qb::filter::Filter;
use crate::qb::plan::QueryPlan;
use crate::qb::stream::{CursorStream, LazyRecords};
use crate::record::{FromRecord, Record};
use crate::value::{FromValue, Value};

fn pairs<I, K, V>(values: I) -> Vec<(String, Value)>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    values
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

impl QueryBuilder {
    /// Plan adjusted for the client's lock policy.
    fn plan_for(&self, conn: &impl GenericClient) -> DbResult<Cow<'_, QueryPlan>> {
        if self.plan.lock == LockMode::None || conn.in_transaction() {
            return Ok(Cow::Borrowed(&self.plan));
        }
        match conn.config().lock_outside_transaction {
            LockPolicy::Ignore => Ok(Cow::Borrowed(&self.plan)),
            LockPolicy::Warn => {
                tracing::warn!(
                    target: "querykit.lock",
                    table = %self.plan.table,
                    lock = ?self.plan.lock,
                    "locking read outside a transaction; the lock is released when the statement ends"
                );
                Ok(Cow::Borrowed(&self.plan))
            }
            LockPolicy::Strip => {
                let mut plan = self.plan.clone();
                plan.lock = LockMode::None;
                Ok(Cow::Owned(plan))
            }
            LockPolicy::Reject => Err(DbError::transaction_state(
                "locking read requires an active transaction",
            )),
        }
    }

    fn select_statement(&self, conn: &impl GenericClient) -> DbResult<BoundStatement> {
        let plan = self.plan_for(conn)?;
        compile::compile(&plan, conn.config().dialect)
    }

    fn check_dangerous(
        &self,
        policy: DangerousDmlPolicy,
        verb: &'static str,
    ) -> DbResult<()> {
        if !self.plan.wheres.is_empty() {
            return Ok(());
        }
        match policy {
            DangerousDmlPolicy::Allow => Ok(()),
            DangerousDmlPolicy::Warn => {
                tracing::warn!(
                    target: "querykit.sql",
                    table = %self.plan.table,
                    "{verb} without WHERE affects every row"
                );
                Ok(())
            }
            DangerousDmlPolicy::Error => Err(DbError::syntax(format!(
                "{verb} without WHERE on '{}' is refused by configuration",
                self.plan.table
            ))),
        }
    }

    // ==================== Reads ====================

    /// Execute and return every row.
    pub async fn get(&self, conn: &impl GenericClient) -> DbResult<Vec<Record>> {
        let stmt = self.select_statement(conn)?;
        conn.query(&stmt).await
    }

    /// Execute and map every row to `T`.
    pub async fn get_as<T: FromRecord>(&self, conn: &impl GenericClient) -> DbResult<Vec<T>> {
        let records = self.get(conn).await?;
        records.iter().map(T::from_record).collect()
    }

    /// First row, if any.
    pub async fn first(&self, conn: &impl GenericClient) -> DbResult<Option<Record>> {
        let limited = self.clone().limit(1);
        let stmt = limited.select_statement(conn)?;
        conn.query_opt(&stmt).await
    }

    pub async fn first_as<T: FromRecord>(&self, conn: &impl GenericClient) -> DbResult<Option<T>> {
        let record = self.first(conn).await?;
        record.as_ref().map(T::from_record).transpose()
    }

    /// Values of a single column.
    pub async fn pluck<T: FromValue>(
        &self,
        conn: &impl GenericClient,
        column: &str,
    ) -> DbResult<Vec<T>> {
        let records = self.clone().select(&[column]).get(conn).await?;
        records.iter().map(|r| r.try_get_index::<T>(0)).collect()
    }

    pub async fn exists(&self, conn: &impl GenericClient) -> DbResult<bool> {
        let stmt = compile::compile_exists(&self.plan, conn.config().dialect)?;
        let record = conn.query_opt(&stmt).await?;
        match record {
            Some(record) => record.try_get_index::<bool>(0),
            None => Ok(false),
        }
    }

    /// Feed the result to `callback` in chunks of `size` rows.
    ///
    /// Each chunk is a separate query with an advancing window, so rows written
    /// between chunks may be seen twice or missed. A stable ORDER BY is required.
    /// The callback receives the 1-based chunk number and may stop early with
    /// `ControlFlow::Break`, in which case this returns `Ok(false)`.
    pub async fn chunk<F>(
        &self,
        conn: &impl GenericClient,
        size: u64,
        mut callback: F,
    ) -> DbResult<bool>
    where
        F: FnMut(Vec<Record>, u64) -> ControlFlow<()>,
    {
        self.check_chunkable(size)?;
        let mut page = 1;
        loop {
            let records = self.clone().for_page(page, size).get(conn).await?;
            let count = records.len() as u64;
            if count == 0 {
                break;
            }
            if callback(records, page).is_break() {
                return Ok(false);
            }
            if count < size {
                break;
            }
            page += 1;
        }
        Ok(true)
    }

    pub(crate) fn check_chunkable(&self, size: u64) -> DbResult<()> {
        if size == 0 {
            return Err(DbError::syntax("chunk size must be greater than zero"));
        }
        if self.plan.orders.is_empty() {
            return Err(DbError::syntax(
                "chunked reads need an ORDER BY to page deterministically",
            ));
        }
        Ok(())
    }

    /// Lazy, forward-only sequence backed by chunked queries of `chunk_size` rows.
    pub fn lazy<'c, C: GenericClient>(
        &self,
        conn: &'c C,
        chunk_size: u64,
    ) -> DbResult<LazyRecords<'c, C>> {
        self.check_chunkable(chunk_size)?;
        Ok(LazyRecords::new(conn, self.clone(), chunk_size))
    }

    /// Stream rows over one open server-side result.
    pub async fn cursor<C: StreamingClient>(&self, conn: &C) -> DbResult<CursorStream> {
        let dialect = conn.config().dialect;
        if !dialect.supports_server_cursors() {
            return Err(DbError::unsupported(dialect, "server-side cursors"));
        }
        let stmt = self.select_statement(conn)?;
        let stream = conn.query_stream(&stmt).await?;
        Ok(CursorStream::new(stream, stmt.sql().to_string()))
    }

    // ==================== Aggregates ====================

    /// Run `aggregate(column)` and return the raw value.
    pub async fn aggregate(
        &self,
        conn: &impl GenericClient,
        aggregate: Aggregate,
        column: &str,
    ) -> DbResult<Value> {
        let stmt =
            compile::compile_aggregate(&self.plan, conn.config().dialect, aggregate, column)?;
        let record = conn.query_opt(&stmt).await?;
        Ok(record
            .and_then(|r| r.into_values().into_iter().next())
            .unwrap_or(Value::Null))
    }

    /// `count(*)`
    pub async fn count(&self, conn: &impl GenericClient) -> DbResult<i64> {
        self.count_column(conn, "*").await
    }

    /// `count(column)`: rows where `column` is not NULL.
    pub async fn count_column(&self, conn: &impl GenericClient, column: &str) -> DbResult<i64> {
        let value = self.aggregate(conn, Aggregate::Count, column).await?;
        value
            .convert::<Option<i64>>()
            .map(Option::unwrap_or_default)
            .map_err(|e| DbError::decode("aggregate", e.to_string()))
    }

    /// Smallest value, `None` when no rows match.
    pub async fn min<T: FromValue>(
        &self,
        conn: &impl GenericClient,
        column: &str,
    ) -> DbResult<Option<T>> {
        self.typed_aggregate(conn, Aggregate::Min, column).await
    }

    /// Largest value, `None` when no rows match.
    pub async fn max<T: FromValue>(
        &self,
        conn: &impl GenericClient,
        column: &str,
    ) -> DbResult<Option<T>> {
        self.typed_aggregate(conn, Aggregate::Max, column).await
    }

    /// Sum of `column`; zero when no rows match.
    pub async fn sum<T: FromValue>(&self, conn: &impl GenericClient, column: &str) -> DbResult<T> {
        let value = match self.aggregate(conn, Aggregate::Sum, column).await? {
            Value::Null => Value::Int(0),
            other => other,
        };
        value
            .convert()
            .map_err(|e| DbError::decode("aggregate", e.to_string()))
    }

    /// Average of `column` as a decimal, `None` when no rows match.
    pub async fn avg(&self, conn: &impl GenericClient, column: &str) -> DbResult<Option<Decimal>> {
        self.typed_aggregate(conn, Aggregate::Avg, column).await
    }

    async fn typed_aggregate<T: FromValue>(
        &self,
        conn: &impl GenericClient,
        aggregate: Aggregate,
        column: &str,
    ) -> DbResult<Option<T>> {
        self.aggregate(conn, aggregate, column)
            .await?
            .convert::<Option<T>>()
            .map_err(|e| DbError::decode("aggregate", e.to_string()))
    }

    // ==================== Writes ====================

    /// Insert one row.
    pub async fn insert<I, K, V>(&self, conn: &impl GenericClient, values: I) -> DbResult<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let row = pairs(values);
        let stmt = compile::compile_insert(
            &self.plan.table,
            std::slice::from_ref(&row),
            None,
            conn.config().dialect,
        )?;
        conn.execute(&stmt).await
    }

    /// Insert several rows in one statement. No rows is a no-op.
    pub async fn insert_many(
        &self,
        conn: &impl GenericClient,
        rows: Vec<Vec<(String, Value)>>,
    ) -> DbResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let stmt = compile::compile_insert(&self.plan.table, &rows, None, conn.config().dialect)?;
        conn.execute(&stmt).await
    }

    /// Insert one row and return its generated `key`.
    pub async fn insert_get_id<T, I, K, V>(
        &self,
        conn: &impl GenericClient,
        values: I,
        key: &str,
    ) -> DbResult<T>
    where
        T: FromValue,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let row = pairs(values);
        let stmt = compile::compile_insert(
            &self.plan.table,
            std::slice::from_ref(&row),
            Some(key),
            conn.config().dialect,
        )?;
        let record = conn
            .query_opt(&stmt)
            .await?
            .ok_or_else(|| DbError::not_found("INSERT returned no row"))?;
        record.try_get_index(0)
    }

    /// Update matching rows.
    pub async fn update<I, K, V>(&self, conn: &impl GenericClient, values: I) -> DbResult<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let sets: Vec<(String, SetValue)> = pairs(values)
            .into_iter()
            .map(|(k, v)| (k, SetValue::Value(v)))
            .collect();
        self.update_with(conn, sets).await
    }

    /// Update with explicit assignments (values, increments, raw expressions).
    pub async fn update_with(
        &self,
        conn: &impl GenericClient,
        sets: Vec<(String, SetValue)>,
    ) -> DbResult<u64> {
        self.check_dangerous(conn.config().update_without_where, "UPDATE")?;
        let stmt = compile::compile_update(&self.plan, &sets, conn.config().dialect)?;
        conn.execute(&stmt).await
    }

    /// Update the row matching `attributes`, or insert `attributes + values` when none does.
    ///
    /// Returns the number of rows written. Not atomic on its own; run it inside a
    /// transaction when concurrent writers may race on the same key.
    pub async fn update_or_insert<A, AK, AV, V, VK, VV>(
        &self,
        conn: &impl GenericClient,
        attributes: A,
        values: V,
    ) -> DbResult<u64>
    where
        A: IntoIterator<Item = (AK, AV)>,
        AK: Into<String>,
        AV: Into<Value>,
        V: IntoIterator<Item = (VK, VV)>,
        VK: Into<String>,
        VV: Into<Value>,
    {
        let attributes = pairs(attributes);
        let values = pairs(values);

        let mut scoped = self.clone();
        for (column, value) in &attributes {
            scoped = scoped.where_eq(column, value.clone());
        }

        if !scoped.exists(conn).await? {
            let mut row = attributes;
            for (column, value) in values {
                match row.iter_mut().find(|(c, _)| *c == column) {
                    Some(slot) => slot.1 = value,
                    None => row.push((column, value)),
                }
            }
            return scoped.insert(conn, row).await;
        }

        if values.is_empty() {
            return Ok(0);
        }
        scoped.update(conn, values).await
    }

    /// `column = column + amount`
    pub async fn increment(
        &self,
        conn: &impl GenericClient,
        column: &str,
        amount: impl Into<Value>,
    ) -> DbResult<u64> {
        self.increment_with(conn, column, amount, Vec::<(String, Value)>::new())
            .await
    }

    /// Increment and set extra columns in the same statement.
    pub async fn increment_with<I, K, V>(
        &self,
        conn: &impl GenericClient,
        column: &str,
        amount: impl Into<Value>,
        extra: I,
    ) -> DbResult<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut sets = vec![(column.to_string(), SetValue::Add(amount.into()))];
        sets.extend(pairs(extra).into_iter().map(|(k, v)| (k, SetValue::Value(v))));
        self.update_with(conn, sets).await
    }

    /// `column = column - amount`
    pub async fn decrement(
        &self,
        conn: &impl GenericClient,
        column: &str,
        amount: impl Into<Value>,
    ) -> DbResult<u64> {
        let sets = vec![(column.to_string(), SetValue::Sub(amount.into()))];
        self.update_with(conn, sets).await
    }

    /// Delete matching rows.
    pub async fn delete(&self, conn: &impl GenericClient) -> DbResult<u64> {
        self.check_dangerous(conn.config().delete_without_where, "DELETE")?;
        let stmt = compile::compile_delete(&self.plan, conn.config().dialect)?;
        conn.execute(&stmt).await
    }
}
