//! SQL compiler: query plan + dialect → [`BoundStatement`].
//!
//! Compilation is pure and deterministic. Clause order is fixed:
//! SELECT, FROM, JOIN, WHERE, GROUP BY, HAVING, ORDER BY, LIMIT/OFFSET, lock.
//! Placeholders are numbered in the order they are written, so binding `n`
//! always belongs to the `n`-th placeholder in the text.

mod writer;

#[cfg(test)]
mod tests;

use std::fmt;

use tokio_postgres::types::ToSql;

use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::qb::expr::{Conditions, Predicate, Raw};
use crate::qb::plan::{OrderBy, QueryPlan, Selection};
use crate::value::Value;

pub(crate) use writer::SqlWriter;

/// Compiled SQL text and its positional bindings. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    sql: String,
    bindings: Vec<Value>,
}

impl BoundStatement {
    pub fn new(sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            bindings,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn bindings(&self) -> &[Value] {
        &self.bindings
    }

    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.bindings)
    }

    /// Get parameters as references compatible with tokio-postgres.
    pub fn params_ref(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.bindings
            .iter()
            .map(|v| v as &(dyn ToSql + Sync))
            .collect()
    }
}

impl fmt::Display for BoundStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Aggregate functions over a single column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Count,
    Min,
    Max,
    Sum,
    Avg,
}

impl Aggregate {
    fn as_sql(&self) -> &'static str {
        match self {
            Aggregate::Count => "count",
            Aggregate::Min => "min",
            Aggregate::Max => "max",
            Aggregate::Sum => "sum",
            Aggregate::Avg => "avg",
        }
    }
}

/// Right-hand side of one `SET` assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum SetValue {
    Value(Value),
    /// `column = column + ?`
    Add(Value),
    /// `column = column - ?`
    Sub(Value),
    Raw(Raw),
}

/// Compile a SELECT.
pub fn compile(plan: &QueryPlan, dialect: Dialect) -> DbResult<BoundStatement> {
    let mut w = SqlWriter::new(dialect);
    write_select(&mut w, plan)?;
    Ok(w.finish())
}

/// Compile a single-row aggregate query over the plan's rows.
///
/// Grouped, distinct or windowed plans are aggregated through a subquery so the
/// result is still one row.
pub fn compile_aggregate(
    plan: &QueryPlan,
    dialect: Dialect,
    aggregate: Aggregate,
    column: &str,
) -> DbResult<BoundStatement> {
    let mut w = SqlWriter::new(dialect);
    let needs_subquery = !plan.groups.is_empty()
        || plan.distinct
        || plan.limit.is_some()
        || plan.offset.is_some();

    w.push("SELECT ");
    w.push(aggregate.as_sql());
    w.push("(");
    if needs_subquery {
        let inner_column = column.rsplit('.').next().unwrap_or(column);
        w.push_ident(inner_column);
        w.push(") AS aggregate FROM (");
        let mut inner = plan.clone();
        inner.lock = Default::default();
        if inner.limit.is_none() && inner.offset.is_none() {
            inner.orders.clear();
        }
        write_select(&mut w, &inner)?;
        w.push(") AS aggregate_table");
    } else {
        w.push_ident(column);
        w.push(") AS aggregate");
        write_from_to_having(&mut w, plan)?;
    }
    Ok(w.finish())
}

/// Compile `SELECT EXISTS(...)`.
pub fn compile_exists(plan: &QueryPlan, dialect: Dialect) -> DbResult<BoundStatement> {
    let mut w = SqlWriter::new(dialect);
    w.push("SELECT EXISTS(");
    let mut inner = plan.clone();
    inner.lock = Default::default();
    write_select(&mut w, &inner)?;
    w.push(") AS ");
    w.push_ident("exists");
    Ok(w.finish())
}

/// Compile a multi-row INSERT. Every row must name the same columns.
pub fn compile_insert(
    table: &str,
    rows: &[Vec<(String, Value)>],
    returning: Option<&str>,
    dialect: Dialect,
) -> DbResult<BoundStatement> {
    let Some(first) = rows.first() else {
        return Err(DbError::syntax("INSERT needs at least one row"));
    };
    if returning.is_some() && !dialect.supports_returning() {
        return Err(DbError::unsupported(dialect, "RETURNING"));
    }

    let mut w = SqlWriter::new(dialect);
    w.push("INSERT INTO ");
    w.push_ident(table);

    let columns: Vec<&str> = first.iter().map(|(c, _)| c.as_str()).collect();
    if columns.is_empty() {
        if rows.len() > 1 {
            return Err(DbError::syntax("multi-row INSERT needs at least one column"));
        }
        w.push(" DEFAULT VALUES");
    } else {
        w.push(" (");
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.push_ident(column);
        }
        w.push(") VALUES ");
        for (r, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(DbError::syntax(format!(
                    "INSERT row {r} has {} columns, expected {}",
                    row.len(),
                    columns.len()
                )));
            }
            if r > 0 {
                w.push(", ");
            }
            w.push("(");
            for (i, column) in columns.iter().enumerate() {
                let value = row
                    .iter()
                    .find(|(c, _)| c.as_str() == *column)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| {
                        DbError::syntax(format!("INSERT row {r} is missing column '{column}'"))
                    })?;
                if i > 0 {
                    w.push(", ");
                }
                w.push_bind(value);
            }
            w.push(")");
        }
    }

    if let Some(returning) = returning {
        w.push(" RETURNING ");
        w.push_ident(returning);
    }
    Ok(w.finish())
}

/// Compile an UPDATE over the plan's WHERE clause.
pub fn compile_update(
    plan: &QueryPlan,
    sets: &[(String, SetValue)],
    dialect: Dialect,
) -> DbResult<BoundStatement> {
    if sets.is_empty() {
        return Err(DbError::syntax("UPDATE needs at least one column to set"));
    }
    check_mutation(plan, dialect, "UPDATE")?;

    let mut w = SqlWriter::new(dialect);
    w.push("UPDATE ");
    w.push_ident(&plan.table);
    w.push(" SET ");
    for (i, (column, value)) in sets.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        // SET targets cannot be table-qualified.
        let column = column.rsplit('.').next().unwrap_or(column);
        w.push_ident(column);
        w.push(" = ");
        match value {
            SetValue::Value(v) => w.push_bind(v.clone()),
            SetValue::Add(v) => {
                w.push_ident(column);
                w.push(" + ");
                w.push_bind(v.clone());
            }
            SetValue::Sub(v) => {
                w.push_ident(column);
                w.push(" - ");
                w.push_bind(v.clone());
            }
            SetValue::Raw(raw) => w.push_raw(raw)?,
        }
    }
    write_where(&mut w, &plan.wheres)?;
    write_mutation_tail(&mut w, plan)?;
    Ok(w.finish())
}

/// Compile a DELETE over the plan's WHERE clause.
pub fn compile_delete(plan: &QueryPlan, dialect: Dialect) -> DbResult<BoundStatement> {
    check_mutation(plan, dialect, "DELETE")?;

    let mut w = SqlWriter::new(dialect);
    w.push("DELETE FROM ");
    w.push_ident(&plan.table);
    write_where(&mut w, &plan.wheres)?;
    write_mutation_tail(&mut w, plan)?;
    Ok(w.finish())
}

fn check_mutation(plan: &QueryPlan, dialect: Dialect, verb: &'static str) -> DbResult<()> {
    if !plan.joins.is_empty() {
        return Err(DbError::unsupported(
            dialect,
            if verb == "UPDATE" {
                "UPDATE with JOIN"
            } else {
                "DELETE with JOIN"
            },
        ));
    }
    if !plan.groups.is_empty() || !plan.havings.is_empty() {
        return Err(DbError::syntax(format!("{verb} cannot use GROUP BY or HAVING")));
    }
    if plan.offset.is_some() {
        return Err(DbError::syntax(format!("{verb} cannot use OFFSET")));
    }
    if plan.limit.is_some() && !dialect.supports_mutation_limit() {
        return Err(DbError::unsupported(
            dialect,
            if verb == "UPDATE" {
                "UPDATE with LIMIT"
            } else {
                "DELETE with LIMIT"
            },
        ));
    }
    Ok(())
}

/// ORDER BY / LIMIT are only kept where the dialect allows a limited mutation.
fn write_mutation_tail(w: &mut SqlWriter, plan: &QueryPlan) -> DbResult<()> {
    if plan.limit.is_some() {
        write_orders(w, &plan.orders)?;
        w.limit_offset(plan.limit, None);
    }
    Ok(())
}

fn write_select(w: &mut SqlWriter, plan: &QueryPlan) -> DbResult<()> {
    w.push("SELECT ");
    if plan.distinct {
        w.push("DISTINCT ");
    }
    if plan.columns.is_empty() {
        w.push("*");
    } else {
        for (i, selection) in plan.columns.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            match selection {
                Selection::Column(column) => w.push_ident(column),
                Selection::Raw(raw) => w.push_raw(raw)?,
            }
        }
    }
    write_from_to_having(w, plan)?;
    write_orders(w, &plan.orders)?;
    w.limit_offset(plan.limit, plan.offset);
    if let Some(lock) = w.dialect().lock_clause(plan.lock)? {
        w.push(" ");
        w.push(lock);
    }
    Ok(())
}

/// FROM, JOIN, WHERE, GROUP BY and HAVING.
fn write_from_to_having(w: &mut SqlWriter, plan: &QueryPlan) -> DbResult<()> {
    if plan.table.trim().is_empty() {
        return Err(DbError::syntax("query has no table"));
    }
    w.push(" FROM ");
    w.push_ident(&plan.table);

    for join in &plan.joins {
        if join.on.is_empty() {
            return Err(DbError::syntax(format!(
                "join to '{}' has no ON condition",
                join.table
            )));
        }
        w.push(" ");
        w.push(join.kind.as_sql());
        w.push(" ");
        w.push_ident(&join.table);
        w.push(" ON ");
        write_conditions(w, &join.on)?;
    }

    write_where(w, &plan.wheres)?;

    if !plan.groups.is_empty() {
        w.push(" GROUP BY ");
        for (i, group) in plan.groups.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.push_ident(group);
        }
    }

    if !plan.havings.is_empty() {
        if plan.groups.is_empty() {
            return Err(DbError::syntax("HAVING without GROUP BY"));
        }
        w.push(" HAVING ");
        write_conditions(w, &plan.havings)?;
    }
    Ok(())
}

fn write_where(w: &mut SqlWriter, wheres: &Conditions) -> DbResult<()> {
    if !wheres.is_empty() {
        w.push(" WHERE ");
        write_conditions(w, wheres)?;
    }
    Ok(())
}

fn write_orders(w: &mut SqlWriter, orders: &[OrderBy]) -> DbResult<()> {
    if orders.is_empty() {
        return Ok(());
    }
    w.push(" ORDER BY ");
    for (i, order) in orders.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        match order {
            OrderBy::Column { column, direction } => {
                w.push_ident(column);
                w.push(" ");
                w.push(direction.as_sql());
            }
            OrderBy::Raw(raw) => w.push_raw(raw)?,
        }
    }
    Ok(())
}

pub(crate) fn write_conditions(w: &mut SqlWriter, conditions: &Conditions) -> DbResult<()> {
    for (i, (combinator, predicate)) in conditions.iter().enumerate() {
        if i > 0 {
            w.push(combinator.as_sql());
        }
        write_predicate(w, predicate)?;
    }
    Ok(())
}

fn write_predicate(w: &mut SqlWriter, predicate: &Predicate) -> DbResult<()> {
    match predicate {
        Predicate::Compare { column, op, value } => {
            w.push_ident(column);
            w.push_op(*op)?;
            w.push_bind(value.clone());
        }
        Predicate::Columns { first, op, second } => {
            w.push_ident(first);
            w.push_op(*op)?;
            w.push_ident(second);
        }
        Predicate::Between {
            column,
            low,
            high,
            negated,
        } => {
            w.push_ident(column);
            w.push(if *negated { " NOT BETWEEN " } else { " BETWEEN " });
            w.push_bind(low.clone());
            w.push(" AND ");
            w.push_bind(high.clone());
        }
        Predicate::In {
            column,
            values,
            negated,
        } => {
            if values.is_empty() {
                w.push(if *negated { "1 = 1" } else { "1 = 0" });
                return Ok(());
            }
            w.push_ident(column);
            w.push(if *negated { " NOT IN (" } else { " IN (" });
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                w.push_bind(value.clone());
            }
            w.push(")");
        }
        Predicate::Null { column, negated } => {
            w.push_ident(column);
            w.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
        }
        Predicate::Date { column, op, value } => {
            w.push_date_of(column);
            w.push_op(*op)?;
            w.push_bind(value.clone());
        }
        Predicate::Raw(raw) => w.push_raw(raw)?,
        Predicate::Group(group) => {
            w.push("(");
            write_conditions(w, group)?;
            w.push(")");
        }
    }
    Ok(())
}
