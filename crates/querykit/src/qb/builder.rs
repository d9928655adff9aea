//! Fluent SELECT builder.

use crate::compile::{self, BoundStatement};
use crate::dialect::{Dialect, LockMode};
use crate::error::DbResult;
use crate::qb::expr::{Combinator, Conditions, Op, Predicate, Raw};
use crate::qb::filter::{Filter, JoinClause};
use crate::qb::plan::{Direction, JoinKind, JoinSpec, OrderBy, QueryPlan, Selection};
use crate::value::Value;

/// Start a query on `table`.
///
/// ```ignore
/// let products = table("products")
///     .where_eq("category_id", "SMARTPHONE")
///     .order_by("price", Direction::Desc)
///     .get(&conn)
///     .await?;
/// ```
pub fn table(name: &str) -> QueryBuilder {
    QueryBuilder::new(name)
}

/// Accumulates a [`QueryPlan`]. Builder methods never touch the database; the
/// execution methods take a client explicitly.
#[derive(Debug, Clone)]
#[must_use]
pub struct QueryBuilder {
    pub(crate) plan: QueryPlan,
}

impl Filter for QueryBuilder {
    fn conditions_mut(&mut self) -> &mut Conditions {
        &mut self.plan.wheres
    }
}

impl QueryBuilder {
    pub fn new(table: &str) -> Self {
        Self {
            plan: QueryPlan::new(table),
        }
    }

    pub fn from_plan(plan: QueryPlan) -> Self {
        Self { plan }
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    pub fn into_plan(self) -> QueryPlan {
        self.plan
    }

    /// Compile without executing.
    pub fn to_statement(&self, dialect: Dialect) -> DbResult<BoundStatement> {
        compile::compile(&self.plan, dialect)
    }

    // ==================== SELECT list ====================

    /// Replace the SELECT list. Entries may be qualified and aliased
    /// (`categories.name as category_name`).
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.plan.columns = columns
            .iter()
            .map(|c| Selection::Column(c.to_string()))
            .collect();
        self
    }

    pub fn add_select(mut self, column: &str) -> Self {
        self.plan.columns.push(Selection::Column(column.to_string()));
        self
    }

    /// Append a raw SELECT expression such as `count(id) as total_product`.
    pub fn select_raw(mut self, sql: &str, bindings: Vec<Value>) -> Self {
        self.plan
            .columns
            .push(Selection::Raw(Raw::with_bindings(sql, bindings)));
        self
    }

    pub fn distinct(mut self) -> Self {
        self.plan.distinct = true;
        self
    }

    // ==================== JOIN ====================

    /// `INNER JOIN table ON first op second`
    pub fn join(self, table: &str, first: &str, op: Op, second: &str) -> Self {
        self.join_with(JoinKind::Inner, table, |on| on.on(first, op, second))
    }

    pub fn left_join(self, table: &str, first: &str, op: Op, second: &str) -> Self {
        self.join_with(JoinKind::Left, table, |on| on.on(first, op, second))
    }

    pub fn right_join(self, table: &str, first: &str, op: Op, second: &str) -> Self {
        self.join_with(JoinKind::Right, table, |on| on.on(first, op, second))
    }

    /// Join with a multi-condition ON clause.
    pub fn join_with(
        mut self,
        kind: JoinKind,
        table: &str,
        build: impl FnOnce(JoinClause) -> JoinClause,
    ) -> Self {
        let on = build(JoinClause::default()).into_conditions();
        self.plan.joins.push(JoinSpec {
            kind,
            table: table.to_string(),
            on,
        });
        self
    }

    // ==================== GROUP BY / HAVING ====================

    pub fn group_by(mut self, column: &str) -> Self {
        self.plan.groups.push(column.to_string());
        self
    }

    /// `HAVING column op value`; `column` may be an aggregate expression such as `count(*)`.
    pub fn having(mut self, column: &str, op: Op, value: impl Into<Value>) -> Self {
        self.plan.havings.push(
            Combinator::And,
            Predicate::Compare {
                column: column.to_string(),
                op,
                value: value.into(),
            },
        );
        self
    }

    pub fn or_having(mut self, column: &str, op: Op, value: impl Into<Value>) -> Self {
        self.plan.havings.push(
            Combinator::Or,
            Predicate::Compare {
                column: column.to_string(),
                op,
                value: value.into(),
            },
        );
        self
    }

    pub fn having_raw(mut self, sql: &str, bindings: Vec<Value>) -> Self {
        self.plan.havings.push(
            Combinator::And,
            Predicate::Raw(Raw::with_bindings(sql, bindings)),
        );
        self
    }

    // ==================== ORDER BY ====================

    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.plan.orders.push(OrderBy::Column {
            column: column.to_string(),
            direction,
        });
        self
    }

    pub fn order_by_desc(self, column: &str) -> Self {
        self.order_by(column, Direction::Desc)
    }

    pub fn order_by_raw(mut self, sql: &str, bindings: Vec<Value>) -> Self {
        self.plan
            .orders
            .push(OrderBy::Raw(Raw::with_bindings(sql, bindings)));
        self
    }

    /// Drop every ORDER BY entry.
    pub fn reorder(mut self) -> Self {
        self.plan.orders.clear();
        self
    }

    // ==================== LIMIT / OFFSET ====================

    pub fn limit(mut self, limit: u64) -> Self {
        self.plan.limit = Some(limit);
        self
    }

    /// Alias for [`QueryBuilder::limit`].
    pub fn take(self, limit: u64) -> Self {
        self.limit(limit)
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.plan.offset = Some(offset);
        self
    }

    /// Alias for [`QueryBuilder::offset`].
    pub fn skip(self, offset: u64) -> Self {
        self.offset(offset)
    }

    /// Window for a 1-based `page` of `per_page` rows. Page 0 is treated as 1.
    pub fn for_page(self, page: u64, per_page: u64) -> Self {
        let page = page.max(1);
        self.offset((page - 1) * per_page).limit(per_page)
    }

    // ==================== Locking ====================

    pub fn lock_for_update(mut self) -> Self {
        self.plan.lock = LockMode::ForUpdate;
        self
    }

    pub fn lock_for_share(mut self) -> Self {
        self.plan.lock = LockMode::ForShare;
        self
    }
}
