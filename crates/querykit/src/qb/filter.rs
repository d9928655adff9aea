//! WHERE-clause composition shared by builders, nested groups and join clauses.

use crate::qb::expr::{Combinator, Conditions, Op, Predicate, Raw};
use crate::value::Value;

/// Comparison against NULL is rewritten to `IS [NOT] NULL`.
fn compare(column: &str, op: Op, value: Value) -> Predicate {
    match (op, value) {
        (Op::Eq, Value::Null) => Predicate::Null {
            column: column.to_string(),
            negated: false,
        },
        (Op::Ne, Value::Null) => Predicate::Null {
            column: column.to_string(),
            negated: true,
        },
        (op, value) => Predicate::Compare {
            column: column.to_string(),
            op,
            value,
        },
    }
}

fn values<I, V>(items: I) -> Vec<Value>
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    items.into_iter().map(Into::into).collect()
}

/// Anything that owns a predicate list. All methods consume and return `self`.
///
/// `where_*` methods attach with AND, `or_where_*` with OR.
pub trait Filter: Sized {
    fn conditions_mut(&mut self) -> &mut Conditions;

    /// Attach a prebuilt predicate.
    fn push_predicate(mut self, combinator: Combinator, predicate: Predicate) -> Self {
        self.conditions_mut().push(combinator, predicate);
        self
    }

    /// `column op value`
    fn where_cmp(self, column: &str, op: Op, value: impl Into<Value>) -> Self {
        self.push_predicate(Combinator::And, compare(column, op, value.into()))
    }

    fn or_where_cmp(self, column: &str, op: Op, value: impl Into<Value>) -> Self {
        self.push_predicate(Combinator::Or, compare(column, op, value.into()))
    }

    /// `column = value`
    fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.where_cmp(column, Op::Eq, value)
    }

    fn or_where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.or_where_cmp(column, Op::Eq, value)
    }

    /// Compare two columns: `first op second`
    fn where_column(self, first: &str, op: Op, second: &str) -> Self {
        self.push_predicate(
            Combinator::And,
            Predicate::Columns {
                first: first.to_string(),
                op,
                second: second.to_string(),
            },
        )
    }

    fn or_where_column(self, first: &str, op: Op, second: &str) -> Self {
        self.push_predicate(
            Combinator::Or,
            Predicate::Columns {
                first: first.to_string(),
                op,
                second: second.to_string(),
            },
        )
    }

    fn where_between(self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.push_predicate(
            Combinator::And,
            Predicate::Between {
                column: column.to_string(),
                low: low.into(),
                high: high.into(),
                negated: false,
            },
        )
    }

    fn or_where_between(
        self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.push_predicate(
            Combinator::Or,
            Predicate::Between {
                column: column.to_string(),
                low: low.into(),
                high: high.into(),
                negated: false,
            },
        )
    }

    fn where_not_between(
        self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.push_predicate(
            Combinator::And,
            Predicate::Between {
                column: column.to_string(),
                low: low.into(),
                high: high.into(),
                negated: true,
            },
        )
    }

    /// `column IN (...)`. An empty set matches no rows.
    fn where_in<I, V>(self, column: &str, items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_predicate(
            Combinator::And,
            Predicate::In {
                column: column.to_string(),
                values: values(items),
                negated: false,
            },
        )
    }

    fn or_where_in<I, V>(self, column: &str, items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_predicate(
            Combinator::Or,
            Predicate::In {
                column: column.to_string(),
                values: values(items),
                negated: false,
            },
        )
    }

    /// `column NOT IN (...)`. An empty set matches every row.
    fn where_not_in<I, V>(self, column: &str, items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_predicate(
            Combinator::And,
            Predicate::In {
                column: column.to_string(),
                values: values(items),
                negated: true,
            },
        )
    }

    fn or_where_not_in<I, V>(self, column: &str, items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_predicate(
            Combinator::Or,
            Predicate::In {
                column: column.to_string(),
                values: values(items),
                negated: true,
            },
        )
    }

    fn where_null(self, column: &str) -> Self {
        self.push_predicate(
            Combinator::And,
            Predicate::Null {
                column: column.to_string(),
                negated: false,
            },
        )
    }

    fn or_where_null(self, column: &str) -> Self {
        self.push_predicate(
            Combinator::Or,
            Predicate::Null {
                column: column.to_string(),
                negated: false,
            },
        )
    }

    fn where_not_null(self, column: &str) -> Self {
        self.push_predicate(
            Combinator::And,
            Predicate::Null {
                column: column.to_string(),
                negated: true,
            },
        )
    }

    fn or_where_not_null(self, column: &str) -> Self {
        self.push_predicate(
            Combinator::Or,
            Predicate::Null {
                column: column.to_string(),
                negated: true,
            },
        )
    }

    /// Compare the date part of a timestamp column.
    fn where_date(self, column: &str, op: Op, value: impl Into<Value>) -> Self {
        self.push_predicate(
            Combinator::And,
            Predicate::Date {
                column: column.to_string(),
                op,
                value: value.into(),
            },
        )
    }

    fn or_where_date(self, column: &str, op: Op, value: impl Into<Value>) -> Self {
        self.push_predicate(
            Combinator::Or,
            Predicate::Date {
                column: column.to_string(),
                op,
                value: value.into(),
            },
        )
    }

    /// Raw predicate; each `?` takes the next binding.
    fn where_raw(self, sql: &str, bindings: Vec<Value>) -> Self {
        self.push_predicate(
            Combinator::And,
            Predicate::Raw(Raw::with_bindings(sql, bindings)),
        )
    }

    fn or_where_raw(self, sql: &str, bindings: Vec<Value>) -> Self {
        self.push_predicate(
            Combinator::Or,
            Predicate::Raw(Raw::with_bindings(sql, bindings)),
        )
    }

    /// Build a parenthesized group and attach it with `combinator`.
    ///
    /// Predicates inside the group combine by their own calls. An empty group
    /// adds nothing.
    fn where_nested(
        mut self,
        combinator: Combinator,
        build: impl FnOnce(WhereGroup) -> WhereGroup,
    ) -> Self {
        let group = build(WhereGroup::default());
        self.conditions_mut()
            .push_group(combinator, group.into_conditions());
        self
    }

    /// `AND ( ... )`
    fn where_group(self, build: impl FnOnce(WhereGroup) -> WhereGroup) -> Self {
        self.where_nested(Combinator::And, build)
    }

    /// `OR ( ... )`
    fn or_where_group(self, build: impl FnOnce(WhereGroup) -> WhereGroup) -> Self {
        self.where_nested(Combinator::Or, build)
    }
}

/// Scope for a nested predicate group.
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct WhereGroup {
    conditions: Conditions,
}

impl WhereGroup {
    pub fn into_conditions(self) -> Conditions {
        self.conditions
    }
}

impl Filter for WhereGroup {
    fn conditions_mut(&mut self) -> &mut Conditions {
        &mut self.conditions
    }
}

/// ON clause of a join built with [`crate::QueryBuilder::join_with`].
///
/// `on` / `or_on` compare columns; the [`Filter`] methods add value predicates.
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct JoinClause {
    conditions: Conditions,
}

impl JoinClause {
    pub fn on(self, first: &str, op: Op, second: &str) -> Self {
        self.where_column(first, op, second)
    }

    pub fn or_on(self, first: &str, op: Op, second: &str) -> Self {
        self.or_where_column(first, op, second)
    }

    pub(crate) fn into_conditions(self) -> Conditions {
        self.conditions
    }
}

impl Filter for JoinClause {
    fn conditions_mut(&mut self) -> &mut Conditions {
        &mut self.conditions
    }
}
