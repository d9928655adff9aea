//! Predicate tree for WHERE / HAVING / JOIN ON clauses.
//!
//! A [`Conditions`] list is an ordered sequence of predicates, each attached to
//! the previous ones with its own [`Combinator`]. Nested groups are a
//! [`Predicate::Group`] holding another list, so the tree shape alone decides
//! where parentheses go. Evaluation order follows SQL precedence (AND binds
//! tighter than OR); the compiler never reorders.

use std::fmt;
use std::str::FromStr;

use crate::error::DbError;
use crate::value::Value;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    NotLike,
    ILike,
    NotILike,
}

impl Op {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "<>",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Like => "LIKE",
            Op::NotLike => "NOT LIKE",
            Op::ILike => "ILIKE",
            Op::NotILike => "NOT ILIKE",
        }
    }

    pub(crate) fn is_case_insensitive(&self) -> bool {
        matches!(self, Op::ILike | Op::NotILike)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for Op {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Op::Eq,
            "!=" | "<>" => Op::Ne,
            "<" => Op::Lt,
            "<=" => Op::Le,
            ">" => Op::Gt,
            ">=" => Op::Ge,
            "like" => Op::Like,
            "not like" => Op::NotLike,
            "ilike" => Op::ILike,
            "not ilike" => Op::NotILike,
            other => return Err(DbError::syntax(format!("unknown operator '{other}'"))),
        };
        Ok(op)
    }
}

/// How a predicate attaches to the ones before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Combinator {
    #[default]
    And,
    Or,
}

impl Combinator {
    pub(crate) fn as_sql(&self) -> &'static str {
        match self {
            Combinator::And => " AND ",
            Combinator::Or => " OR ",
        }
    }
}

/// Raw SQL spliced verbatim. Each `?` is a binding slot; `??` is a literal `?`.
#[derive(Debug, Clone, PartialEq)]
pub struct Raw {
    pub sql: String,
    pub bindings: Vec<Value>,
}

impl Raw {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            bindings: Vec::new(),
        }
    }

    pub fn with_bindings<I, V>(sql: impl Into<String>, bindings: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            sql: sql.into(),
            bindings: bindings.into_iter().map(Into::into).collect(),
        }
    }
}

/// One node of the predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column op ?`
    Compare {
        column: String,
        op: Op,
        value: Value,
    },
    /// `first op second`, both identifiers
    Columns {
        first: String,
        op: Op,
        second: String,
    },
    /// `column [NOT] BETWEEN ? AND ?`
    Between {
        column: String,
        low: Value,
        high: Value,
        negated: bool,
    },
    /// `column [NOT] IN (?, ...)`; an empty set is constant false (true when negated)
    In {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },
    /// `column IS [NOT] NULL`
    Null { column: String, negated: bool },
    /// date part of `column` compared to `?`
    Date {
        column: String,
        op: Op,
        value: Value,
    },
    Raw(Raw),
    /// Parenthesized sub-tree
    Group(Conditions),
}

/// Ordered predicates with their combinators.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Conditions {
    items: Vec<(Combinator, Predicate)>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, combinator: Combinator, predicate: Predicate) {
        self.items.push((combinator, predicate));
    }

    /// Attach a nested group. Empty groups are dropped.
    pub fn push_group(&mut self, combinator: Combinator, group: Conditions) {
        if !group.is_empty() {
            self.items.push((combinator, Predicate::Group(group)));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Combinator, Predicate)> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Whether appending `AND x` could bind to only part of this list.
    pub(crate) fn needs_parens(&self) -> bool {
        self.items.len() > 1
            || self
                .items
                .iter()
                .any(|(_, predicate)| matches!(predicate, Predicate::Raw(_)))
    }
}
