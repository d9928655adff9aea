//! The query plan accumulated by [`crate::QueryBuilder`].

use crate::dialect::LockMode;
use crate::qb::expr::{Conditions, Raw};

/// One entry of the SELECT list.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Column(String),
    Raw(Raw),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
}

impl JoinKind {
    pub(crate) fn as_sql(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    pub kind: JoinKind,
    pub table: String,
    pub on: Conditions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub(crate) fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }

    pub fn reversed(&self) -> Self {
        match self {
            Direction::Asc => Direction::Desc,
            Direction::Desc => Direction::Asc,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderBy {
    Column { column: String, direction: Direction },
    Raw(Raw),
}

/// Everything a SELECT needs, independent of any dialect.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub table: String,
    /// Empty means `*`.
    pub columns: Vec<Selection>,
    pub distinct: bool,
    pub joins: Vec<JoinSpec>,
    pub wheres: Conditions,
    pub groups: Vec<String>,
    pub havings: Conditions,
    pub orders: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub lock: LockMode,
}

impl QueryPlan {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            distinct: false,
            joins: Vec::new(),
            wheres: Conditions::new(),
            groups: Vec::new(),
            havings: Conditions::new(),
            orders: Vec::new(),
            limit: None,
            offset: None,
            lock: LockMode::None,
        }
    }

    /// Plan for counting or aggregating: same rows, no ordering or window.
    pub(crate) fn without_window(&self) -> Self {
        let mut plan = self.clone();
        plan.orders.clear();
        plan.limit = None;
        plan.offset = None;
        plan.lock = LockMode::None;
        plan
    }

    /// Named (non-raw) order columns, or `None` when any order is raw.
    pub(crate) fn named_orders(&self) -> Option<Vec<(String, Direction)>> {
        self.orders
            .iter()
            .map(|o| match o {
                OrderBy::Column { column, direction } => Some((column.clone(), *direction)),
                OrderBy::Raw(_) => None,
            })
            .collect()
    }
}
