//! Offset and cursor pagination on top of [`QueryBuilder`].
//!
//! - [`QueryBuilder::paginate`] runs a `count(*)` over the same rows and then the
//!   windowed query, producing a [`Paginator`].
//! - [`QueryBuilder::simple_paginate`] skips the count and fetches one extra row
//!   to learn whether another page exists.
//! - [`QueryBuilder::cursor_paginate`] resumes from a [`Cursor`] with a keyset
//!   predicate instead of an offset.

mod cursor;


pub use cursor::{Cursor, CursorPage};

use crate::client::GenericClient;
use crate::error::{DbError, DbResult};
use crate::qb::{Combinator, Direction, Filter, Op, OrderBy, QueryBuilder, WhereGroup};
use crate::record::{FromRecord, Record};
use crate::value::Value;

/// One page of an offset-paginated query, with the total row count.
#[derive(Debug, Clone)]
pub struct Paginator<T> {
    items: Vec<T>,
    total: u64,
    per_page: u64,
    current_page: u64,
}

impl<T> Paginator<T> {
    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn per_page(&self) -> u64 {
        self.per_page
    }

    pub fn current_page(&self) -> u64 {
        self.current_page
    }

    /// `ceil(total / per_page)`; 0 when there are no rows.
    pub fn last_page(&self) -> u64 {
        self.total.div_ceil(self.per_page)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_more_pages(&self) -> bool {
        self.current_page < self.last_page()
    }

    pub fn on_first_page(&self) -> bool {
        self.current_page <= 1
    }

    /// 1-based position of the first item on this page within the whole result.
    pub fn first_item(&self) -> Option<u64> {
        (!self.items.is_empty()).then(|| (self.current_page - 1) * self.per_page + 1)
    }

    pub fn last_item(&self) -> Option<u64> {
        self.first_item()
            .map(|first| first + self.items.len() as u64 - 1)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginator<U> {
        Paginator {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            per_page: self.per_page,
            current_page: self.current_page,
        }
    }
}

impl Paginator<Record> {
    /// Map records to `U` through [`FromRecord`].
    pub fn hydrate<U: FromRecord>(self) -> DbResult<Paginator<U>> {
        let items = self
            .items
            .iter()
            .map(U::from_record)
            .collect::<DbResult<Vec<_>>>()?;
        Ok(Paginator {
            items,
            total: self.total,
            per_page: self.per_page,
            current_page: self.current_page,
        })
    }
}

/// One page of an offset-paginated query without a total.
#[derive(Debug, Clone)]
pub struct SimplePaginator<T> {
    items: Vec<T>,
    per_page: u64,
    current_page: u64,
    has_more: bool,
}

impl<T> SimplePaginator<T> {
    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn per_page(&self) -> u64 {
        self.per_page
    }

    pub fn current_page(&self) -> u64 {
        self.current_page
    }

    pub fn has_more_pages(&self) -> bool {
        self.has_more
    }

    pub fn on_first_page(&self) -> bool {
        self.current_page <= 1
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn check_per_page(per_page: u64) -> DbResult<()> {
    if per_page == 0 {
        return Err(DbError::syntax("per_page must be greater than zero"));
    }
    Ok(())
}

/// Keyset predicate for rows strictly after `values` in `orders`:
/// `k1 > v1 OR (k1 = v1 AND (k2 > v2 OR ...))`, with `<` for descending keys.
fn keyset(orders: &[(String, Direction)], values: &[Value]) -> WhereGroup {
    let (Some(((column, direction), rest)), Some((value, rest_values))) =
        (orders.split_first(), values.split_first())
    else {
        return WhereGroup::default();
    };
    let op = match direction {
        Direction::Asc => Op::Gt,
        Direction::Desc => Op::Lt,
    };
    let group = WhereGroup::default().where_cmp(column, op, value.clone());
    if rest.is_empty() {
        return group;
    }
    group.or_where_group(|g| {
        g.where_eq(column, value.clone())
            .where_group(|_| keyset(rest, rest_values))
    })
}

impl QueryBuilder {
    /// Offset pagination with a total count. `page < 1` is treated as 1.
    pub async fn paginate(
        &self,
        conn: &impl GenericClient,
        per_page: u64,
        page: u64,
    ) -> DbResult<Paginator<Record>> {
        check_per_page(per_page)?;
        let page = page.max(1);

        let total = QueryBuilder::from_plan(self.plan.without_window())
            .count(conn)
            .await?;
        let total = u64::try_from(total).unwrap_or_default();

        let items = if total == 0 {
            Vec::new()
        } else {
            self.clone().for_page(page, per_page).get(conn).await?
        };

        Ok(Paginator {
            items,
            total,
            per_page,
            current_page: page,
        })
    }

    /// Offset pagination without a count query.
    pub async fn simple_paginate(
        &self,
        conn: &impl GenericClient,
        per_page: u64,
        page: u64,
    ) -> DbResult<SimplePaginator<Record>> {
        check_per_page(per_page)?;
        let page = page.max(1);

        let mut items = self
            .clone()
            .offset((page - 1) * per_page)
            .limit(per_page + 1)
            .get(conn)
            .await?;
        let has_more = items.len() as u64 > per_page;
        items.truncate(per_page as usize);

        Ok(SimplePaginator {
            items,
            per_page,
            current_page: page,
            has_more,
        })
    }

    /// Keyset pagination. Requires at least one named ORDER BY column and every
    /// ordering column in the result rows; a unique trailing key keeps pages
    /// disjoint.
    pub async fn cursor_paginate(
        &self,
        conn: &impl GenericClient,
        per_page: u64,
        cursor: Option<&Cursor>,
    ) -> DbResult<CursorPage<Record>> {
        check_per_page(per_page)?;
        let orders = self
            .plan
            .named_orders()
            .filter(|orders| !orders.is_empty())
            .ok_or_else(|| {
                DbError::AmbiguousCursorOrder(
                    "cursor pagination needs at least one ORDER BY column and no raw ordering"
                        .into(),
                )
            })?;

        let backwards = cursor.is_some_and(Cursor::points_to_previous_items);
        let mut query = self.clone();
        query.plan.offset = None;
        query.plan.limit = Some(per_page + 1);

        if backwards {
            for order in &mut query.plan.orders {
                if let OrderBy::Column { direction, .. } = order {
                    *direction = direction.reversed();
                }
            }
        }

        if let Some(cursor) = cursor {
            let values = orders
                .iter()
                .map(|(column, _)| {
                    cursor.parameter(column).cloned().ok_or_else(|| {
                        DbError::InvalidCursor(format!("cursor has no value for '{column}'"))
                    })
                })
                .collect::<DbResult<Vec<_>>>()?;
            let effective: Vec<(String, Direction)> = orders
                .iter()
                .map(|(column, direction)| {
                    let direction = if backwards {
                        direction.reversed()
                    } else {
                        *direction
                    };
                    (column.clone(), direction)
                })
                .collect();

            if query.plan.wheres.needs_parens() {
                let existing = std::mem::take(&mut query.plan.wheres);
                query.plan.wheres.push_group(Combinator::And, existing);
            }
            query = query.where_group(|_| keyset(&effective, &values));
        }

        let mut items = query.get(conn).await?;
        let has_more = items.len() as u64 > per_page;
        items.truncate(per_page as usize);
        if backwards {
            items.reverse();
        }

        let edge = |record: Option<&Record>, points_to_next: bool| {
            record
                .map(|r| Cursor::from_record(r, &orders, points_to_next))
                .transpose()
        };
        let (next_cursor, prev_cursor) = match cursor {
            None => (
                if has_more { edge(items.last(), true)? } else { None },
                None,
            ),
            Some(_) if backwards => (
                edge(items.last(), true)?,
                if has_more { edge(items.first(), false)? } else { None },
            ),
            Some(_) => (
                if has_more { edge(items.last(), true)? } else { None },
                edge(items.first(), false)?,
            ),
        };

        Ok(CursorPage::new(
            items,
            per_page,
            next_cursor,
            prev_cursor,
            has_more,
        ))
    }
}
