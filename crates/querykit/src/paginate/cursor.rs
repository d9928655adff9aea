//! Opaque keyset cursors.
//!
//! A cursor is a JSON object of ordering-column values plus a
//! `_pointsToNextItems` flag, encoded as URL-safe base64 without padding.

use std::collections::BTreeMap;
use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

use crate::error::{DbError, DbResult};
use crate::qb::Direction;
use crate::record::Record;
use crate::value::Value;

const DIRECTION_KEY: &str = "_pointsToNextItems";

// Upper bound on untrusted token input.
const MAX_CURSOR_TOKEN_LEN: usize = 8 * 1024;

/// Position marker for cursor pagination.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    parameters: BTreeMap<String, Value>,
    points_to_next_items: bool,
}

impl Cursor {
    pub fn new(parameters: BTreeMap<String, Value>, points_to_next_items: bool) -> Self {
        Self {
            parameters,
            points_to_next_items,
        }
    }

    /// Capture the ordering-column values of `record`.
    pub(crate) fn from_record(
        record: &Record,
        orders: &[(String, Direction)],
        points_to_next_items: bool,
    ) -> DbResult<Self> {
        let mut parameters = BTreeMap::new();
        for (column, _) in orders {
            let value = lookup(record, column).ok_or_else(|| {
                DbError::decode(
                    column.as_str(),
                    "ordering column is missing from the result; select it to paginate by cursor",
                )
            })?;
            parameters.insert(column.clone(), value.clone());
        }
        Ok(Self::new(parameters, points_to_next_items))
    }

    pub fn parameter(&self, column: &str) -> Option<&Value> {
        self.parameters.get(column)
    }

    pub fn parameters(&self) -> &BTreeMap<String, Value> {
        &self.parameters
    }

    pub fn points_to_next_items(&self) -> bool {
        self.points_to_next_items
    }

    pub fn points_to_previous_items(&self) -> bool {
        !self.points_to_next_items
    }

    /// Serialize into an opaque token.
    pub fn encode(&self) -> DbResult<String> {
        let json = serde_json::to_vec(self)
            .map_err(|e| DbError::InvalidCursor(format!("cannot encode cursor: {e}")))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Parse a token produced by [`Cursor::encode`].
    pub fn decode(token: &str) -> DbResult<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(DbError::InvalidCursor("cursor token is empty".into()));
        }
        if token.len() > MAX_CURSOR_TOKEN_LEN {
            return Err(DbError::InvalidCursor(format!(
                "cursor token exceeds {MAX_CURSOR_TOKEN_LEN} characters"
            )));
        }

        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| DbError::InvalidCursor(format!("not base64: {e}")))?;
        let json: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| DbError::InvalidCursor(format!("not JSON: {e}")))?;
        let serde_json::Value::Object(object) = json else {
            return Err(DbError::InvalidCursor("expected a JSON object".into()));
        };

        let mut points_to_next_items = None;
        let mut parameters = BTreeMap::new();
        for (key, value) in object {
            if key == DIRECTION_KEY {
                points_to_next_items = value.as_bool();
            } else {
                parameters.insert(key, Value::from(value));
            }
        }
        let points_to_next_items = points_to_next_items
            .ok_or_else(|| DbError::InvalidCursor(format!("missing boolean '{DIRECTION_KEY}'")))?;
        if parameters.is_empty() {
            return Err(DbError::InvalidCursor("cursor carries no ordering values".into()));
        }
        Ok(Self::new(parameters, points_to_next_items))
    }
}

impl Serialize for Cursor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.parameters.len() + 1))?;
        for (column, value) in &self.parameters {
            map.serialize_entry(column, value)?;
        }
        map.serialize_entry(DIRECTION_KEY, &self.points_to_next_items)?;
        map.end()
    }
}

impl FromStr for Cursor {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

/// Find an ordering column in a result row by full name, alias, or last segment.
fn lookup<'r>(record: &'r Record, column: &str) -> Option<&'r Value> {
    if let Some(value) = record.get(column) {
        return Some(value);
    }
    let lower = column.to_ascii_lowercase();
    if let Some(pos) = lower.rfind(" as ") {
        return record.get(column[pos + 4..].trim());
    }
    column
        .rsplit('.')
        .next()
        .and_then(|segment| record.get(segment.trim()))
}

/// One page of a cursor-paginated query.
#[derive(Debug, Clone)]
pub struct CursorPage<T> {
    items: Vec<T>,
    per_page: u64,
    next_cursor: Option<Cursor>,
    prev_cursor: Option<Cursor>,
    has_more: bool,
}

impl<T> CursorPage<T> {
    pub(crate) fn new(
        items: Vec<T>,
        per_page: u64,
        next_cursor: Option<Cursor>,
        prev_cursor: Option<Cursor>,
        has_more: bool,
    ) -> Self {
        Self {
            items,
            per_page,
            next_cursor,
            prev_cursor,
            has_more,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn per_page(&self) -> u64 {
        self.per_page
    }

    /// `None` exactly on the last page.
    pub fn next_cursor(&self) -> Option<&Cursor> {
        self.next_cursor.as_ref()
    }

    /// `None` on the first page.
    pub fn prev_cursor(&self) -> Option<&Cursor> {
        self.prev_cursor.as_ref()
    }

    /// Whether more rows exist in the direction this page was fetched.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn on_first_page(&self) -> bool {
        self.prev_cursor.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Map every item, keeping the cursors.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> CursorPage<U> {
        CursorPage {
            items: self.items.into_iter().map(f).collect(),
            per_page: self.per_page,
            next_cursor: self.next_cursor,
            prev_cursor: self.prev_cursor,
            has_more: self.has_more,
        }
    }
}
