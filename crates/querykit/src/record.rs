//! Result rows.

use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};
use tokio_postgres::Row;

use crate::error::{DbError, DbResult};
use crate::value::{FromValue, Value};

/// One result row: column names (shared by every row of a result set) and their values.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Record {
    /// Build a record from column names and values of the same length.
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> DbResult<Self> {
        if columns.len() != values.len() {
            return Err(DbError::decode(
                "*",
                format!(
                    "{} columns but {} values",
                    columns.len(),
                    values.len()
                ),
            ));
        }
        Ok(Self { columns, values })
    }

    /// Build a record from `(column, value)` pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let (columns, values): (Vec<String>, Vec<Value>) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self {
            columns: columns.into(),
            values,
        }
    }

    /// Decode a driver row. `columns` is shared across rows of the same statement.
    pub fn from_row(row: &Row, columns: &Arc<[String]>) -> DbResult<Self> {
        let mut values = Vec::with_capacity(row.len());
        for (idx, column) in columns.iter().enumerate() {
            let value: Value = row
                .try_get(idx)
                .map_err(|e| DbError::decode(column.as_str(), e.to_string()))?;
            values.push(value);
        }
        Ok(Self {
            columns: Arc::clone(columns),
            values,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn index_of(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Value of `column`, if the row has it.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.index_of(column).map(|idx| &self.values[idx])
    }

    /// Value at a 0-based position.
    pub fn get_index(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Typed value of `column`.
    pub fn try_get<T: FromValue>(&self, column: &str) -> DbResult<T> {
        let value = self
            .get(column)
            .ok_or_else(|| DbError::decode(column, "no such column"))?;
        T::from_value(value.clone()).map_err(|e| DbError::decode(column, e.to_string()))
    }

    /// Typed value at a 0-based position.
    pub fn try_get_index<T: FromValue>(&self, idx: usize) -> DbResult<T> {
        let name = self
            .columns
            .get(idx)
            .map(String::as_str)
            .unwrap_or("?")
            .to_string();
        let value = self
            .values
            .get(idx)
            .ok_or_else(|| DbError::decode(name.clone(), "column index out of range"))?;
        T::from_value(value.clone()).map_err(|e| DbError::decode(name, e.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Column names of a driver row, shared by every record of one result.
pub(crate) fn row_columns(row: &Row) -> Arc<[String]> {
    row.columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect::<Vec<_>>()
        .into()
}

/// Decode a full driver result.
pub(crate) fn records_from_rows(rows: &[Row]) -> DbResult<Vec<Record>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let columns = row_columns(first);
    rows.iter().map(|row| Record::from_row(row, &columns)).collect()
}

/// Explicit mapping from a [`Record`] into a caller type.
///
/// # Example
///
/// ```ignore
/// struct Product {
///     id: String,
///     price: i64,
/// }
///
/// impl FromRecord for Product {
///     fn from_record(record: &Record) -> DbResult<Self> {
///         Ok(Self {
///             id: record.try_get("id")?,
///             price: record.try_get("price")?,
///         })
///     }
/// }
/// ```
pub trait FromRecord: Sized {
    fn from_record(record: &Record) -> DbResult<Self>;
}

impl FromRecord for Record {
    fn from_record(record: &Record) -> DbResult<Self> {
        Ok(record.clone())
    }
}

impl FromRecord for serde_json::Value {
    fn from_record(record: &Record) -> DbResult<Self> {
        serde_json::to_value(record).map_err(|e| DbError::decode("*", e.to_string()))
    }
}

macro_rules! impl_from_record_tuple {
    ($($idx:tt => $t:ident),+) => {
        impl<$($t: FromValue),+> FromRecord for ($($t,)+) {
            fn from_record(record: &Record) -> DbResult<Self> {
                Ok(($(record.try_get_index::<$t>($idx)?,)+))
            }
        }
    };
}

impl_from_record_tuple!(0 => A);
impl_from_record_tuple!(0 => A, 1 => B);
impl_from_record_tuple!(0 => A, 1 => B, 2 => C);
impl_from_record_tuple!(0 => A, 1 => B, 2 => C, 3 => D);
