//! Dynamically typed scalar values.
//!
//! [`Value`] is what bindings and result cells are made of. It is encoded for the
//! server through `ToSql` using the parameter type the server inferred, and decoded
//! from any common built-in column type through `FromSql`.

use std::error::Error;
use std::fmt;
use std::str::FromStr;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::ser::{Serialize, Serializer};
use thiserror::Error;
use tokio_postgres::types::{FromSql, IsNull, Kind, ToSql, Type, to_sql_checked};
use uuid::Uuid;

type SqlResult<T> = Result<T, Box<dyn Error + Sync + Send>>;

/// A single scalar: one bind value or one result cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Uuid(Uuid),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in conversion errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Date(_) => "date",
            Value::Timestamp(_) => "timestamp",
            Value::TimestampTz(_) => "timestamptz",
            Value::Uuid(_) => "uuid",
            Value::Json(_) => "json",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        i64::from_value(self.clone()).ok()
    }

    /// Convert into any [`FromValue`] type.
    pub fn convert<T: FromValue>(self) -> Result<T, ConversionError> {
        T::from_value(self)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Text(s) => f.write_str(s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Date(d) => write!(f, "{d}"),
            Value::Timestamp(t) => write!(f, "{t}"),
            Value::TimestampTz(t) => write!(f, "{t}"),
            Value::Uuid(u) => write!(f, "{u}"),
            Value::Json(j) => write!(f, "{j}"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Decimal(d) => serializer.collect_str(d),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Bytes(b) => {
                use base64::Engine as _;
                serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(b))
            }
            Value::Date(d) => d.serialize(serializer),
            Value::Timestamp(t) => t.serialize(serializer),
            Value::TimestampTz(t) => t.serialize(serializer),
            Value::Uuid(u) => u.serialize(serializer),
            Value::Json(j) => j.serialize(serializer),
        }
    }
}

// ==================== From conversions ====================

macro_rules! impl_from {
    ($($ty:ty => $variant:ident $(as $cast:ty)?),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v $(as $cast)?)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i8 => Int as i64,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int,
    u8 => Int as i64,
    u16 => Int as i64,
    u32 => Int as i64,
    f32 => Float as f64,
    f64 => Float,
    Decimal => Decimal,
    String => Text,
    Vec<u8> => Bytes,
    NaiveDate => Date,
    NaiveDateTime => Timestamp,
    DateTime<Utc> => TimestampTz,
    Uuid => Uuid,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<&Value> for Value {
    fn from(v: &Value) -> Self {
        v.clone()
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// JSON scalars map onto the matching variant; arrays and objects stay JSON.
impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map_or(Value::Null, Value::Float),
            },
            serde_json::Value::String(s) => Value::Text(s),
            other => Value::Json(other),
        }
    }
}

// ==================== Postgres encoding ====================

fn encode<T: ToSql>(value: &T, ty: &Type, out: &mut BytesMut) -> SqlResult<IsNull> {
    if T::accepts(ty) {
        value.to_sql(ty, out)
    } else {
        Err(format!(
            "cannot bind {} as a {} parameter",
            std::any::type_name::<T>(),
            ty
        )
        .into())
    }
}

fn is_textual(ty: &Type) -> bool {
    <&str as ToSql>::accepts(ty)
}

fn encode_int(v: i64, ty: &Type, out: &mut BytesMut) -> SqlResult<IsNull> {
    if *ty == Type::INT8 {
        v.to_sql(ty, out)
    } else if *ty == Type::INT4 {
        i32::try_from(v)?.to_sql(ty, out)
    } else if *ty == Type::INT2 {
        i16::try_from(v)?.to_sql(ty, out)
    } else if *ty == Type::OID {
        u32::try_from(v)?.to_sql(ty, out)
    } else if *ty == Type::FLOAT8 {
        (v as f64).to_sql(ty, out)
    } else if *ty == Type::FLOAT4 {
        (v as f32).to_sql(ty, out)
    } else if *ty == Type::NUMERIC {
        Decimal::from(v).to_sql(ty, out)
    } else if *ty == Type::BOOL {
        (v != 0).to_sql(ty, out)
    } else if is_textual(ty) {
        v.to_string().as_str().to_sql(ty, out)
    } else {
        encode(&v, ty, out)
    }
}

fn encode_float(v: f64, ty: &Type, out: &mut BytesMut) -> SqlResult<IsNull> {
    if *ty == Type::FLOAT4 {
        (v as f32).to_sql(ty, out)
    } else if *ty == Type::NUMERIC {
        Decimal::from_f64(v)
            .ok_or_else(|| format!("{v} does not fit a numeric"))?
            .to_sql(ty, out)
    } else if is_textual(ty) {
        v.to_string().as_str().to_sql(ty, out)
    } else {
        encode(&v, ty, out)
    }
}

fn encode_decimal(v: &Decimal, ty: &Type, out: &mut BytesMut) -> SqlResult<IsNull> {
    if *ty == Type::FLOAT8 || *ty == Type::FLOAT4 {
        let f = v.to_f64().ok_or_else(|| format!("{v} does not fit a float"))?;
        encode_float(f, ty, out)
    } else if *ty == Type::INT8 || *ty == Type::INT4 || *ty == Type::INT2 {
        if !v.fract().is_zero() {
            return Err(format!("{v} is not an integer").into());
        }
        let i = v.to_i64().ok_or_else(|| format!("{v} does not fit an integer"))?;
        encode_int(i, ty, out)
    } else if is_textual(ty) {
        v.to_string().as_str().to_sql(ty, out)
    } else {
        encode(v, ty, out)
    }
}

/// Text is the common currency of loosely typed callers (and of decoded cursors),
/// so it is parsed into the parameter's type when that type is not textual.
fn encode_text(s: &str, ty: &Type, out: &mut BytesMut) -> SqlResult<IsNull> {
    if is_textual(ty) {
        s.to_sql(ty, out)
    } else if *ty == Type::INT8 || *ty == Type::INT4 || *ty == Type::INT2 || *ty == Type::OID {
        encode_int(s.trim().parse::<i64>()?, ty, out)
    } else if *ty == Type::FLOAT8 || *ty == Type::FLOAT4 {
        encode_float(s.trim().parse::<f64>()?, ty, out)
    } else if *ty == Type::NUMERIC {
        Decimal::from_str(s.trim())?.to_sql(ty, out)
    } else if *ty == Type::BOOL {
        parse_bool(s)?.to_sql(ty, out)
    } else if *ty == Type::DATE {
        parse_date(s)?.to_sql(ty, out)
    } else if *ty == Type::TIMESTAMP {
        parse_timestamp(s)?.to_sql(ty, out)
    } else if *ty == Type::TIMESTAMPTZ {
        parse_timestamptz(s)?.to_sql(ty, out)
    } else if *ty == Type::UUID {
        Uuid::parse_str(s.trim())?.to_sql(ty, out)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out)
    } else if *ty == Type::BYTEA {
        s.as_bytes().to_sql(ty, out)
    } else if let Kind::Enum(_) = ty.kind() {
        out.extend_from_slice(s.as_bytes());
        Ok(IsNull::No)
    } else {
        encode(&s, ty, out)
    }
}

fn parse_bool(s: &str) -> SqlResult<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "1" | "yes" | "on" => Ok(true),
        "f" | "false" | "0" | "no" | "off" => Ok(false),
        other => Err(format!("'{other}' is not a boolean").into()),
    }
}

fn parse_date(s: &str) -> SqlResult<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| parse_timestamp(s).map(|t| t.date()))
        .map_err(|_| format!("'{s}' is not a date").into())
}

const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

fn parse_timestamp(s: &str) -> SqlResult<NaiveDateTime> {
    let s = s.trim();
    for format in TIMESTAMP_FORMATS {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(t);
        }
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.naive_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d.and_time(chrono::NaiveTime::MIN));
    }
    Err(format!("'{s}' is not a timestamp").into())
}

fn parse_timestamptz(s: &str) -> SqlResult<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(s.trim()) {
        Ok(t) => Ok(t.with_timezone(&Utc)),
        Err(_) => parse_timestamp(s).map(|t| t.and_utc()),
    }
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> SqlResult<IsNull> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => {
                if is_textual(ty) {
                    b.to_string().as_str().to_sql(ty, out)
                } else {
                    encode(b, ty, out)
                }
            }
            Value::Int(i) => encode_int(*i, ty, out),
            Value::Float(f) => encode_float(*f, ty, out),
            Value::Decimal(d) => encode_decimal(d, ty, out),
            Value::Text(s) => encode_text(s, ty, out),
            Value::Bytes(b) => encode(b, ty, out),
            Value::Date(d) => {
                if *ty == Type::TIMESTAMP {
                    d.and_time(chrono::NaiveTime::MIN).to_sql(ty, out)
                } else if is_textual(ty) {
                    d.to_string().as_str().to_sql(ty, out)
                } else {
                    encode(d, ty, out)
                }
            }
            Value::Timestamp(t) => {
                if *ty == Type::TIMESTAMPTZ {
                    t.and_utc().to_sql(ty, out)
                } else if *ty == Type::DATE {
                    t.date().to_sql(ty, out)
                } else if is_textual(ty) {
                    t.to_string().as_str().to_sql(ty, out)
                } else {
                    encode(t, ty, out)
                }
            }
            Value::TimestampTz(t) => {
                if *ty == Type::TIMESTAMP {
                    t.naive_utc().to_sql(ty, out)
                } else if is_textual(ty) {
                    t.to_rfc3339().as_str().to_sql(ty, out)
                } else {
                    encode(t, ty, out)
                }
            }
            Value::Uuid(u) => {
                if is_textual(ty) {
                    u.to_string().as_str().to_sql(ty, out)
                } else {
                    encode(u, ty, out)
                }
            }
            Value::Json(j) => {
                if is_textual(ty) {
                    j.to_string().as_str().to_sql(ty, out)
                } else {
                    encode(j, ty, out)
                }
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

impl<'a> FromSql<'a> for Value {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> SqlResult<Self> {
        let value = if *ty == Type::BOOL {
            Value::Bool(bool::from_sql(ty, raw)?)
        } else if *ty == Type::INT2 {
            Value::Int(i16::from_sql(ty, raw)?.into())
        } else if *ty == Type::INT4 {
            Value::Int(i32::from_sql(ty, raw)?.into())
        } else if *ty == Type::INT8 {
            Value::Int(i64::from_sql(ty, raw)?)
        } else if *ty == Type::OID {
            Value::Int(u32::from_sql(ty, raw)?.into())
        } else if *ty == Type::FLOAT4 {
            Value::Float(f32::from_sql(ty, raw)?.into())
        } else if *ty == Type::FLOAT8 {
            Value::Float(f64::from_sql(ty, raw)?)
        } else if *ty == Type::NUMERIC {
            Value::Decimal(Decimal::from_sql(ty, raw)?)
        } else if *ty == Type::DATE {
            Value::Date(NaiveDate::from_sql(ty, raw)?)
        } else if *ty == Type::TIMESTAMP {
            Value::Timestamp(NaiveDateTime::from_sql(ty, raw)?)
        } else if *ty == Type::TIMESTAMPTZ {
            Value::TimestampTz(DateTime::<Utc>::from_sql(ty, raw)?)
        } else if *ty == Type::UUID {
            Value::Uuid(Uuid::from_sql(ty, raw)?)
        } else if *ty == Type::JSON || *ty == Type::JSONB {
            Value::Json(serde_json::Value::from_sql(ty, raw)?)
        } else if *ty == Type::BYTEA {
            Value::Bytes(Vec::<u8>::from_sql(ty, raw)?)
        } else if <&str as FromSql>::accepts(ty) {
            Value::Text(<&str as FromSql>::from_sql(ty, raw)?.to_string())
        } else if let Kind::Enum(_) = ty.kind() {
            Value::Text(std::str::from_utf8(raw)?.to_string())
        } else {
            return Err(format!("unsupported column type {ty}").into());
        };
        Ok(value)
    }

    fn from_sql_null(_ty: &Type) -> SqlResult<Self> {
        Ok(Value::Null)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

// ==================== Typed extraction ====================

/// A [`Value`] could not be converted into the requested Rust type.
#[derive(Debug, Clone, Error)]
#[error("cannot convert {found} value to {expected}")]
pub struct ConversionError {
    pub expected: &'static str,
    pub found: &'static str,
}

impl ConversionError {
    fn new<T>(value: &Value) -> Self {
        Self {
            expected: std::any::type_name::<T>(),
            found: value.type_name(),
        }
    }
}

/// Types that can be extracted from a [`Value`].
///
/// Conversions are lenient where no information is lost: an integral decimal
/// (what `sum` returns for integer columns) converts to `i64`, text parses into
/// numbers and dates.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, ConversionError>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        Ok(value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Int(i) => Ok(i != 0),
            Value::Text(ref s) => parse_bool(s).map_err(|_| ConversionError::new::<Self>(&value)),
            other => Err(ConversionError::new::<Self>(&other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        let out = match &value {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            Value::Float(f) if f.fract() == 0.0 => f.to_i64(),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        };
        out.ok_or_else(|| ConversionError::new::<Self>(&value))
    }
}

macro_rules! impl_from_value_narrow {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self, ConversionError> {
                    let err = ConversionError::new::<Self>(&value);
                    let wide = i64::from_value(value).map_err(|_| err.clone())?;
                    <$ty>::try_from(wide).map_err(|_| err)
                }
            }
        )*
    };
}

impl_from_value_narrow!(i16, i32, u32);

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        let out = match &value {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Decimal(d) => d.to_f64(),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        };
        out.ok_or_else(|| ConversionError::new::<Self>(&value))
    }
}

impl FromValue for Decimal {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        let out = match &value {
            Value::Decimal(d) => Some(*d),
            Value::Int(i) => Some(Decimal::from(*i)),
            Value::Float(f) => Decimal::from_f64(*f),
            Value::Text(s) => Decimal::from_str(s.trim()).ok(),
            _ => None,
        };
        out.ok_or_else(|| ConversionError::new::<Self>(&value))
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Text(s) => Ok(s),
            Value::Null | Value::Bytes(_) => Err(ConversionError::new::<Self>(&value)),
            other => Ok(other.to_string()),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Bytes(b) => Ok(b),
            Value::Text(s) => Ok(s.into_bytes()),
            other => Err(ConversionError::new::<Self>(&other)),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match &value {
            Value::Date(d) => Ok(*d),
            Value::Timestamp(t) => Ok(t.date()),
            Value::TimestampTz(t) => Ok(t.date_naive()),
            Value::Text(s) => parse_date(s).map_err(|_| ConversionError::new::<Self>(&value)),
            _ => Err(ConversionError::new::<Self>(&value)),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match &value {
            Value::Timestamp(t) => Ok(*t),
            Value::TimestampTz(t) => Ok(t.naive_utc()),
            Value::Date(d) => Ok(d.and_time(chrono::NaiveTime::MIN)),
            Value::Text(s) => parse_timestamp(s).map_err(|_| ConversionError::new::<Self>(&value)),
            _ => Err(ConversionError::new::<Self>(&value)),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match &value {
            Value::TimestampTz(t) => Ok(*t),
            Value::Timestamp(t) => Ok(t.and_utc()),
            Value::Text(s) => {
                parse_timestamptz(s).map_err(|_| ConversionError::new::<Self>(&value))
            }
            _ => Err(ConversionError::new::<Self>(&value)),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match &value {
            Value::Uuid(u) => Ok(*u),
            Value::Text(s) => {
                Uuid::parse_str(s.trim()).map_err(|_| ConversionError::new::<Self>(&value))
            }
            _ => Err(ConversionError::new::<Self>(&value)),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Json(j) => Ok(j),
            other => serde_json::to_value(&other).map_err(|_| ConversionError::new::<Self>(&other)),
        }
    }
}
