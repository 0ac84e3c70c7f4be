//! Scalar values carried by records, and their SQLite encoding.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use serde::ser::{Error as _, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::schema::SqlType;

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const TIME_FORMAT: &str = "%H:%M:%S%.6f";
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const TIME_PARSE_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"];
const DATETIME_PARSE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Core value types for SQLite operations
///
/// Equality is numeric across `Integer` and `Real`: `Integer(2) == Real(2.0)`.
/// A whole number written to a float column reads back equal to what was
/// written.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    /// Exact decimal kept in its textual form.
    Decimal(String),
    Text(String),
    Blob(Vec<u8>),
    Boolean(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Duration(TimeDelta),
    List(Vec<serde_json::Value>),
    Map(serde_json::Map<String, serde_json::Value>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a == b,
            (Value::Integer(i), Value::Real(f)) | (Value::Real(f), Value::Integer(i)) => {
                integer_equals_real(*i, *f)
            }
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Duration(a), Value::Duration(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

/// Exact comparison: `f` must be a whole number inside the `i64` range.
fn integer_equals_real(i: i64, f: f64) -> bool {
    f >= i64::MIN as f64 && f < i64::MAX as f64 && f.fract() == 0.0 && f as i64 == i
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the value kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Decimal(_) => "decimal",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
            Value::Boolean(_) => "boolean",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::DateTime(_) => "datetime",
            Value::Duration(_) => "duration",
            Value::List(_) => "list",
            Value::Map(_) => "mapping",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Decimal(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Decodes a raw SQLite value according to the column's declared type.
    pub(crate) fn from_sql(raw: ValueRef<'_>, sql_type: &SqlType, column: &str) -> Result<Value> {
        let conversion = |message: String| Error::Conversion {
            column: column.to_string(),
            message,
        };
        let text = |bytes: &[u8]| {
            std::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(|e| conversion(e.to_string()))
        };

        let value = match (sql_type, raw) {
            (_, ValueRef::Null) => Value::Null,
            (SqlType::Boolean, ValueRef::Integer(i)) => Value::Boolean(i != 0),
            (SqlType::Float, ValueRef::Integer(i)) => Value::Real(i as f64),
            (SqlType::Numeric, ValueRef::Integer(i)) => Value::Decimal(i.to_string()),
            (SqlType::Numeric, ValueRef::Real(f)) => Value::Decimal(f.to_string()),
            (SqlType::Numeric, ValueRef::Text(bytes)) => Value::Decimal(text(bytes)?),
            (SqlType::Date, ValueRef::Text(bytes)) => {
                let s = text(bytes)?;
                Value::Date(parse_date(&s).ok_or_else(|| conversion(format!("bad date '{s}'")))?)
            }
            (SqlType::Time, ValueRef::Text(bytes)) => {
                let s = text(bytes)?;
                Value::Time(parse_time(&s).ok_or_else(|| conversion(format!("bad time '{s}'")))?)
            }
            (SqlType::DateTime, ValueRef::Text(bytes)) => {
                let s = text(bytes)?;
                Value::DateTime(
                    parse_datetime(&s).ok_or_else(|| conversion(format!("bad datetime '{s}'")))?,
                )
            }
            (SqlType::Interval, ValueRef::Integer(micros)) => {
                Value::Duration(TimeDelta::microseconds(micros))
            }
            (SqlType::Array | SqlType::Json, ValueRef::Text(bytes)) => {
                match serde_json::from_slice(bytes).map_err(|e| conversion(e.to_string()))? {
                    serde_json::Value::Array(items) => Value::List(items),
                    serde_json::Value::Object(map) => Value::Map(map),
                    other => return Err(conversion(format!("expected JSON container, got {other}"))),
                }
            }
            (_, ValueRef::Integer(i)) => Value::Integer(i),
            (_, ValueRef::Real(f)) => Value::Real(f),
            (_, ValueRef::Text(bytes)) => Value::Text(text(bytes)?),
            (_, ValueRef::Blob(bytes)) => Value::Blob(bytes.to_vec()),
        };
        Ok(value)
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    TIME_PARSE_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    DATETIME_PARSE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| parse_date(s).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

fn owned_text<'a>(s: String) -> ToSqlOutput<'a> {
    ToSqlOutput::Owned(SqlValue::Text(s))
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let json_failure = |e: serde_json::Error| rusqlite::Error::ToSqlConversionFailure(Box::new(e));
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::Decimal(s) | Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Boolean(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::Date(d) => owned_text(d.format(DATE_FORMAT).to_string()),
            Value::Time(t) => owned_text(t.format(TIME_FORMAT).to_string()),
            Value::DateTime(dt) => owned_text(dt.format(DATETIME_FORMAT).to_string()),
            Value::Duration(d) => {
                let micros = d.num_microseconds().ok_or_else(|| {
                    rusqlite::Error::ToSqlConversionFailure("duration overflows microseconds".into())
                })?;
                ToSqlOutput::Owned(SqlValue::Integer(micros))
            }
            Value::List(items) => owned_text(serde_json::to_string(items).map_err(json_failure)?),
            Value::Map(map) => owned_text(serde_json::to_string(map).map_err(json_failure)?),
        })
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Real(f) => serializer.serialize_f64(*f),
            Value::Decimal(s) | Value::Text(s) => serializer.serialize_str(s),
            Value::Blob(b) => serializer.serialize_bytes(b),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Date(d) => serializer.collect_str(&d.format(DATE_FORMAT)),
            Value::Time(t) => serializer.collect_str(&t.format(TIME_FORMAT)),
            Value::DateTime(dt) => serializer.collect_str(&dt.format(DATETIME_FORMAT)),
            Value::Duration(d) => match d.num_microseconds() {
                Some(micros) => serializer.serialize_i64(micros),
                None => Err(S::Error::custom("duration overflows microseconds")),
            },
            Value::List(items) => items.serialize(serializer),
            Value::Map(map) => map.serialize(serializer),
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

impl_from! {
    i64 => Integer,
    i32 => Integer,
    u32 => Integer,
    i16 => Integer,
    u8 => Integer,
    f64 => Real,
    f32 => Real,
    bool => Boolean,
    String => Text,
    &str => Text,
    Vec<u8> => Blob,
    &[u8] => Blob,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => DateTime,
    TimeDelta => Duration,
    Vec<serde_json::Value> => List,
    serde_json::Map<String, serde_json::Value> => Map,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Real(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => Value::List(items),
            serde_json::Value::Object(map) => Value::Map(map),
        }
    }
}
