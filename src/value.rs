//! Runtime field values
//!
//! One closed union covers everything a record field can hold: native SQL
//! primitives, timestamps, exact decimals, tag sets, lazy record references
//! and record lists, plus raw JSON for schema-less columns. Equality
//! follows record identity (a record reference equals another reference, or
//! a bare integer, with the same identifier) and numeric value across the
//! integer/real split.

use std::fmt;

use chrono::{NaiveDateTime, Timelike, Utc};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};

use crate::decimal::Decimal;
use crate::record::Record;
use crate::records::RecordList;
use crate::tags::TagSet;
use crate::{Error, Result};

/// A single field value, in memory or bound to a statement
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Decimal(Decimal),
    Timestamp(NaiveDateTime),
    Tags(TagSet),
    Record(Box<Record>),
    Records(RecordList),
    List(Vec<Value>),
    Json(serde_json::Value),
}

impl Value {
    /// The current wall-clock time as a timestamp value. Truncated to
    /// microseconds, the precision the stored encoding keeps.
    pub fn now() -> Self {
        let t = Utc::now().naive_utc();
        let truncated = t.with_nanosecond(t.nanosecond() / 1_000 * 1_000).unwrap_or(t);
        Value::Timestamp(truncated)
    }

    /// Type name used for codec lookup; record values answer their kind
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
            Value::Decimal(_) => "decimal",
            Value::Timestamp(_) => "timestamp",
            Value::Tags(_) => "tags",
            Value::Record(r) => r.kind().table,
            Value::Records(l) => l.kind().table,
            Value::List(_) => "list",
            Value::Json(_) => "json",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether a skip-falsy filter drops this value: null, false, zero,
    /// empty text, or an empty collection
    pub fn is_falsy(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !b,
            Value::Integer(i) => *i == 0,
            Value::Real(r) => *r == 0.0,
            Value::Text(s) => s.is_empty(),
            Value::Blob(b) => b.is_empty(),
            Value::Decimal(d) => d.is_zero(),
            Value::Timestamp(_) => false,
            Value::Tags(t) => t.is_empty(),
            Value::Record(_) => false,
            Value::Records(l) => l.is_empty(),
            Value::List(v) => v.is_empty(),
            Value::Json(j) => j.is_null(),
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
            Value::Integer(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<&Decimal> {
        match self {
            Value::Decimal(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<&NaiveDateTime> {
        match self {
            Value::Timestamp(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_tags(&self) -> Option<&TagSet> {
        match self {
            Value::Tags(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_records(&self) -> Option<&RecordList> {
        match self {
            Value::Records(l) => Some(l),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a == b,
            (Value::Integer(a), Value::Real(b)) | (Value::Real(b), Value::Integer(a)) => {
                *a as f64 == *b
            }
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Tags(a), Value::Tags(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a.id() == b.id(),
            (Value::Record(r), Value::Integer(i)) | (Value::Integer(i), Value::Record(r)) => {
                r.id() == *i
            }
            (Value::Records(a), Value::Records(b)) => a.ids() == b.ids(),
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Json(a), Value::Json(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Blob(b) => write!(f, "<{} byte blob>", b.len()),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Timestamp(t) => write!(f, "{}", format_timestamp(t)),
            Value::Tags(t) => {
                write!(f, "[{}]", t.iter().collect::<Vec<_>>().join(","))
            }
            Value::Record(r) => write!(f, "{r}"),
            Value::Records(l) => write!(f, "{l}"),
            Value::List(v) => {
                let parts: Vec<String> = v.iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Json(j) => write!(f, "{j}"),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let out = match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(*b as i64)),
            Value::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Real(r) => ToSqlOutput::Owned(SqlValue::Real(*r)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Decimal(d) => ToSqlOutput::Owned(SqlValue::Text(d.to_string())),
            Value::Timestamp(t) => ToSqlOutput::Owned(SqlValue::Text(format_timestamp(t))),
            Value::Tags(t) => {
                let json = t.to_json().map_err(to_sql_failure)?;
                ToSqlOutput::Owned(SqlValue::Text(json))
            }
            Value::Record(r) => ToSqlOutput::Owned(SqlValue::Integer(r.id())),
            Value::Records(l) => {
                let json = serde_json::to_string(&l.ids()).map_err(to_sql_failure)?;
                ToSqlOutput::Owned(SqlValue::Text(json))
            }
            Value::List(_) => {
                return Err(rusqlite::Error::ToSqlConversionFailure(
                    "list values bind only inside IN predicates".into(),
                ));
            }
            Value::Json(j) => {
                let json = serde_json::to_string(j).map_err(to_sql_failure)?;
                ToSqlOutput::Owned(SqlValue::Text(json))
            }
        };
        Ok(out)
    }
}

fn to_sql_failure<E>(e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::ToSqlConversionFailure(Box::new(e))
}

/// Canonical timestamp encoding: ISO-8601 with microseconds
pub fn format_timestamp(t: &NaiveDateTime) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Parse the canonical encoding, tolerating a missing fractional part
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|e| Error::Codec(format!("invalid timestamp {s:?}: {e}")))
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl From<TagSet> for Value {
    fn from(v: TagSet) -> Self {
        Value::Tags(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Record(Box::new(v))
    }
}

impl From<RecordList> for Value {
    fn from(v: RecordList) -> Self {
        Value::Records(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}
