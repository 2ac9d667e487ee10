//! Type codec registry
//!
//! Maps declared field types to their overflow (JSON) encodings and maps
//! declared column type names to native-column decodings. The registry is
//! built once at startup - kinds, column types, then codecs - handed to the
//! store, and immutable afterwards. Lookups that miss a `Custom` type fail
//! loudly; that is a wiring mistake, not a runtime condition.
//!
//! Built-in column types: `timestamp`/`datetime`, `decimal`, `boolean`/
//! `bool`, `json`. Registering a kind also binds its table name as a column
//! type decoding to a lazy record reference.

use std::collections::HashMap;

use rusqlite::types::Value as SqlValue;
use serde_json::Value as JsonValue;

use crate::kind::{FieldType, RecordKind};
use crate::record::Record;
use crate::records::RecordList;
use crate::value::{self, Value};
use crate::{Error, Result};

/// Encode/decode pair for one host-defined value type
///
/// A codec registered under a built-in type name overrides the structural
/// rules for that type; a codec registered under a `Custom` type name is
/// the only way values of that type move through the overflow column.
pub trait ValueCodec: Send + Sync {
    /// Type name the codec is registered under
    fn type_name(&self) -> &'static str;

    /// Value to place in the overflow object; never called with null
    fn encode(&self, value: &Value) -> Result<JsonValue>;

    /// Reverse of `encode`; never called with null
    fn decode(&self, primitive: &JsonValue) -> Result<Value>;
}

/// Registry of record kinds, declared column types, and codecs
pub struct Registry {
    kinds: HashMap<&'static str, &'static RecordKind>,
    columns: HashMap<String, FieldType>,
    codecs: HashMap<String, Box<dyn ValueCodec>>,
}

impl Registry {
    pub fn new() -> Self {
        let mut registry = Self {
            kinds: HashMap::new(),
            columns: HashMap::new(),
            codecs: HashMap::new(),
        };
        for (decl, ty) in [
            ("timestamp", FieldType::Timestamp),
            ("datetime", FieldType::Timestamp),
            ("decimal", FieldType::Decimal),
            ("boolean", FieldType::Bool),
            ("bool", FieldType::Bool),
            ("json", FieldType::Json),
        ] {
            registry.columns.insert(decl.to_string(), ty);
        }
        registry
    }

    /// Register a record kind; its table name becomes a declared column
    /// type decoding to a lazy reference of that kind
    pub fn register_kind(&mut self, kind: &'static RecordKind) {
        self.kinds.insert(kind.table, kind);
        // column type lookups are lowercased, the kinds map is not
        self.columns.insert(kind.table.to_ascii_lowercase(), FieldType::Record(kind.table));
    }

    /// Bind a declared column type name (as written in CREATE TABLE) to a
    /// field type
    pub fn register_column(&mut self, decl: &str, ty: FieldType) {
        self.columns.insert(decl.to_ascii_lowercase(), ty);
    }

    /// Install or overwrite the codec for its type name
    pub fn register_codec(&mut self, codec: Box<dyn ValueCodec>) {
        self.codecs.insert(codec.type_name().to_string(), codec);
    }

    /// Look up a registered kind; a miss is a wiring error
    pub fn kind(&self, name: &str) -> Result<&'static RecordKind> {
        self.kinds
            .get(name)
            .copied()
            .ok_or_else(|| Error::Codec(format!("no record kind registered for {name:?}")))
    }

    /// Field type bound to a declared column type name, if any
    pub fn column_type(&self, decl: &str) -> Option<FieldType> {
        self.columns.get(&decl.to_ascii_lowercase()).copied()
    }

    /// Encode a field value for the overflow object
    pub fn encode_overflow(&self, declared: FieldType, val: &Value) -> Result<JsonValue> {
        if val.is_null() {
            return Ok(JsonValue::Null);
        }
        if let Some(codec) = self.codecs.get(declared.name()) {
            return codec.encode(val);
        }
        if let FieldType::Custom(name) = declared {
            return Err(Error::Codec(format!("no codec registered for type {name:?}")));
        }
        self.encode_value(val)
    }

    /// Structural encoding driven by the value itself: records become their
    /// identifier, record lists an identifier array, primitives pass through
    fn encode_value(&self, val: &Value) -> Result<JsonValue> {
        if let Some(codec) = self.codecs.get(val.type_name()) {
            return codec.encode(val);
        }
        match val {
            Value::Null => Ok(JsonValue::Null),
            Value::Bool(b) => Ok(JsonValue::Bool(*b)),
            Value::Integer(i) => Ok(JsonValue::from(*i)),
            Value::Real(r) => serde_json::Number::from_f64(*r)
                .map(JsonValue::Number)
                .ok_or_else(|| Error::Codec(format!("non-finite real {r} has no overflow encoding"))),
            Value::Text(s) => Ok(JsonValue::String(s.clone())),
            Value::Blob(_) => Err(Error::Codec("blob values have no overflow encoding".into())),
            Value::Decimal(d) => Ok(JsonValue::String(d.to_string())),
            Value::Timestamp(t) => Ok(JsonValue::String(value::format_timestamp(t))),
            Value::Tags(t) => {
                Ok(JsonValue::Array(t.iter().map(|s| JsonValue::String(s.to_string())).collect()))
            }
            Value::Record(r) => Ok(JsonValue::from(r.id())),
            Value::Records(l) => {
                Ok(JsonValue::Array(l.ids().into_iter().map(JsonValue::from).collect()))
            }
            Value::List(items) => items
                .iter()
                .map(|v| self.encode_value(v))
                .collect::<Result<Vec<_>>>()
                .map(JsonValue::Array),
            Value::Json(j) => Ok(j.clone()),
        }
    }

    /// Decode an overflow primitive back to the declared type. JSON null
    /// decodes to `Value::Null` regardless of type; no codec or constructor
    /// ever sees an absent value.
    pub fn decode_overflow(&self, declared: FieldType, primitive: &JsonValue) -> Result<Value> {
        if primitive.is_null() {
            return Ok(Value::Null);
        }
        if let Some(codec) = self.codecs.get(declared.name()) {
            return codec.decode(primitive);
        }
        match declared {
            FieldType::Integer => primitive
                .as_i64()
                .map(Value::Integer)
                .ok_or_else(|| decode_mismatch(declared, primitive)),
            FieldType::Real => primitive
                .as_f64()
                .map(Value::Real)
                .ok_or_else(|| decode_mismatch(declared, primitive)),
            FieldType::Bool => {
                if let Some(b) = primitive.as_bool() {
                    Ok(Value::Bool(b))
                } else if let Some(i) = primitive.as_i64() {
                    Ok(Value::Bool(i != 0))
                } else {
                    Err(decode_mismatch(declared, primitive))
                }
            }
            FieldType::Text => primitive
                .as_str()
                .map(|s| Value::Text(s.to_string()))
                .ok_or_else(|| decode_mismatch(declared, primitive)),
            FieldType::Decimal => {
                let literal = match primitive {
                    JsonValue::String(s) => s.clone(),
                    JsonValue::Number(n) => n.to_string(),
                    _ => return Err(decode_mismatch(declared, primitive)),
                };
                literal.parse().map(Value::Decimal)
            }
            FieldType::Timestamp => primitive
                .as_str()
                .ok_or_else(|| decode_mismatch(declared, primitive))
                .and_then(|s| value::parse_timestamp(s).map(Value::Timestamp)),
            FieldType::Json => Ok(Value::Json(primitive.clone())),
            FieldType::Record(kind_name) => {
                let kind = self.kind(kind_name)?;
                primitive
                    .as_i64()
                    .map(|id| Value::Record(Box::new(Record::reference(kind, id))))
                    .ok_or_else(|| decode_mismatch(declared, primitive))
            }
            FieldType::Records(kind_name) => {
                let kind = self.kind(kind_name)?;
                let array = primitive
                    .as_array()
                    .ok_or_else(|| decode_mismatch(declared, primitive))?;
                let mut ids = Vec::with_capacity(array.len());
                for element in array {
                    ids.push(element.as_i64().ok_or_else(|| decode_mismatch(declared, element))?);
                }
                Ok(Value::Records(RecordList::from_ids(kind, ids)))
            }
            FieldType::Custom(name) => {
                Err(Error::Codec(format!("no codec registered for type {name:?}")))
            }
        }
    }

    /// Decode a native column by its declared type. Columns with no
    /// registered declared type copy through as the raw SQL value.
    pub fn decode_column(&self, decl: Option<&str>, raw: &SqlValue) -> Result<Value> {
        if matches!(raw, SqlValue::Null) {
            return Ok(Value::Null);
        }
        let Some(declared) = decl.and_then(|d| self.column_type(d)) else {
            return Ok(copy_through(raw));
        };
        let primitive = match declared {
            // stored as JSON text, parsed before type decoding
            FieldType::Json | FieldType::Records(_) => match raw {
                SqlValue::Text(s) => serde_json::from_str(s)?,
                other => {
                    return Err(Error::Codec(format!(
                        "cannot decode {} column from {other:?}",
                        declared.name()
                    )));
                }
            },
            _ => lift(raw)?,
        };
        self.decode_overflow(declared, &primitive)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_mismatch(declared: FieldType, primitive: &JsonValue) -> Error {
    Error::Codec(format!("cannot decode {primitive} as {}", declared.name()))
}

fn copy_through(raw: &SqlValue) -> Value {
    match raw {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::Integer(*i),
        SqlValue::Real(r) => Value::Real(*r),
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Blob(b) => Value::Blob(b.clone()),
    }
}

fn lift(raw: &SqlValue) -> Result<JsonValue> {
    match raw {
        SqlValue::Null => Ok(JsonValue::Null),
        SqlValue::Integer(i) => Ok(JsonValue::from(*i)),
        SqlValue::Real(r) => serde_json::Number::from_f64(*r)
            .map(JsonValue::Number)
            .ok_or_else(|| Error::Codec(format!("non-finite real {r} in column"))),
        SqlValue::Text(s) => Ok(JsonValue::String(s.clone())),
        SqlValue::Blob(_) => Err(Error::Codec("blob columns have no declared-type decoding".into())),
    }
}
