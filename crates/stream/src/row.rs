//! Row encoding and size estimation
//!
//! Rows arrive as a field-name to value mapping. Encoding normalizes them
//! into a [`Record`] with a stable field order and an estimated wire size,
//! computed with the protobuf length formulas the write service uses.
//!
//! Field tags are assigned by position in the sorted field order, starting
//! at 1. Values without a native wire type (nested JSON, null) are sized by
//! the length of their JSON text.

use std::collections::{BTreeMap, HashMap};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use prost::encoding;
use serde::{Serialize, Serializer};

/// A single field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Bytes(Bytes),
    Int(i64),
    Bool(bool),
    Float(f32),
    Double(f64),
    /// Anything without a native wire type
    Json(serde_json::Value),
}

/// Rows as handed in by callers
pub type Row = HashMap<String, Value>;

impl Value {
    /// Estimated protobuf-encoded length of this value under `tag`
    pub fn encoded_len(&self, tag: u32) -> usize {
        match self {
            Value::String(v) => encoding::string::encoded_len(tag, v),
            Value::Bytes(v) => encoding::bytes::encoded_len(tag, v),
            Value::Int(v) => encoding::int64::encoded_len(tag, v),
            Value::Bool(v) => encoding::bool::encoded_len(tag, v),
            Value::Float(v) => encoding::float::encoded_len(tag, v),
            Value::Double(v) => encoding::double::encoded_len(tag, v),
            Value::Json(v) => encoding::string::encoded_len(tag, &v.to_string()),
        }
    }

    fn has_wire_type(&self) -> bool {
        !matches!(self, Value::Json(_))
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::String(v) => serializer.serialize_str(v),
            Value::Bytes(v) => serializer.serialize_str(&BASE64.encode(v)),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Float(v) => serializer.serialize_f32(*v),
            Value::Double(v) => serializer.serialize_f64(*v),
            Value::Json(v) => v.serialize(serializer),
        }
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(Bytes::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => Value::Int(i),
                (None, Some(f)) => Value::Double(f),
                (None, None) => Value::Json(serde_json::Value::Number(n)),
            },
            other => Value::Json(other),
        }
    }
}

/// An encoded row ready for batching
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, Value>,
    estimated_size: usize,
}

impl Record {
    /// Normalize a row and estimate its encoded size
    pub fn encode(row: Row) -> Self {
        let fields: BTreeMap<String, Value> = row.into_iter().collect();
        let mut estimated_size = 0;

        for (index, (name, value)) in fields.iter().enumerate() {
            if !value.has_wire_type() {
                tracing::warn!(
                    field = %name,
                    "value has no wire type, estimating size from its JSON text"
                );
            }
            estimated_size += value.encoded_len(index as u32 + 1);
        }

        Self {
            fields,
            estimated_size,
        }
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Estimated encoded size in bytes
    pub fn estimated_size(&self) -> usize {
        self.estimated_size
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}
