//! Runtime row values.
//!
//! This module defines the [`Value`] type carried through row mutation and
//! the index key derivation. All comparisons and index keys operate on the
//! variant; stringification is deterministic per arm.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A row is an ordered mapping from column name to value.
///
/// `BTreeMap` keeps the encoding of a row deterministic.
pub type Row = BTreeMap<String, Value>;

/// A runtime value stored in a table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer (backs INT, INTEGER, SMALLINT).
    Int(i64),
    /// 64-bit floating point (backs NUMERIC, DECIMAL, FLOAT, DOUBLE, REAL).
    Float(f64),
    /// String value (backs CHAR, CHARACTER, TEXT).
    Text(String),
    /// Binary data (backs BINARY, BLOB).
    Bytes(Vec<u8>),
    /// UUID value.
    Uuid(Uuid),
    /// Timestamp (backs DATE, TIME, TIMESTAMP, DATETIME).
    Timestamp(DateTime<Utc>),
}

/// Timestamp rendering used by [`Value::stringify`].
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl Value {
    /// Creates a text value.
    pub fn text(v: impl Into<String>) -> Self {
        Value::Text(v.into())
    }

    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Converts this value to an i64 when it carries one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Converts this value to an f64, widening integers.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the inner string of a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Deterministic string form, used as the index key derivation.
    ///
    /// Every arm renders the same bytes for the same value: integers in
    /// decimal, floats via the shortest round-trip form, bytes as lowercase
    /// hex, UUIDs hyphenated, timestamps as `YYYY-MM-DD HH:MM:SS`.
    pub fn stringify(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Bytes(b) => hex::encode(b),
            Value::Uuid(u) => u.to_string(),
            Value::Timestamp(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    /// Name of the arm, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Uuid(_) => "uuid",
            Value::Timestamp(_) => "timestamp",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
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

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}
