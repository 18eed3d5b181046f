use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::{Number, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, Result};
use crate::serialize::format_date;

/// 12-byte document identifier: 4 bytes of seconds since the epoch followed
/// by 8 random bytes. Rendered as 24 lowercase hex digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    pub fn new() -> Self {
        let seconds = Utc::now().timestamp().clamp(0, u32::MAX as i64) as u32;
        let random = uuid::Uuid::new_v4();
        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..].copy_from_slice(&random.as_bytes()[..8]);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    pub fn parse_str(raw: &str) -> Option<Self> {
        if raw.len() != 24 || !raw.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; 12];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&raw[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let mut seconds = [0u8; 4];
        seconds.copy_from_slice(&self.0[..4]);
        DateTime::from_timestamp(u32::from_be_bytes(seconds) as i64, 0)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for ObjectId {
    type Err = ModelError;

    fn from_str(raw: &str) -> Result<Self> {
        Self::parse_str(raw).ok_or_else(|| {
            ModelError::coercion("id".to_string(), format!("invalid object id '{raw}'"))
        })
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

pub type StoredDocument = IndexMap<String, StoredValue>;

/// Value as the document store holds it.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Date(DateTime<Utc>),
    ObjectId(ObjectId),
    Array(Vec<StoredValue>),
    Document(StoredDocument),
    Json(Value),
}

impl StoredValue {
    /// Untyped conversion; objects become documents.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => Self::Number(n.clone()),
            Value::String(s) => Self::String(s.clone()),
            Value::Array(items) => Self::Array(items.iter().map(Self::from_json).collect()),
            Value::Object(entries) => Self::Document(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), Self::from_json(value)))
                    .collect(),
            ),
        }
    }

    /// Service-facing form: identifiers as hex strings, dates canonicalized.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) => Value::String(s.clone()),
            Self::Date(date) => Value::String(format_date(date)),
            Self::ObjectId(id) => Value::String(id.to_hex()),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Document(doc) => document_to_json(doc),
            Self::Json(value) => value.clone(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_object_id(&self) -> Option<&ObjectId> {
        match self {
            Self::ObjectId(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::Date(date) => Some(date),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[StoredValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&StoredDocument> {
        match self {
            Self::Document(doc) => Some(doc),
            _ => None,
        }
    }
}

pub fn document_to_json(doc: &StoredDocument) -> Value {
    Value::Object(
        doc.iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect(),
    )
}
