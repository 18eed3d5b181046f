use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::{Map, Number, Value};
use std::sync::Arc;

use super::{format_date, parse_date};
use crate::error::{ModelError, Result};
use crate::registry::MetadataRegistry;
use crate::types::{BaseType, FieldBase, FieldMeta, ModelId};

/// Hydrated value tree.
///
/// Nested models and lists sit behind `Arc`, so an update through
/// [`Crystal::update_in`] clones only the path it touches and every other
/// branch stays pointer-equal to the original. Equality is by deep value.
#[derive(Debug, Clone, PartialEq)]
pub enum Crystal {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Date(DateTime<Utc>),
    Json(Value),
    List(Arc<Vec<Crystal>>),
    Map(Arc<IndexMap<String, Crystal>>),
    Model(Arc<CrystalModel>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrystalModel {
    pub model: ModelId,
    pub fields: IndexMap<String, Crystal>,
}

impl CrystalModel {
    pub fn get(&self, key: &str) -> Option<&Crystal> {
        self.fields.get(key)
    }

    /// Copy of this model with `key` replaced; other fields are shared.
    pub fn with(&self, key: impl Into<String>, value: Crystal) -> Self {
        let mut fields = self.fields.clone();
        fields.insert(key.into(), value);
        Self {
            model: self.model.clone(),
            fields,
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(key, value)| (key.clone(), value.to_value()))
                .collect(),
        )
    }
}

impl Crystal {
    pub fn as_model(&self) -> Option<&Arc<CrystalModel>> {
        match self {
            Self::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Crystal]> {
        match self {
            Self::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::Date(date) => Some(date),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Crystal> {
        match self {
            Self::Model(model) => model.get(key),
            Self::Map(entries) => entries.get(key),
            _ => None,
        }
    }

    /// Same allocation, for the variants that have one.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Model(a), Self::Model(b)) => Arc::ptr_eq(a, b),
            (Self::List(a), Self::List(b)) => Arc::ptr_eq(a, b),
            (Self::Map(a), Self::Map(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Replace the value at `path` (a chain of model field names), sharing
    /// every untouched branch. Returns `None` when the path does not lead
    /// through models.
    pub fn update_in(&self, path: &[&str], value: Crystal) -> Option<Crystal> {
        let (head, rest) = path.split_first()?;
        let model = self.as_model()?;
        let next = if rest.is_empty() {
            value
        } else {
            model.get(head)?.update_in(rest, value)?
        };
        Some(Self::Model(Arc::new(model.with(*head, next))))
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) => Value::String(s.clone()),
            Self::Date(date) => Value::String(format_date(date)),
            Self::Json(value) => value.clone(),
            Self::List(items) => Value::Array(items.iter().map(Self::to_value).collect()),
            Self::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_value()))
                    .collect(),
            ),
            Self::Model(model) => model.to_value(),
        }
    }

    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => Self::Number(n.clone()),
            Value::String(s) => Self::String(s.clone()),
            other => Self::Json(other.clone()),
        }
    }
}

impl MetadataRegistry {
    /// Hydrate a stored or raw value (or an array of them) as `id`.
    pub fn crystalize(&self, id: &ModelId, raw: &Value) -> Result<Crystal> {
        match raw {
            Value::Null => Ok(Crystal::Null),
            Value::Array(items) => items
                .iter()
                .map(|item| self.crystalize(id, item))
                .collect::<Result<Vec<_>>>()
                .map(|items| Crystal::List(Arc::new(items))),
            Value::Object(doc) => Ok(Crystal::Model(Arc::new(self.crystalize_model(id, doc)?))),
            other => Err(ModelError::coercion(
                id.key(),
                format!("cannot crystalize {other}"),
            )),
        }
    }

    fn crystalize_model(&self, id: &ModelId, doc: &Map<String, Value>) -> Result<CrystalModel> {
        let entry = self.entry(id)?;
        let mut fields = IndexMap::with_capacity(entry.fields.len());
        for meta in entry.fields.values() {
            if let Some(value) = doc.get(&meta.key) {
                fields.insert(meta.key.clone(), self.hydrate(meta, value, meta.depth())?);
            }
        }
        Ok(CrystalModel {
            model: id.clone(),
            fields,
        })
    }

    fn hydrate(&self, meta: &FieldMeta, value: &Value, depth: u8) -> Result<Crystal> {
        if value.is_null() {
            return Ok(Crystal::Null);
        }
        if depth > 0 {
            let Value::Array(items) = value else {
                return Err(ModelError::coercion(
                    meta.key.clone(),
                    format!("expected an array, got {value}"),
                ));
            };
            return items
                .iter()
                .map(|item| self.hydrate(meta, item, depth - 1))
                .collect::<Result<Vec<_>>>()
                .map(|items| Crystal::List(Arc::new(items)));
        }
        if let Some(map_value) = &meta.map_value {
            let Value::Object(entries) = value else {
                return Ok(Crystal::from_json(value));
            };
            let mut out = IndexMap::with_capacity(entries.len());
            for (key, item) in entries {
                out.insert(key.clone(), self.hydrate_leaf(meta, map_value, item)?);
            }
            return Ok(Crystal::Map(Arc::new(out)));
        }
        self.hydrate_leaf(meta, &meta.base, value)
    }

    fn hydrate_leaf(&self, meta: &FieldMeta, base: &FieldBase, value: &Value) -> Result<Crystal> {
        match (base, value) {
            (_, Value::Null) => Ok(Crystal::Null),
            // embedded models and populated references are both wrapped
            (FieldBase::Model(model), Value::Object(doc))
                if model.is_scalar() || self.contains(model) =>
            {
                Ok(Crystal::Model(Arc::new(self.crystalize_model(model, doc)?)))
            }
            (FieldBase::Primitive(BaseType::Date), _) => parse_date(value)
                .map(Crystal::Date)
                .ok_or_else(|| {
                    ModelError::coercion(meta.key.clone(), format!("invalid date {value}"))
                }),
            (FieldBase::Primitive(BaseType::Json), _) => Ok(Crystal::Json(value.clone())),
            _ => Ok(Crystal::from_json(value)),
        }
    }
}
