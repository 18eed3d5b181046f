use serde_json::{Map, Value, json};

use super::epoch_marker;
use crate::error::Result;
use crate::registry::MetadataRegistry;
use crate::types::{BaseType, DefaultValue, FieldMeta, ModelId};

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultOptions {
    /// The model is being defaulted as a nested field of another model.
    pub is_child: bool,
    /// Recompute and replace the memoized tree.
    pub overwrite: bool,
}

impl DefaultOptions {
    pub fn child() -> Self {
        Self {
            is_child: true,
            overwrite: false,
        }
    }

    pub fn overwrite() -> Self {
        Self {
            is_child: false,
            overwrite: true,
        }
    }
}

pub fn primitive_default(base: BaseType) -> Value {
    match base {
        BaseType::Id | BaseType::String => json!(""),
        BaseType::Int | BaseType::Float => json!(0),
        BaseType::Boolean => json!(false),
        BaseType::Date => json!(epoch_marker()),
        BaseType::Json => json!({}),
    }
}

impl MetadataRegistry {
    /// Canonical default tree for `id`, memoized per identity.
    ///
    /// Child cut rule: a child that is a persisted model (stored as a
    /// reference, not embedded) is `null`. A child that is an embedded scalar
    /// is expanded, so a required `geo` field defaults to `{lat: 0, lng: 0}`,
    /// and only a scalar that re-enters itself is cut to `null`. Either cut
    /// ends the recursion.
    pub fn make_default(&self, id: &ModelId, options: DefaultOptions) -> Result<Value> {
        let mut visiting = Vec::new();
        self.make_default_inner(id, options, &mut visiting)
    }

    fn make_default_inner(
        &self,
        id: &ModelId,
        options: DefaultOptions,
        visiting: &mut Vec<String>,
    ) -> Result<Value> {
        // persisted children are references; embedded scalars expand below
        if options.is_child && !id.is_scalar() {
            return Ok(Value::Null);
        }

        let key = id.key();
        if !options.overwrite {
            if let Some(memo) = self.memo_default(&key) {
                return Ok(memo);
            }
        }
        if visiting.contains(&key) {
            return Ok(Value::Null);
        }

        visiting.push(key.clone());
        let entry = self.entry(id)?;
        let mut doc = Map::new();
        for meta in entry.fields.values() {
            let value = self.field_default(meta, &doc, options, visiting)?;
            doc.insert(meta.key.clone(), value);
        }
        visiting.pop();

        let value = Value::Object(doc);
        self.store_default(key, value.clone());
        Ok(value)
    }

    fn field_default(
        &self,
        meta: &FieldMeta,
        doc: &Map<String, Value>,
        options: DefaultOptions,
        visiting: &mut Vec<String>,
    ) -> Result<Value> {
        if meta.is_hidden() {
            return Ok(Value::Null);
        }
        if let Some(default) = &meta.default {
            return Ok(match default {
                DefaultValue::Value(value) => value.clone(),
                DefaultValue::Generator(_) => default.resolve(&Value::Object(doc.clone())),
            });
        }
        if meta.is_array() {
            return Ok(Value::Array(Vec::new()));
        }
        if meta.nullable {
            return Ok(Value::Null);
        }
        if let Some(model) = meta.model() {
            let child = DefaultOptions {
                is_child: true,
                overwrite: options.overwrite,
            };
            return self.make_default_inner(model, child, visiting);
        }
        Ok(meta
            .base
            .primitive()
            .map_or(Value::Null, primitive_default))
    }
}
