use serde_json::{Map, Value};

use super::{DefaultOptions, format_date, parse_date};
use crate::error::{ModelError, Result};
use crate::registry::MetadataRegistry;
use crate::types::{BaseType, DefaultValue, FieldBase, FieldMeta, ModelId};

impl MetadataRegistry {
    /// Sanitize `raw` against `id`: undeclared keys are dropped, absent
    /// fields take their default, dates are canonicalized and nested
    /// embedded models are purified recursively. Applying it twice yields
    /// the same value.
    pub fn purify(&self, id: &ModelId, raw: &Value) -> Result<Value> {
        let Value::Object(raw) = raw else {
            return Err(ModelError::coercion(id.key(), "expected an object".to_string()));
        };

        let entry = self.entry(id)?;
        let defaults = self.make_default(id, DefaultOptions::default())?;
        let owning = Value::Object(raw.clone());
        let mut purified = Map::new();

        for meta in entry.fields.values() {
            if meta.is_resolved() {
                continue;
            }
            let value = match raw.get(&meta.key) {
                Some(value) => self.purify_value(meta, value, meta.depth())?,
                None => match &meta.default {
                    Some(generator @ DefaultValue::Generator(_)) => generator.resolve(&owning),
                    _ => defaults.get(&meta.key).cloned().unwrap_or(Value::Null),
                },
            };
            purified.insert(meta.key.clone(), value);
        }
        Ok(Value::Object(purified))
    }

    fn purify_value(&self, meta: &FieldMeta, value: &Value, depth: u8) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
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
                .map(|item| self.purify_value(meta, item, depth - 1))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array);
        }
        if let Some(map_value) = &meta.map_value {
            let Value::Object(entries) = value else {
                return Err(ModelError::coercion(
                    meta.key.clone(),
                    "expected an object map".to_string(),
                ));
            };
            let mut out = Map::new();
            for (key, item) in entries {
                out.insert(key.clone(), self.purify_leaf(meta, map_value, item)?);
            }
            return Ok(Value::Object(out));
        }
        self.purify_leaf(meta, &meta.base, value)
    }

    fn purify_leaf(&self, meta: &FieldMeta, base: &FieldBase, value: &Value) -> Result<Value> {
        match base {
            _ if value.is_null() => Ok(Value::Null),
            FieldBase::Model(model) if model.is_scalar() => self.purify(model, value),
            // references travel as identifiers
            FieldBase::Model(_) => Ok(match value {
                Value::Object(doc) => doc.get("id").cloned().unwrap_or(Value::Null),
                other => other.clone(),
            }),
            FieldBase::Primitive(BaseType::Date) => parse_date(value)
                .map(|date| Value::String(format_date(&date)))
                .ok_or_else(|| {
                    ModelError::coercion(meta.key.clone(), format!("invalid date {value}"))
                }),
            FieldBase::Primitive(_) => Ok(value.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldType, field};
    use serde_json::json;

    fn registry_with_input() -> (MetadataRegistry, ModelId) {
        let registry = MetadataRegistry::new();
        let via = registry.via();
        let geo = via
            .scalar("geo", |f| {
                f.add("lat", field(BaseType::Float))
                    .add("lng", field(BaseType::Float));
            })
            .unwrap();
        let input = via
            .input(
                "place",
                |f| {
                    f.add("name", field(BaseType::String))
                        .add("openedAt", field(BaseType::Date))
                        .add("spots", field(FieldType::array(&geo)))
                        .add("scores", field(FieldType::Map).of(BaseType::Int));
                },
                &[],
            )
            .unwrap();
        (registry, input)
    }

    #[test]
    fn test_purify_fills_and_drops() {
        let (registry, input) = registry_with_input();
        let purified = registry
            .purify(
                &input,
                &json!({
                    "name": "Cafe",
                    "unknown": 1,
                    "openedAt": "2024-05-01",
                    "spots": [{ "lat": 1.5 }]
                }),
            )
            .unwrap();
        assert_eq!(
            purified,
            json!({
                "name": "Cafe",
                "openedAt": "2024-05-01T00:00:00.000Z",
                "spots": [{ "lat": 1.5, "lng": 0 }],
                "scores": {}
            })
        );
    }

    #[test]
    fn test_purify_is_idempotent() {
        let (registry, input) = registry_with_input();
        let once = registry
            .purify(&input, &json!({ "scores": { "a": 1 }, "openedAt": 0 }))
            .unwrap();
        let twice = registry.purify(&input, &once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_purify_rejects_bad_date() {
        let (registry, input) = registry_with_input();
        let err = registry
            .purify(&input, &json!({ "openedAt": "soon" }))
            .unwrap_err();
        assert!(matches!(err, ModelError::Coercion { field, .. } if field == "openedAt"));
    }
}
