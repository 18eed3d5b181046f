//! Declarative entity manifests.
//!
//! A manifest describes scalars and entities in JSON and compiles them
//! through the same variant constructors as hand-written declarations:
//!
//! ```json
//! {
//!   "scalars": { "geo": { "lat": { "type": "Float" }, "lng": { "type": "Float" } } },
//!   "entities": {
//!     "post": {
//!       "input": {
//!         "title": { "type": "String", "text": "search" },
//!         "tags": { "type": "[String]" }
//!       },
//!       "object": { "views": { "type": "Int", "default": 0 } },
//!       "light": ["title"],
//!       "insight": {
//!         "totalViews": { "type": "Int", "default": 0, "accumulate": { "$sum": "$views" } }
//!       },
//!       "queries": { "byOwner": { "owner": "$ownerId" } },
//!       "sorts": { "mostViewed": { "views": -1 } }
//!     }
//!   }
//! }
//! ```
//!
//! Types are base type names, scalar names, entity names (references to
//! their full variant) or `Map`, wrapped in `[...]` once per array level.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

use crate::constant::ConstantModel;
use crate::error::{ModelError, Result};
use crate::registry::MetadataRegistry;
use crate::service::{FilterSpec, QueryDef};
use crate::types::{
    BaseType, FieldDescriptor, FieldSet, FieldType, ModelId, RefKind, TextRole, VariantKind,
    field, hidden, resolve, secret,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldFlavor {
    #[default]
    Field,
    Hidden,
    Secret,
    Resolve,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub ty: String,
    pub of: Option<String>,
    pub flavor: FieldFlavor,
    pub nullable: bool,
    pub default: Option<Value>,
    pub immutable: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    #[serde(rename = "enum")]
    pub enum_domain: Option<Vec<Value>>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub accumulate: Option<Value>,
    pub select: Option<bool>,
    pub text: Option<TextRole>,
    #[serde(rename = "ref")]
    pub ref_name: Option<String>,
    pub ref_path: Option<String>,
    pub ref_kind: Option<RefKind>,
    pub description: Option<String>,
    pub meta: Map<String, Value>,
}

pub type FieldSpecs = IndexMap<String, FieldSpec>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EntitySpec {
    pub input: FieldSpecs,
    pub object: FieldSpecs,
    pub light: Vec<String>,
    pub light_resolve: FieldSpecs,
    pub full_resolve: FieldSpecs,
    pub insight: FieldSpecs,
    /// Query key -> filter template; `"$name"` strings become arguments.
    pub queries: IndexMap<String, Value>,
    pub sorts: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub scalars: IndexMap<String, FieldSpecs>,
    pub entities: IndexMap<String, EntitySpec>,
}

impl Manifest {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Register every scalar and entity, bundle each entity and bind its
    /// filter spec as a database.
    pub fn compile(&self, registry: &Arc<MetadataRegistry>) -> Result<Vec<ConstantModel>> {
        let via = registry.via();
        for (name, fields) in &self.scalars {
            let declared = self.descriptors(fields)?;
            via.scalar(name, |f| add_all(f, declared))?;
        }

        let mut constants = Vec::with_capacity(self.entities.len());
        for (name, entity) in &self.entities {
            let input = {
                let declared = self.descriptors(&entity.input)?;
                via.input(name, |f| add_all(f, declared), &[])?
            };
            let object = {
                let declared = self.descriptors(&entity.object)?;
                via.object(&input, |f| add_all(f, declared), &[])?
            };
            let light = {
                let names: Vec<&str> = entity.light.iter().map(String::as_str).collect();
                let declared = self.descriptors(&entity.light_resolve)?;
                via.light(&object, &names, |f| add_all(f, declared), &[])?
            };
            let full = {
                let declared = self.descriptors(&entity.full_resolve)?;
                via.full(&object, &light, |f| add_all(f, declared), &[])?
            };
            let insight = {
                let declared = self.descriptors(&entity.insight)?;
                via.insight(&full, |f| add_all(f, declared), &[])?
            };

            let constant = ConstantModel::new(registry, &input, &object, &full, &light, &insight)?;
            registry.register_database(&constant, self.filter_spec(name, entity))?;
            tracing::info!("Compiled entity {} from manifest", name);
            constants.push(constant);
        }
        Ok(constants)
    }

    fn filter_spec(&self, name: &str, entity: &EntitySpec) -> FilterSpec {
        let mut spec = FilterSpec::new(name);
        for (key, template) in &entity.queries {
            spec.add_query(key, template_query(template.clone()));
        }
        for (key, sort) in &entity.sorts {
            if let Value::Object(sort) = sort {
                spec.add_sort(key, sort.clone());
            }
        }
        spec
    }

    fn descriptors(&self, fields: &FieldSpecs) -> Result<Vec<(String, FieldDescriptor)>> {
        fields
            .iter()
            .map(|(key, spec)| Ok((key.clone(), self.descriptor(key, spec)?)))
            .collect()
    }

    fn descriptor(&self, key: &str, spec: &FieldSpec) -> Result<FieldDescriptor> {
        let ty = self.parse_type(key, &spec.ty)?;
        let mut descriptor = match spec.flavor {
            FieldFlavor::Field => field(ty),
            FieldFlavor::Hidden => hidden(ty),
            FieldFlavor::Secret => secret(ty),
            FieldFlavor::Resolve => resolve(ty),
        };
        if let Some(of) = &spec.of {
            descriptor = descriptor.of(self.parse_type(key, of)?);
        }
        if spec.nullable {
            descriptor = descriptor.nullable();
        }
        if let Some(default) = &spec.default {
            descriptor = descriptor.with_default(default.clone());
        }
        if spec.immutable {
            descriptor = descriptor.immutable();
        }
        if let Some(min) = spec.min {
            descriptor = descriptor.min(min);
        }
        if let Some(max) = spec.max {
            descriptor = descriptor.max(max);
        }
        if let Some(domain) = &spec.enum_domain {
            descriptor = descriptor.enum_of(domain.iter().cloned());
        }
        if let Some(len) = spec.min_length {
            descriptor = descriptor.min_length(len);
        }
        if let Some(len) = spec.max_length {
            descriptor = descriptor.max_length(len);
        }
        if let Some(op) = &spec.accumulate {
            descriptor = descriptor.accumulate(op.clone());
        }
        if let Some(select) = spec.select {
            descriptor = descriptor.select(select);
        }
        if let Some(role) = spec.text {
            descriptor = descriptor.text(role);
        }
        if let Some(ref_name) = &spec.ref_name {
            descriptor = descriptor.reference(ref_name.clone());
        }
        if let Some(path) = &spec.ref_path {
            descriptor = descriptor.ref_path(path.clone());
        }
        if let Some(kind) = spec.ref_kind {
            descriptor = descriptor.ref_kind(kind);
        }
        if let Some(description) = &spec.description {
            descriptor = descriptor.describe(description.clone());
        }
        for (meta_key, value) in &spec.meta {
            descriptor = descriptor.meta(meta_key.clone(), value.clone());
        }
        Ok(descriptor)
    }

    fn parse_type(&self, key: &str, raw: &str) -> Result<FieldType> {
        let mut name = raw.trim();
        let mut depth = 0u8;
        while let Some(inner) = name.strip_prefix('[').and_then(|n| n.strip_suffix(']')) {
            name = inner.trim();
            depth += 1;
        }
        let inner = if name == "Map" {
            FieldType::Map
        } else if let Some(base) = BaseType::parse(name) {
            FieldType::Base(base)
        } else if self.scalars.contains_key(name) {
            FieldType::Model(ModelId::new(name, VariantKind::Scalar))
        } else if self.entities.contains_key(name) {
            FieldType::Model(ModelId::new(name, VariantKind::Full))
        } else {
            return Err(ModelError::coercion(
                key.to_string(),
                format!("unknown field type '{raw}'"),
            ));
        };
        Ok(FieldType::nested(inner, depth))
    }
}

fn add_all(set: &mut FieldSet, declared: Vec<(String, FieldDescriptor)>) {
    for (key, descriptor) in declared {
        set.add(key, descriptor);
    }
}

/// Query whose filter is `template` with every `"$name"` string replaced by
/// the argument at that name's first-appearance position.
pub fn template_query(template: Value) -> QueryDef {
    let mut names = Vec::new();
    collect_placeholders(&template, &mut names);
    let arg_names = names.clone();
    QueryDef::new(arg_names, move |args| Ok(substitute(&template, &names, args)))
}

fn placeholder(value: &Value) -> Option<&str> {
    value
        .as_str()
        .and_then(|s| s.strip_prefix('$'))
        .filter(|name| !name.is_empty())
}

fn collect_placeholders(template: &Value, names: &mut Vec<String>) {
    match template {
        Value::Array(items) => items.iter().for_each(|item| collect_placeholders(item, names)),
        Value::Object(entries) => entries
            .values()
            .for_each(|item| collect_placeholders(item, names)),
        other => {
            if let Some(name) = placeholder(other) {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
    }
}

fn substitute(template: &Value, names: &[String], args: &[Value]) -> Value {
    match template {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| substitute(item, names, args))
                .collect(),
        ),
        Value::Object(entries) => Value::Object(
            entries
                .iter()
                .map(|(key, item)| (key.clone(), substitute(item, names, args)))
                .collect(),
        ),
        other => match placeholder(other).and_then(|name| names.iter().position(|n| n == name)) {
            Some(i) => args.get(i).cloned().unwrap_or(Value::Null),
            None => other.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_nested_types() {
        let manifest = Manifest::from_json_str(r#"{ "scalars": { "geo": {} } }"#).unwrap();
        assert_eq!(
            manifest.parse_type("x", "[[Int]]").unwrap(),
            FieldType::nested(BaseType::Int, 2)
        );
        assert_eq!(
            manifest.parse_type("x", "[geo]").unwrap(),
            FieldType::array(ModelId::new("geo", VariantKind::Scalar))
        );
        assert!(manifest.parse_type("x", "Unknown").is_err());
    }

    #[test]
    fn test_template_query_substitutes_arguments() {
        let query = template_query(json!({
            "owner": "$ownerId",
            "$or": [{ "status": "$status" }, { "status": "draft" }]
        }));
        assert_eq!(query.arg_names, vec!["ownerId", "status"]);
        assert_eq!(
            query.build(&[json!("u1"), json!("open")]).unwrap(),
            json!({
                "owner": "u1",
                "$or": [{ "status": "open" }, { "status": "draft" }]
            })
        );
    }
}
