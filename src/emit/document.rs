//! Persistence-schema emission.
//!
//! Every field lowers to a [`StorageProperty`]: a storage type, coercions
//! between the service-facing JSON form and [`StoredValue`], and the
//! constraints the store validates.
//!
//! # Two array lowerings
//!
//! Array-ness reaches this module through two exclusive encodings and they
//! lower to different shapes. Keep them apart.
//!
//! * `arr_depth > 0`: the value is nested in plain arrays. The property is an
//!   array of the element storage type, it has **no** whole-field coercion,
//!   and dates/identifiers are coerced per flattened element through
//!   `element_coercion`. Constraints stay on the property and apply to each
//!   element.
//! * `opt_arr_depth > 0`: the field itself is an optional array of embedded
//!   sub-documents. The property carries a whole-field
//!   [`Coercion::EmbeddedArray`] that converts the entire array at once, and
//!   the element constraints (required, min/max, enum) are baked into
//!   `element_constraints` instead of the property.
//!
//! Lowering an optional embedded array through the per-element path stores
//! the right values but loses the array-level coercion, so partial writes of
//! the field are no longer converted. Lowering a plain array through the
//! whole-field path drops per-element date and identifier coercion.

use indexmap::IndexMap;
use papaya::HashMap as PapayaMap;
use serde_json::{Map, Value, json};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{LifecycleEvent, LifecycleHook, SchemaMiddleware};
use crate::error::{ModelError, Result};
use crate::registry::MetadataRegistry;
use crate::serialize::parse_date;
use crate::storage::{ObjectId, StoredDocument, StoredValue};
use crate::types::{
    BaseType, DefaultValue, FieldBase, FieldMeta, FieldValidator, ModelId, RefKind, TextRole,
};

#[derive(Debug, Clone)]
pub enum StorageType {
    ObjectId,
    String,
    Number,
    Boolean,
    Date,
    Mixed,
    /// Foreign key to another entity's collection.
    Reference { ref_name: String },
    SubDocument(Arc<DocumentSchema>),
    Map(Box<StorageType>),
    Array(Box<StorageType>),
}

impl StorageType {
    fn nested(self, depth: u8) -> Self {
        (0..depth).fold(self, |ty, _| Self::Array(Box::new(ty)))
    }

    /// Innermost type below arrays and maps.
    pub fn leaf(&self) -> &StorageType {
        match self {
            Self::Array(inner) | Self::Map(inner) => inner.leaf(),
            other => other,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    pub fn describe(&self) -> Value {
        match self {
            Self::ObjectId => json!("ObjectId"),
            Self::String => json!("String"),
            Self::Number => json!("Number"),
            Self::Boolean => json!("Boolean"),
            Self::Date => json!("Date"),
            Self::Mixed => json!("Mixed"),
            Self::Reference { ref_name } => json!({ "ref": ref_name }),
            Self::SubDocument(schema) => schema.describe(),
            Self::Map(inner) => json!({ "map": inner.describe() }),
            Self::Array(inner) => json!([inner.describe()]),
        }
    }
}

/// Get/set conversion between service-facing JSON and stored values.
#[derive(Debug, Clone)]
pub enum Coercion {
    Date,
    ObjectId,
    /// Whole-field conversion of an optional array of embedded documents.
    EmbeddedArray {
        schema: Arc<DocumentSchema>,
        depth: u8,
    },
}

impl Coercion {
    pub fn set(&self, field: &str, value: &Value) -> Result<StoredValue> {
        if value.is_null() {
            return Ok(StoredValue::Null);
        }
        match self {
            Self::Date => parse_date(value).map(StoredValue::Date).ok_or_else(|| {
                ModelError::coercion(field.to_string(), format!("invalid date {value}"))
            }),
            Self::ObjectId => match value {
                Value::String(raw) if raw.is_empty() => Ok(StoredValue::Null),
                Value::String(raw) => ObjectId::parse_str(raw)
                    .map(StoredValue::ObjectId)
                    .ok_or_else(|| {
                        ModelError::coercion(
                            field.to_string(),
                            format!("invalid object id '{raw}'"),
                        )
                    }),
                // populated reference
                Value::Object(doc) => self.set(field, doc.get("id").unwrap_or(&Value::Null)),
                other => Err(ModelError::coercion(
                    field.to_string(),
                    format!("invalid object id {other}"),
                )),
            },
            Self::EmbeddedArray { schema, depth } => set_embedded(schema, field, value, *depth),
        }
    }

    pub fn get(&self, value: &StoredValue) -> Value {
        match self {
            Self::Date | Self::ObjectId => value.to_json(),
            Self::EmbeddedArray { schema, depth } => get_embedded(schema, value, *depth),
        }
    }
}

fn set_embedded(
    schema: &DocumentSchema,
    field: &str,
    value: &Value,
    depth: u8,
) -> Result<StoredValue> {
    match value {
        Value::Null => Ok(StoredValue::Null),
        Value::Array(items) if depth > 0 => items
            .iter()
            .map(|item| set_embedded(schema, field, item, depth - 1))
            .collect::<Result<Vec<_>>>()
            .map(StoredValue::Array),
        Value::Object(_) if depth == 0 => schema.to_stored(value).map(StoredValue::Document),
        other => Err(ModelError::coercion(
            field.to_string(),
            format!("expected an array of {} documents, got {other}", schema.model.ref_name()),
        )),
    }
}

fn get_embedded(schema: &DocumentSchema, value: &StoredValue, depth: u8) -> Value {
    match value {
        StoredValue::Array(items) if depth > 0 => Value::Array(
            items
                .iter()
                .map(|item| get_embedded(schema, item, depth - 1))
                .collect(),
        ),
        StoredValue::Document(doc) if depth == 0 => schema.from_stored(doc),
        other => other.to_json(),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub enum_domain: Option<Vec<Value>>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
}

impl Constraints {
    fn from_meta(meta: &FieldMeta) -> Self {
        Self {
            min: meta.min,
            max: meta.max,
            enum_domain: meta.enum_domain.clone(),
            min_length: meta.min_length,
            max_length: meta.max_length,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn check(&self, value: &Value, path: &str, issues: &mut Vec<String>) {
        if let Some(number) = value.as_f64() {
            match (self.min, self.max) {
                (Some(min), _) if number < min => {
                    issues.push(format!("{path}: {number} is below the minimum {min}"));
                }
                (_, Some(max)) if number > max => {
                    issues.push(format!("{path}: {number} is above the maximum {max}"));
                }
                _ => {}
            }
        }
        if let Some(text) = value.as_str() {
            let len = text.chars().count();
            match (self.min_length, self.max_length) {
                (Some(min), _) if len < min => {
                    issues.push(format!("{path}: shorter than {min} characters"));
                }
                (_, Some(max)) if len > max => {
                    issues.push(format!("{path}: longer than {max} characters"));
                }
                _ => {}
            }
        }
        if let Some(domain) = &self.enum_domain {
            if !domain.contains(value) {
                issues.push(format!("{path}: {value} is not one of the allowed values"));
            }
        }
    }
}

/// Constraints carried by each element of an optional embedded array.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementConstraints {
    pub required: bool,
    pub constraints: Constraints,
}

#[derive(Debug, Clone)]
pub struct StorageProperty {
    pub key: String,
    pub ty: StorageType,
    pub required: bool,
    pub default: Option<DefaultValue>,
    /// Returned by reads unless explicitly projected away.
    pub select: bool,
    pub hidden: bool,
    pub immutable: bool,
    pub constraints: Constraints,
    pub validator: Option<FieldValidator>,
    pub text: TextRole,
    pub ref_path: Option<String>,
    pub ref_kind: Option<RefKind>,
    /// Applied to the whole field value.
    pub coercion: Option<Coercion>,
    /// Applied to every flattened array element or map value.
    pub element_coercion: Option<Coercion>,
    pub element_constraints: Option<ElementConstraints>,
}

impl StorageProperty {
    pub fn set(&self, value: &Value) -> Result<StoredValue> {
        match &self.coercion {
            Some(coercion) => coercion.set(&self.key, value),
            None => self.set_element(&self.ty, value),
        }
    }

    pub fn get(&self, value: &StoredValue) -> Value {
        match &self.coercion {
            Some(coercion) => coercion.get(value),
            None => self.get_element(&self.ty, value),
        }
    }

    fn set_element(&self, ty: &StorageType, value: &Value) -> Result<StoredValue> {
        match (ty, value) {
            (_, Value::Null) => Ok(StoredValue::Null),
            (StorageType::Array(inner), Value::Array(items)) => items
                .iter()
                .map(|item| self.set_element(inner, item))
                .collect::<Result<Vec<_>>>()
                .map(StoredValue::Array),
            (StorageType::SubDocument(schema), Value::Object(_)) => {
                schema.to_stored(value).map(StoredValue::Document)
            }
            (StorageType::Map(inner), Value::Object(entries)) => {
                let mut doc = StoredDocument::with_capacity(entries.len());
                for (key, item) in entries {
                    doc.insert(key.clone(), self.set_element(inner, item)?);
                }
                Ok(StoredValue::Document(doc))
            }
            (StorageType::Mixed, _) => Ok(StoredValue::Json(value.clone())),
            _ => match &self.element_coercion {
                Some(coercion) => coercion.set(&self.key, value),
                None => Ok(StoredValue::from_json(value)),
            },
        }
    }

    fn get_element(&self, ty: &StorageType, value: &StoredValue) -> Value {
        match (ty, value) {
            (StorageType::Array(inner), StoredValue::Array(items)) => Value::Array(
                items
                    .iter()
                    .map(|item| self.get_element(inner, item))
                    .collect(),
            ),
            (StorageType::SubDocument(schema), StoredValue::Document(doc)) => {
                schema.from_stored(doc)
            }
            (StorageType::Map(inner), StoredValue::Document(doc)) => Value::Object(
                doc.iter()
                    .map(|(key, item)| (key.clone(), self.get_element(inner, item)))
                    .collect(),
            ),
            _ => value.to_json(),
        }
    }

    fn array_depth(&self) -> u8 {
        let mut depth = 0;
        let mut current = &self.ty;
        while let StorageType::Array(inner) = current {
            depth += 1;
            current = inner;
        }
        depth
    }

    fn check(&self, value: &Value, doc: &Value, path: &str, issues: &mut Vec<String>) {
        let mut elements = Vec::new();
        flatten(value, self.array_depth(), path.to_string(), &mut elements);

        let (required, constraints) = match &self.element_constraints {
            Some(element) => (element.required, &element.constraints),
            None => (false, &self.constraints),
        };
        let nested = match self.ty.leaf() {
            StorageType::SubDocument(schema) => Some(schema),
            _ => None,
        };
        for (element_path, element) in elements {
            if element.is_null() {
                if required {
                    issues.push(format!("{element_path}: element is required"));
                }
                continue;
            }
            constraints.check(element, &element_path, issues);
            if let Some(schema) = nested {
                schema.collect_issues(element, &format!("{element_path}."), issues);
            }
        }

        if let Some(validator) = &self.validator {
            if !validator.check(value, doc) {
                issues.push(format!("{path}: failed validator '{}'", validator.name));
            }
        }
    }

    fn describe(&self) -> Value {
        let mut out = Map::new();
        out.insert("type".into(), self.ty.describe());
        if self.required {
            out.insert("required".into(), json!(true));
        }
        if !self.select {
            out.insert("select".into(), json!(false));
        }
        if self.immutable {
            out.insert("immutable".into(), json!(true));
        }
        if let Some(coercion) = &self.coercion {
            out.insert("coercion".into(), json!(coercion_name(coercion)));
        }
        if let Some(coercion) = &self.element_coercion {
            out.insert("elementCoercion".into(), json!(coercion_name(coercion)));
        }
        Value::Object(out)
    }
}

fn coercion_name(coercion: &Coercion) -> &'static str {
    match coercion {
        Coercion::Date => "date",
        Coercion::ObjectId => "objectId",
        Coercion::EmbeddedArray { .. } => "embeddedArray",
    }
}

fn flatten<'a>(value: &'a Value, depth: u8, path: String, out: &mut Vec<(String, &'a Value)>) {
    match value {
        Value::Array(items) if depth > 0 => {
            for (i, item) in items.iter().enumerate() {
                flatten(item, depth - 1, format!("{path}.{i}"), out);
            }
        }
        _ => out.push((path, value)),
    }
}

/// Lowered persistence schema for one model.
pub struct DocumentSchema {
    pub model: ModelId,
    pub embedded: bool,
    pub properties: IndexMap<String, StorageProperty>,
    hooks: Vec<Arc<dyn LifecycleHook>>,
    /// Hooks attached by middlewares; rebuilt on every replay.
    middleware_hooks: Vec<Arc<dyn LifecycleHook>>,
    replaying: bool,
}

impl DocumentSchema {
    pub fn collection(&self) -> &str {
        self.model.ref_name()
    }

    pub fn property(&self, key: &str) -> Option<&StorageProperty> {
        self.properties.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    pub fn add_hook(&mut self, hook: Arc<dyn LifecycleHook>) {
        if self.replaying {
            self.middleware_hooks.push(hook);
        } else {
            self.hooks.push(hook);
        }
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.len() + self.middleware_hooks.len()
    }

    pub fn fire(&self, event: LifecycleEvent, doc: &Value) {
        tracing::debug!("Lifecycle {} on {}", event, self.model.key());
        for hook in self.hooks.iter().chain(&self.middleware_hooks) {
            hook.on_event(event, doc);
        }
    }

    /// Keys read by default, or `None` when every property is selected.
    pub fn default_projection(&self) -> Option<Vec<String>> {
        if self.properties.values().all(|prop| prop.select) {
            return None;
        }
        Some(
            self.properties
                .values()
                .filter(|prop| prop.select)
                .map(|prop| prop.key.clone())
                .collect(),
        )
    }

    /// Convert a service-facing document for storage. Keys without a
    /// property are not stored.
    pub fn to_stored(&self, doc: &Value) -> Result<StoredDocument> {
        let Value::Object(entries) = doc else {
            return Err(ModelError::coercion(
                self.model.key(),
                format!("expected a document, got {doc}"),
            ));
        };
        let mut stored = StoredDocument::with_capacity(entries.len());
        for (key, prop) in &self.properties {
            if let Some(value) = entries.get(key) {
                stored.insert(key.clone(), prop.set(value)?);
            }
        }
        Ok(stored)
    }

    pub fn from_stored(&self, doc: &StoredDocument) -> Value {
        let mut out = Map::new();
        for (key, prop) in &self.properties {
            if let Some(value) = doc.get(key) {
                out.insert(key.clone(), prop.get(value));
            }
        }
        Value::Object(out)
    }

    /// Check `doc` against every property, collecting all issues.
    pub fn validate(&self, doc: &Value) -> Result<()> {
        let mut issues = Vec::new();
        self.collect_issues(doc, "", &mut issues);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ModelError::validation(self.model.key(), issues))
        }
    }

    fn collect_issues(&self, doc: &Value, prefix: &str, issues: &mut Vec<String>) {
        for prop in self.properties.values() {
            let path = format!("{prefix}{}", prop.key);
            match doc.get(&prop.key) {
                None | Some(Value::Null) => {
                    if prop.required {
                        issues.push(format!("{path}: required"));
                    }
                }
                Some(value) => prop.check(value, doc, &path, issues),
            }
        }
    }

    pub fn describe(&self) -> Value {
        Value::Object(
            self.properties
                .iter()
                .map(|(key, prop)| (key.clone(), prop.describe()))
                .collect(),
        )
    }
}

impl fmt::Debug for DocumentSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentSchema")
            .field("model", &self.model)
            .field("embedded", &self.embedded)
            .field("properties", &self.properties.keys().collect::<Vec<_>>())
            .field("hooks", &self.hook_count())
            .finish()
    }
}

/// Lowers registered models to [`DocumentSchema`]s.
///
/// Embedded sub-schemas are memoized per scalar identity; top-level schemas
/// are built fresh so callers can extend them with [`SchemaEmitter::add_schema`].
pub struct SchemaEmitter {
    registry: Arc<MetadataRegistry>,
    embedded: PapayaMap<String, Arc<DocumentSchema>>,
    middlewares: Vec<Arc<dyn SchemaMiddleware>>,
    generation: AtomicU64,
}

impl SchemaEmitter {
    pub fn new(registry: Arc<MetadataRegistry>) -> Self {
        let generation = AtomicU64::new(registry.generation());
        Self {
            registry,
            embedded: PapayaMap::new(),
            middlewares: Vec::new(),
            generation,
        }
    }

    pub fn with_middleware(mut self, middleware: Arc<dyn SchemaMiddleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    pub fn build_schema(&self, id: &ModelId) -> Result<DocumentSchema> {
        self.sync_generation();
        let mut schema = self.lower_model(id, false, &mut Vec::new())?;
        self.replay_middlewares(&mut schema);
        tracing::debug!(
            "Built persistence schema for {} ({} properties)",
            id.key(),
            schema.properties.len()
        );
        Ok(schema)
    }

    /// Merge the fields of `extension` into an already built schema in place,
    /// then replay the middlewares over the result. Hooks a middleware attached
    /// on an earlier pass are replaced, not duplicated.
    pub fn add_schema(&self, schema: &mut DocumentSchema, extension: &ModelId) -> Result<()> {
        self.sync_generation();
        let entry = self.registry.entry(extension)?;
        let mut lowering = Vec::new();
        let mut added = 0;
        for meta in entry.fields.values() {
            if let Some(prop) = self.lower_field(meta, &mut lowering)? {
                schema.properties.insert(meta.key.clone(), prop);
                added += 1;
            }
        }
        self.replay_middlewares(schema);
        tracing::debug!(
            "Extended persistence schema {} with {} properties from {}",
            schema.model.key(),
            added,
            extension.key()
        );
        Ok(())
    }

    /// Drop memoized sub-schemas once a model has been overwritten.
    fn sync_generation(&self) {
        let current = self.registry.generation();
        if self.generation.swap(current, Ordering::AcqRel) != current {
            self.embedded.pin().clear();
            tracing::debug!("Cleared embedded sub-schemas after a model overwrite");
        }
    }

    fn replay_middlewares(&self, schema: &mut DocumentSchema) {
        schema.middleware_hooks.clear();
        schema.replaying = true;
        for middleware in &self.middlewares {
            middleware.on_schema(schema);
        }
        schema.replaying = false;
    }

    fn lower_model(
        &self,
        id: &ModelId,
        embedded: bool,
        lowering: &mut Vec<String>,
    ) -> Result<DocumentSchema> {
        let entry = self.registry.entry(id)?;
        lowering.push(id.key());
        let mut properties = IndexMap::with_capacity(entry.fields.len());
        for meta in entry.fields.values() {
            if let Some(prop) = self.lower_field(meta, lowering)? {
                properties.insert(meta.key.clone(), prop);
            }
        }
        lowering.pop();
        Ok(DocumentSchema {
            model: id.clone(),
            embedded,
            properties,
            hooks: Vec::new(),
            middleware_hooks: Vec::new(),
            replaying: false,
        })
    }

    /// Sub-schema for an embedded scalar; `None` when `id` is already being
    /// lowered further up (self-referential embedding).
    fn embedded_schema(
        &self,
        id: &ModelId,
        lowering: &mut Vec<String>,
    ) -> Result<Option<Arc<DocumentSchema>>> {
        let key = id.key();
        if let Some(schema) = self.embedded.pin().get(&key) {
            return Ok(Some(Arc::clone(schema)));
        }
        if lowering.contains(&key) {
            return Ok(None);
        }
        let schema = Arc::new(self.lower_model(id, true, lowering)?);
        let embedded = self.embedded.pin();
        Ok(Some(Arc::clone(embedded.get_or_insert(key, schema))))
    }

    fn lower_leaf(
        &self,
        base: &FieldBase,
        meta: &FieldMeta,
        lowering: &mut Vec<String>,
    ) -> Result<(StorageType, Option<Coercion>)> {
        Ok(match base {
            FieldBase::Model(model) if model.is_scalar() => {
                match self.embedded_schema(model, lowering)? {
                    Some(schema) => (StorageType::SubDocument(schema), None),
                    None => (StorageType::Mixed, None),
                }
            }
            FieldBase::Model(model) => (
                StorageType::Reference {
                    ref_name: meta
                        .ref_name
                        .clone()
                        .unwrap_or_else(|| model.ref_name().to_string()),
                },
                Some(Coercion::ObjectId),
            ),
            FieldBase::Primitive(BaseType::Id) => match &meta.ref_name {
                Some(ref_name) => (
                    StorageType::Reference {
                        ref_name: ref_name.clone(),
                    },
                    Some(Coercion::ObjectId),
                ),
                None => (StorageType::ObjectId, Some(Coercion::ObjectId)),
            },
            FieldBase::Primitive(BaseType::Date) => (StorageType::Date, Some(Coercion::Date)),
            FieldBase::Primitive(BaseType::Int | BaseType::Float) => (StorageType::Number, None),
            FieldBase::Primitive(BaseType::String) => (StorageType::String, None),
            FieldBase::Primitive(BaseType::Boolean) => (StorageType::Boolean, None),
            FieldBase::Primitive(BaseType::Json) => (StorageType::Mixed, None),
        })
    }

    /// Storage property for `meta`; resolved fields are never persisted.
    pub fn lower_field(
        &self,
        meta: &FieldMeta,
        lowering: &mut Vec<String>,
    ) -> Result<Option<StorageProperty>> {
        if meta.is_resolved() {
            return Ok(None);
        }

        let mut constraints = Constraints::from_meta(meta);
        let mut coercion = None;
        let mut element_coercion = None;
        let mut element_constraints = None;

        let ty = if let Some(map_value) = &meta.map_value {
            let (leaf, leaf_coercion) = self.lower_leaf(map_value, meta, lowering)?;
            element_coercion = leaf_coercion;
            StorageType::Map(Box::new(leaf)).nested(meta.arr_depth)
        } else if meta.opt_arr_depth > 0 {
            let (leaf, leaf_coercion) = self.lower_leaf(&meta.base, meta, lowering)?;
            match leaf {
                StorageType::SubDocument(schema) => {
                    coercion = Some(Coercion::EmbeddedArray {
                        schema: Arc::clone(&schema),
                        depth: meta.opt_arr_depth,
                    });
                    element_constraints = Some(ElementConstraints {
                        required: true,
                        constraints: std::mem::take(&mut constraints),
                    });
                    StorageType::SubDocument(schema).nested(meta.opt_arr_depth)
                }
                // self-referential embedding is stored untyped
                other => {
                    element_coercion = leaf_coercion;
                    other.nested(meta.opt_arr_depth)
                }
            }
        } else {
            let (leaf, leaf_coercion) = self.lower_leaf(&meta.base, meta, lowering)?;
            if meta.arr_depth > 0 {
                element_coercion = leaf_coercion;
                leaf.nested(meta.arr_depth)
            } else {
                coercion = leaf_coercion;
                leaf
            }
        };

        Ok(Some(StorageProperty {
            key: meta.key.clone(),
            ty,
            required: !meta.nullable,
            default: meta.default.clone(),
            select: meta.select,
            hidden: meta.is_hidden(),
            immutable: meta.immutable,
            constraints,
            validator: meta.validator.clone(),
            text: meta.text,
            ref_path: meta.ref_path.clone(),
            ref_kind: meta.ref_kind,
            coercion,
            element_coercion,
            element_constraints,
        }))
    }
}

impl fmt::Debug for SchemaEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaEmitter")
            .field("embedded", &self.embedded.len())
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}
