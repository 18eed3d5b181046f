//! Metadata registry: model identity -> ordered field metadata.
//!
//! Populated once during bootstrap, then read lock-free. Every memo table the
//! compiler keeps (defaults, constant bundles, databases) lives here too.
//! Emitters hold their own caches and compare against [`MetadataRegistry::generation`],
//! which every overwrite bumps.

mod bundle;

pub use bundle::{ConstantBundle, DatabaseModel};

use indexmap::IndexMap;
use papaya::HashMap as PapayaMap;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::CompilerConfig;
use crate::constant::ConstantModel;
use crate::error::{ModelError, Result};
use crate::service::FilterSpec;
use crate::types::{BaseType, FieldMeta, ModelId, VariantKind};
use crate::variant::Via;

/// Fields every persisted object carries, in their fixed leading order.
pub const BASE_FIELDS: [&str; 4] = ["id", "createdAt", "updatedAt", "removedAt"];

pub(crate) fn base_field_metas() -> Vec<FieldMeta> {
    let mut removed_at = FieldMeta::primitive("removedAt", BaseType::Date);
    removed_at.nullable = true;
    let mut id = FieldMeta::primitive("id", BaseType::Id);
    id.immutable = true;
    vec![
        id,
        FieldMeta::primitive("createdAt", BaseType::Date),
        FieldMeta::primitive("updatedAt", BaseType::Date),
        removed_at,
    ]
}

#[derive(Debug, Clone)]
pub struct ModelEntry {
    pub id: ModelId,
    pub fields: IndexMap<String, FieldMeta>,
    /// Model this one was derived from (object -> input, light/full -> object,
    /// insight -> full).
    pub extends: Option<ModelId>,
}

impl ModelEntry {
    pub fn field(&self, key: &str) -> Result<&FieldMeta> {
        self.fields
            .get(key)
            .ok_or_else(|| ModelError::missing_field(self.id.key(), key.to_string()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

pub struct MetadataRegistry {
    config: CompilerConfig,
    models: PapayaMap<String, Arc<ModelEntry>>,
    defaults: PapayaMap<String, Value>,
    constants: PapayaMap<String, ConstantBundle>,
    databases: PapayaMap<String, Arc<FilterSpec>>,
    generation: AtomicU64,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::with_config(CompilerConfig::default())
    }

    pub fn with_config(config: CompilerConfig) -> Self {
        Self {
            config,
            models: PapayaMap::new(),
            defaults: PapayaMap::new(),
            constants: PapayaMap::new(),
            databases: PapayaMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Number of overwrites so far. Caches built from an older generation
    /// may hold stale fields.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Entry point for the variant constructors.
    pub fn via(&self) -> Via<'_> {
        Via::new(self)
    }

    /// Store `fields` under `id`.
    ///
    /// A second registration of the same identity without `overwrite` is a
    /// no-op that keeps the cached entry.
    pub fn register(
        &self,
        id: ModelId,
        fields: IndexMap<String, FieldMeta>,
        extends: Option<ModelId>,
        overwrite: bool,
    ) -> ModelId {
        let key = id.key();
        let models = self.models.pin();
        if models.contains_key(&key) && !overwrite {
            tracing::debug!("Model {} already registered, keeping cached entry", key);
            return id;
        }

        let entry = ModelEntry {
            id: id.clone(),
            fields: order_base_fields_first(fields),
            extends,
        };
        tracing::debug!(
            "Registered model {} with {} fields{}",
            key,
            entry.fields.len(),
            if overwrite { " (overwrite)" } else { "" }
        );
        models.insert(key.clone(), Arc::new(entry));

        if overwrite {
            // any default may embed the replaced model
            self.defaults.pin().clear();
            self.generation.fetch_add(1, Ordering::AcqRel);
            tracing::debug!("Invalidated default memos after overwriting {}", key);
        }
        id
    }

    pub fn contains(&self, id: &ModelId) -> bool {
        self.models.pin().contains_key(&id.key())
    }

    /// Registry entry for `id`; fails fast when the identity was never
    /// registered.
    pub fn entry(&self, id: &ModelId) -> Result<Arc<ModelEntry>> {
        let key = id.key();
        self.models
            .pin()
            .get(&key)
            .cloned()
            .ok_or_else(|| ModelError::missing_model(key))
    }

    pub fn field(&self, id: &ModelId, key: &str) -> Result<FieldMeta> {
        self.entry(id)?.field(key).cloned()
    }

    pub fn models(&self) -> Vec<ModelId> {
        let mut ids: Vec<ModelId> = self
            .models
            .pin()
            .iter()
            .map(|(_, entry)| entry.id.clone())
            .collect();
        ids.sort_by_key(ModelId::key);
        ids
    }

    pub fn ref_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .models()
            .into_iter()
            .map(|id| id.ref_name().to_string())
            .collect();
        names.dedup();
        names
    }

    /// Look up the registered identity for `ref_name` and `kind`.
    pub fn model(&self, ref_name: &str, kind: VariantKind) -> Result<ModelId> {
        let id = ModelId::new(ref_name, kind);
        if self.contains(&id) {
            Ok(id)
        } else {
            Err(ModelError::missing_model(id.key()))
        }
    }

    pub fn get_ref_name<'a>(&self, id: &'a ModelId) -> &'a str {
        id.ref_name()
    }

    fn is_kind(&self, id: &ModelId, kind: VariantKind) -> bool {
        id.kind() == kind && self.contains(id)
    }

    pub fn is_object(&self, id: &ModelId) -> bool {
        self.is_kind(id, VariantKind::Object)
    }

    pub fn is_full(&self, id: &ModelId) -> bool {
        self.is_kind(id, VariantKind::Full)
    }

    pub fn is_light(&self, id: &ModelId) -> bool {
        self.is_kind(id, VariantKind::Light)
    }

    pub fn is_insight(&self, id: &ModelId) -> bool {
        self.is_kind(id, VariantKind::Insight)
    }

    pub fn is_scalar(&self, id: &ModelId) -> bool {
        self.is_kind(id, VariantKind::Scalar)
    }

    /// Every model reachable through class-typed fields of `id`, depth first,
    /// without duplicates and excluding `id` itself.
    pub fn get_child_class_refs(&self, id: &ModelId) -> Result<Vec<ModelId>> {
        let mut found = Vec::new();
        self.collect_child_refs(id, id, &mut found)?;
        Ok(found)
    }

    fn collect_child_refs(
        &self,
        root: &ModelId,
        id: &ModelId,
        found: &mut Vec<ModelId>,
    ) -> Result<()> {
        let entry = self.entry(id)?;
        for meta in entry.fields.values() {
            let nested = meta
                .model()
                .or_else(|| meta.map_value.as_ref().and_then(|v| v.model()));
            if let Some(child) = nested {
                if child == root || found.contains(child) {
                    continue;
                }
                found.push(child.clone());
                if child.is_scalar() {
                    self.collect_child_refs(root, child, found)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn memo_default(&self, key: &str) -> Option<Value> {
        self.defaults.pin().get(key).cloned()
    }

    pub(crate) fn store_default(&self, key: String, value: Value) {
        self.defaults.pin().insert(key, value);
    }

    pub fn register_constant(&self, constant: &ConstantModel) {
        let bundle = constant.bundle();
        tracing::debug!("Registered constant bundle for {}", bundle.ref_name);
        self.constants.pin().insert(bundle.ref_name.clone(), bundle);
    }

    pub fn get_constant(self: &Arc<Self>, ref_name: &str) -> Result<ConstantModel> {
        let bundle = self
            .constants
            .pin()
            .get(ref_name)
            .cloned()
            .ok_or_else(|| ModelError::missing_model(format!("{ref_name}:constant")))?;
        ConstantModel::from_bundle(self, bundle)
    }

    /// Bind a filter spec to an entity, making it available as a database.
    pub fn register_database(&self, constant: &ConstantModel, filter: FilterSpec) -> Result<()> {
        if filter.ref_name() != constant.ref_name() {
            return Err(ModelError::variant_mismatch(
                filter.ref_name().to_string(),
                format!("filter for {}", constant.ref_name()),
            ));
        }
        self.register_constant(constant);
        self.databases
            .pin()
            .insert(constant.ref_name().to_string(), Arc::new(filter));
        Ok(())
    }

    pub fn get_database(self: &Arc<Self>, ref_name: &str) -> Result<DatabaseModel> {
        let filter = self
            .databases
            .pin()
            .get(ref_name)
            .cloned()
            .ok_or_else(|| ModelError::missing_model(format!("{ref_name}:database")))?;
        Ok(DatabaseModel {
            constant: self.get_constant(ref_name)?,
            filter,
        })
    }

    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .databases
            .pin()
            .iter()
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

impl Default for MetadataRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetadataRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataRegistry")
            .field("models", &self.models.len())
            .field("constants", &self.constants.len())
            .field("databases", &self.databases.len())
            .finish()
    }
}

fn order_base_fields_first(fields: IndexMap<String, FieldMeta>) -> IndexMap<String, FieldMeta> {
    if !BASE_FIELDS.iter().any(|key| fields.contains_key(*key)) {
        return fields;
    }
    let mut rest = fields;
    let mut ordered = IndexMap::with_capacity(rest.len());
    for key in BASE_FIELDS {
        if let Some(meta) = rest.shift_remove(key) {
            ordered.insert(key.to_string(), meta);
        }
    }
    ordered.extend(rest);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields_of(keys: &[&str]) -> IndexMap<String, FieldMeta> {
        keys.iter()
            .map(|k| ((*k).to_string(), FieldMeta::primitive(*k, BaseType::String)))
            .collect()
    }

    #[test]
    fn test_base_fields_sorted_first() {
        let registry = MetadataRegistry::new();
        let id = registry.register(
            ModelId::new("post", VariantKind::Object),
            fields_of(&["title", "updatedAt", "id", "body", "createdAt"]),
            None,
            false,
        );
        let entry = registry.entry(&id).unwrap();
        let keys: Vec<_> = entry.keys().collect();
        assert_eq!(keys, vec!["id", "createdAt", "updatedAt", "title", "body"]);
    }

    #[test]
    fn test_reregistration_without_overwrite_is_noop() {
        let registry = MetadataRegistry::new();
        let id = ModelId::new("post", VariantKind::Input);
        registry.register(id.clone(), fields_of(&["title"]), None, false);
        let first = registry.entry(&id).unwrap();

        registry.register(id.clone(), fields_of(&["title", "pinned"]), None, false);
        let second = registry.entry(&id).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.generation(), 0);

        registry.register(id.clone(), fields_of(&["title", "pinned"]), None, true);
        assert_eq!(registry.generation(), 1);
        let third = registry.entry(&id).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert!(third.fields.contains_key("pinned"));
    }

    #[test]
    fn test_missing_model_fails_fast() {
        let registry = MetadataRegistry::new();
        let err = registry
            .entry(&ModelId::new("ghost", VariantKind::Full))
            .unwrap_err();
        assert!(matches!(err, ModelError::MissingModel { key } if key == "ghost:full"));
    }
}
