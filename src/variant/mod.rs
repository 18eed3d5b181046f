//! Variant derivation: the named constructors that build input, object,
//! light, full, insight and scalar identities from one another.
//!
//! Every constructor merges field maps in a fixed order (base fields, then
//! the model it derives from, then library extensions, then newly declared
//! fields) and later entries win on key collisions while keeping the
//! position of the first declaration.

use indexmap::IndexMap;
use serde_json::json;

use crate::error::{ModelError, Result};
use crate::registry::{MetadataRegistry, base_field_metas};
use crate::types::{BaseType, FieldMeta, FieldSet, ModelId, VariantKind};

/// Field set every insight starts from when no extension supplies one.
pub(crate) fn insight_seed() -> IndexMap<String, FieldMeta> {
    let mut count = FieldMeta::primitive("count", BaseType::Int);
    count.default = Some(crate::types::DefaultValue::Value(json!(0)));
    count.accumulate = Some(json!({ "$sum": 1 }));
    IndexMap::from([("count".to_string(), count)])
}

pub struct Via<'r> {
    registry: &'r MetadataRegistry,
    overwrite: bool,
}

impl<'r> Via<'r> {
    pub(crate) fn new(registry: &'r MetadataRegistry) -> Self {
        Self {
            registry,
            overwrite: false,
        }
    }

    /// Re-derive already registered identities, replacing their entries and
    /// invalidating memoized defaults.
    pub fn overwrite(mut self) -> Self {
        self.overwrite = true;
        self
    }

    /// Embeddable, non-persisted value object.
    pub fn scalar(&self, ref_name: &str, build: impl FnOnce(&mut FieldSet)) -> Result<ModelId> {
        let id = ModelId::new(ref_name, VariantKind::Scalar);
        if let Some(cached) = self.cached(&id) {
            return Ok(cached);
        }
        let mut fields = IndexMap::new();
        self.declare(&id, &mut fields, FieldSet::build(build), false)?;
        Ok(self.registry.register(id, fields, None, self.overwrite))
    }

    /// Writer-side shape of an entity. With `extends`, the extension inputs
    /// are merged first and the new declarations win.
    pub fn input(
        &self,
        ref_name: &str,
        build: impl FnOnce(&mut FieldSet),
        extends: &[ModelId],
    ) -> Result<ModelId> {
        let id = ModelId::new(ref_name, VariantKind::Input);
        if let Some(cached) = self.cached(&id) {
            return Ok(cached);
        }
        self.check_extensions(&id, extends, &[VariantKind::Input, VariantKind::Scalar], &[])?;

        let mut fields = IndexMap::new();
        self.merge_extensions(&mut fields, extends)?;
        self.declare(&id, &mut fields, FieldSet::build(build), false)?;
        Ok(self.registry.register(id, fields, None, self.overwrite))
    }

    /// Externally visible shape: base fields, the input's fields, extension
    /// objects, then the new declarations.
    pub fn object(
        &self,
        input: &ModelId,
        build: impl FnOnce(&mut FieldSet),
        extends: &[ModelId],
    ) -> Result<ModelId> {
        if !matches!(input.kind(), VariantKind::Input | VariantKind::Scalar) {
            return Err(ModelError::variant_mismatch(
                input.key(),
                "input or scalar".to_string(),
            ));
        }
        let id = input.sibling(VariantKind::Object);
        if let Some(cached) = self.cached(&id) {
            return Ok(cached);
        }
        self.check_extensions(&id, extends, &[VariantKind::Object], &[input])?;

        let mut fields: IndexMap<String, FieldMeta> = base_field_metas()
            .into_iter()
            .map(|meta| (meta.key.clone(), meta))
            .collect();
        let input_entry = self.registry.entry(input)?;
        merge_into(&mut fields, &input_entry.fields);
        self.merge_extensions(&mut fields, extends)?;
        self.declare(&id, &mut fields, FieldSet::build(build), false)?;
        Ok(self
            .registry
            .register(id, fields, Some(input.clone()), self.overwrite))
    }

    /// Server-side projection of `object`: its base fields, the named fields
    /// and resolver-only fields.
    pub fn light(
        &self,
        object: &ModelId,
        field_names: &[&str],
        resolve: impl FnOnce(&mut FieldSet),
        extends: &[ModelId],
    ) -> Result<ModelId> {
        if object.kind() != VariantKind::Object {
            return Err(ModelError::variant_mismatch(
                object.key(),
                "object".to_string(),
            ));
        }
        let id = object.sibling(VariantKind::Light);
        if let Some(cached) = self.cached(&id) {
            return Ok(cached);
        }
        self.check_extensions(&id, extends, &[VariantKind::Light], &[object])?;

        let object_entry = self.registry.entry(object)?;
        let mut fields = IndexMap::new();
        self.merge_extensions(&mut fields, extends)?;
        for key in crate::registry::BASE_FIELDS {
            if let Some(meta) = object_entry.fields.get(key) {
                fields.insert(key.to_string(), meta.clone());
            }
        }
        for name in field_names {
            let meta = object_entry.field(name)?;
            fields.insert((*name).to_string(), meta.clone());
        }
        self.declare(&id, &mut fields, FieldSet::build(resolve), true)?;
        Ok(self
            .registry
            .register(id, fields, Some(object.clone()), self.overwrite))
    }

    /// Concrete persisted shape: object, light and library-supplied fulls.
    pub fn full(
        &self,
        object: &ModelId,
        light: &ModelId,
        resolve: impl FnOnce(&mut FieldSet),
        extends: &[ModelId],
    ) -> Result<ModelId> {
        if object.kind() != VariantKind::Object || light.kind() != VariantKind::Light {
            return Err(ModelError::unresolvable_extension(
                "full",
                argument_keys(&[object, light], extends),
            ));
        }
        let id = object.sibling(VariantKind::Full);
        if let Some(cached) = self.cached(&id) {
            return Ok(cached);
        }
        self.check_extensions(&id, extends, &[VariantKind::Full], &[object, light])?;

        let mut fields = IndexMap::new();
        merge_into(&mut fields, &self.registry.entry(object)?.fields);
        merge_into(&mut fields, &self.registry.entry(light)?.fields);
        self.merge_extensions(&mut fields, extends)?;
        self.declare(&id, &mut fields, FieldSet::build(resolve), true)?;
        Ok(self
            .registry
            .register(id, fields, Some(object.clone()), self.overwrite))
    }

    /// Aggregation result shape for `full`.
    pub fn insight(
        &self,
        full: &ModelId,
        build: impl FnOnce(&mut FieldSet),
        extends: &[ModelId],
    ) -> Result<ModelId> {
        if full.kind() != VariantKind::Full {
            return Err(ModelError::variant_mismatch(full.key(), "full".to_string()));
        }
        let id = full.sibling(VariantKind::Insight);
        if let Some(cached) = self.cached(&id) {
            return Ok(cached);
        }
        self.check_extensions(&id, extends, &[VariantKind::Insight], &[full])?;

        let mut fields = if extends.is_empty() {
            insight_seed()
        } else {
            IndexMap::new()
        };
        self.merge_extensions(&mut fields, extends)?;
        self.declare(&id, &mut fields, FieldSet::build(build), false)?;
        Ok(self
            .registry
            .register(id, fields, Some(full.clone()), self.overwrite))
    }

    fn cached(&self, id: &ModelId) -> Option<ModelId> {
        (!self.overwrite && self.registry.contains(id)).then(|| id.clone())
    }

    fn check_extensions(
        &self,
        target: &ModelId,
        extends: &[ModelId],
        allowed: &[VariantKind],
        bases: &[&ModelId],
    ) -> Result<()> {
        if extends.iter().all(|ext| allowed.contains(&ext.kind())) {
            return Ok(());
        }
        Err(ModelError::unresolvable_extension(
            target.kind().as_str(),
            argument_keys(bases, extends),
        ))
    }

    fn merge_extensions(
        &self,
        fields: &mut IndexMap<String, FieldMeta>,
        extends: &[ModelId],
    ) -> Result<()> {
        for ext in extends {
            merge_into(fields, &self.registry.entry(ext)?.fields);
        }
        Ok(())
    }

    fn declare(
        &self,
        id: &ModelId,
        fields: &mut IndexMap<String, FieldMeta>,
        set: FieldSet,
        resolved: bool,
    ) -> Result<()> {
        for (key, descriptor) in set.into_inner() {
            let descriptor = if resolved {
                descriptor.into_resolved()
            } else {
                descriptor
            };
            let meta = descriptor.apply_field_meta(id, &key)?;
            fields.insert(key, meta);
        }
        Ok(())
    }
}

fn merge_into(fields: &mut IndexMap<String, FieldMeta>, from: &IndexMap<String, FieldMeta>) {
    for (key, meta) in from {
        fields.insert(key.clone(), meta.clone());
    }
}

fn argument_keys(bases: &[&ModelId], extends: &[ModelId]) -> Vec<String> {
    bases
        .iter()
        .map(|id| id.key())
        .chain(extends.iter().map(ModelId::key))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldKind, field, resolve};

    fn post(registry: &MetadataRegistry) -> (ModelId, ModelId, ModelId, ModelId) {
        let via = registry.via();
        let input = via
            .input(
                "post",
                |f| {
                    f.add("title", field(BaseType::String))
                        .add("body", field(BaseType::String));
                },
                &[],
            )
            .unwrap();
        let object = via.object(&input, |_| {}, &[]).unwrap();
        let light = via
            .light(
                &object,
                &["title"],
                |f| {
                    f.add("excerpt", field(BaseType::String));
                },
                &[],
            )
            .unwrap();
        let full = via.full(&object, &light, |_| {}, &[]).unwrap();
        (input, object, light, full)
    }

    #[test]
    fn test_object_prepends_base_fields() {
        let registry = MetadataRegistry::new();
        let (_, object, _, _) = post(&registry);
        let entry = registry.entry(&object).unwrap();
        let keys: Vec<_> = entry.keys().collect();
        assert_eq!(
            keys,
            vec!["id", "createdAt", "updatedAt", "removedAt", "title", "body"]
        );
        assert_eq!(entry.extends, Some(ModelId::new("post", VariantKind::Input)));
    }

    #[test]
    fn test_light_resolve_fields_are_not_persisted() {
        let registry = MetadataRegistry::new();
        let (_, _, light, full) = post(&registry);
        let excerpt = registry.field(&light, "excerpt").unwrap();
        assert_eq!(excerpt.kind, FieldKind::Resolve);
        assert_eq!(registry.field(&full, "excerpt").unwrap(), excerpt);
    }

    #[test]
    fn test_light_rejects_unknown_field() {
        let registry = MetadataRegistry::new();
        let (_, object, _, _) = post(&registry);
        let err = registry
            .via()
            .overwrite()
            .light(&object, &["subtitle"], |_| {}, &[])
            .unwrap_err();
        assert!(matches!(err, ModelError::MissingField { field, .. } if field == "subtitle"));
    }

    #[test]
    fn test_insight_seeds_count() {
        let registry = MetadataRegistry::new();
        let (_, _, _, full) = post(&registry);
        let insight = registry
            .via()
            .insight(
                &full,
                |f| {
                    f.add("pinnedCount", field(BaseType::Int).with_default(0));
                },
                &[],
            )
            .unwrap();
        let entry = registry.entry(&insight).unwrap();
        let count = entry.field("count").unwrap();
        assert_eq!(count.accumulate, Some(json!({ "$sum": 1 })));
        assert!(entry.fields.contains_key("pinnedCount"));
    }

    #[test]
    fn test_wrong_extension_kind_echoes_arguments() {
        let registry = MetadataRegistry::new();
        let (input, object, light, _) = post(&registry);
        let err = registry
            .via()
            .overwrite()
            .full(
                &object,
                &light,
                |f| {
                    f.add("score", resolve(BaseType::Int));
                },
                &[input],
            )
            .unwrap_err();
        match err {
            ModelError::UnresolvableExtension { variant, args } => {
                assert_eq!(variant, "full");
                assert_eq!(args, vec!["post:object", "post:light", "post:input"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_object_requires_input_or_scalar() {
        let registry = MetadataRegistry::new();
        let (_, _, light, _) = post(&registry);
        assert!(matches!(
            registry.via().object(&light, |_| {}, &[]),
            Err(ModelError::VariantMismatch { .. })
        ));
    }
}
