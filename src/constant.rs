//! The five-variant bundle for one entity.

use serde_json::Value;
use std::sync::Arc;

use crate::error::{ModelError, Result};
use crate::registry::{ConstantBundle, MetadataRegistry};
use crate::serialize::{Crystal, DefaultOptions};
use crate::types::{ModelId, VariantKind};

#[derive(Clone)]
pub struct ConstantModel {
    registry: Arc<MetadataRegistry>,
    bundle: ConstantBundle,
}

impl ConstantModel {
    /// Bundle the variants of one entity, checking that they belong
    /// together: one ref name, the right kinds, light fields present in full
    /// with identical metadata, and a `count` field on the insight.
    pub fn new(
        registry: &Arc<MetadataRegistry>,
        input: &ModelId,
        object: &ModelId,
        full: &ModelId,
        light: &ModelId,
        insight: &ModelId,
    ) -> Result<Self> {
        let bundle = ConstantBundle {
            ref_name: full.ref_name().to_string(),
            input: input.clone(),
            object: object.clone(),
            full: full.clone(),
            light: light.clone(),
            insight: insight.clone(),
        };
        Self::from_bundle(registry, bundle)
    }

    pub(crate) fn from_bundle(
        registry: &Arc<MetadataRegistry>,
        bundle: ConstantBundle,
    ) -> Result<Self> {
        let expected = [
            (&bundle.input, VariantKind::Input),
            (&bundle.object, VariantKind::Object),
            (&bundle.full, VariantKind::Full),
            (&bundle.light, VariantKind::Light),
            (&bundle.insight, VariantKind::Insight),
        ];
        for (id, kind) in expected {
            if id.kind() != kind || id.ref_name() != bundle.ref_name {
                return Err(ModelError::variant_mismatch(
                    id.key(),
                    format!("{}:{}", bundle.ref_name, kind),
                ));
            }
            registry.entry(id)?;
        }

        let full = registry.entry(&bundle.full)?;
        let light = registry.entry(&bundle.light)?;
        for (key, meta) in &light.fields {
            match full.fields.get(key) {
                Some(full_meta) if full_meta.same_shape(meta) => {}
                _ => {
                    return Err(ModelError::missing_field(bundle.full.key(), key.clone()));
                }
            }
        }
        registry.entry(&bundle.insight)?.field("count")?;

        Ok(Self {
            registry: Arc::clone(registry),
            bundle,
        })
    }

    pub fn ref_name(&self) -> &str {
        &self.bundle.ref_name
    }

    pub fn input(&self) -> &ModelId {
        &self.bundle.input
    }

    pub fn object(&self) -> &ModelId {
        &self.bundle.object
    }

    pub fn full(&self) -> &ModelId {
        &self.bundle.full
    }

    pub fn light(&self) -> &ModelId {
        &self.bundle.light
    }

    pub fn insight(&self) -> &ModelId {
        &self.bundle.insight
    }

    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    pub(crate) fn bundle(&self) -> ConstantBundle {
        self.bundle.clone()
    }

    pub fn purify(&self, raw: &Value) -> Result<Value> {
        self.registry.purify(&self.bundle.input, raw)
    }

    pub fn crystalize(&self, raw: &Value) -> Result<Crystal> {
        self.registry.crystalize(&self.bundle.full, raw)
    }

    pub fn light_crystalize(&self, raw: &Value) -> Result<Crystal> {
        self.registry.crystalize(&self.bundle.light, raw)
    }

    pub fn crystalize_insight(&self, raw: &Value) -> Result<Crystal> {
        self.registry.crystalize(&self.bundle.insight, raw)
    }

    pub fn get_default(&self) -> Result<Value> {
        self.registry
            .make_default(&self.bundle.full, DefaultOptions::default())
    }

    pub fn get_default_input(&self) -> Result<Value> {
        self.registry
            .make_default(&self.bundle.input, DefaultOptions::default())
    }

    pub fn get_default_insight(&self) -> Result<Value> {
        self.registry
            .make_default(&self.bundle.insight, DefaultOptions::default())
    }
}

impl std::fmt::Debug for ConstantModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstantModel")
            .field("bundle", &self.bundle)
            .finish()
    }
}
