//! Wire-schema emission: object and input types with nullability and list
//! markers, rendered to GraphQL SDL.

use papaya::HashMap as PapayaMap;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::EmitConfig;
use crate::error::{ModelError, Result};
use crate::registry::MetadataRegistry;
use crate::types::{BaseType, FieldBase, FieldMeta, ModelId, VariantKind, capitalize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GqlTypeKind {
    Object,
    Input,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum GqlTypeRef {
    Named { name: String, nullable: bool },
    List { of: Box<GqlTypeRef>, nullable: bool },
}

impl GqlTypeRef {
    pub fn is_nullable(&self) -> bool {
        match self {
            Self::Named { nullable, .. } | Self::List { nullable, .. } => *nullable,
        }
    }

    /// Name of the innermost named type.
    pub fn base_name(&self) -> &str {
        match self {
            Self::Named { name, .. } => name,
            Self::List { of, .. } => of.base_name(),
        }
    }

    pub fn list_depth(&self) -> usize {
        match self {
            Self::Named { .. } => 0,
            Self::List { of, .. } => 1 + of.list_depth(),
        }
    }
}

impl fmt::Display for GqlTypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nullable = match self {
            Self::Named { name, nullable } => {
                f.write_str(name)?;
                nullable
            }
            Self::List { of, nullable } => {
                write!(f, "[{of}]")?;
                nullable
            }
        };
        if !nullable {
            f.write_str("!")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GqlField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: GqlTypeRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GqlType {
    pub name: String,
    pub kind: GqlTypeKind,
    pub model: ModelId,
    pub fields: Vec<GqlField>,
}

impl GqlType {
    pub fn field(&self, name: &str) -> Option<&GqlField> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn to_sdl(&self, include_descriptions: bool) -> String {
        let keyword = match self.kind {
            GqlTypeKind::Object => "type",
            GqlTypeKind::Input => "input",
        };
        let mut output = format!("{keyword} {} {{\n", self.name);
        for field in &self.fields {
            if include_descriptions {
                if let Some(description) = &field.description {
                    output.push_str(&format!("  \"\"\"{description}\"\"\"\n"));
                }
            }
            output.push_str(&format!("  {}: {}\n", field.name, field.ty));
        }
        output.push_str("}\n");
        output
    }
}

/// Name of the emitted type for `id`.
///
/// Unique per (ref name, variant): the light prefix, insight and input
/// suffixes keep variants of one entity apart in the emission cache.
pub fn gql_type_name(id: &ModelId, kind: GqlTypeKind) -> String {
    let base = capitalize(id.ref_name());
    match (id.kind(), kind) {
        (VariantKind::Light, _) => format!("Light{base}"),
        (VariantKind::Insight, _) => format!("{base}Insight"),
        (VariantKind::Filter, _) => format!("{base}Filter"),
        (_, GqlTypeKind::Input) => format!("{base}Input"),
        _ => base,
    }
}

pub struct GqlEmitter {
    registry: Arc<MetadataRegistry>,
    config: EmitConfig,
    emitted: PapayaMap<String, Arc<GqlType>>,
    generation: AtomicU64,
}

impl GqlEmitter {
    pub fn new(registry: Arc<MetadataRegistry>) -> Self {
        let config = registry.config().emit.clone();
        let generation = AtomicU64::new(registry.generation());
        Self {
            registry,
            config,
            emitted: PapayaMap::new(),
            generation,
        }
    }

    /// Output type for `id`, memoized by emitted name.
    ///
    /// Light models are a server-side projection and emit their owning full
    /// type instead; objects do the same once a full is registered.
    pub fn generate_gql(&self, id: &ModelId) -> Result<Arc<GqlType>> {
        self.sync_generation();
        self.emit(id, GqlTypeKind::Object, &mut Vec::new())
    }

    /// Input type for `id`, memoized by emitted name.
    pub fn generate_gql_input(&self, id: &ModelId) -> Result<Arc<GqlType>> {
        self.sync_generation();
        self.emit(id, GqlTypeKind::Input, &mut Vec::new())
    }

    /// Drop every emitted type once a model has been overwritten.
    fn sync_generation(&self) {
        let current = self.registry.generation();
        if self.generation.swap(current, Ordering::AcqRel) != current {
            self.emitted.pin().clear();
            tracing::debug!("Cleared emitted wire types after a model overwrite");
        }
    }

    pub fn emitted(&self) -> Vec<Arc<GqlType>> {
        let mut types: Vec<Arc<GqlType>> = self
            .emitted
            .pin()
            .iter()
            .map(|(_, ty)| Arc::clone(ty))
            .collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        types
    }

    /// Scalar declarations followed by every emitted type.
    pub fn to_sdl(&self) -> String {
        let mut output = format!(
            "scalar {}\nscalar {}\n",
            self.config.date_scalar, self.config.json_scalar
        );
        for ty in self.emitted() {
            output.push('\n');
            output.push_str(&ty.to_sdl(self.config.include_descriptions));
        }
        output
    }

    fn resolve_target(&self, id: &ModelId, kind: GqlTypeKind) -> Result<(ModelId, GqlTypeKind)> {
        match id.kind() {
            VariantKind::Filter => Err(ModelError::variant_mismatch(
                id.key(),
                "an emittable variant".to_string(),
            )),
            VariantKind::Light => Ok((id.sibling(VariantKind::Full), kind)),
            VariantKind::Object if kind == GqlTypeKind::Object => {
                let full = id.sibling(VariantKind::Full);
                if self.registry.contains(&full) {
                    Ok((full, kind))
                } else {
                    Ok((id.clone(), kind))
                }
            }
            VariantKind::Input => Ok((id.clone(), GqlTypeKind::Input)),
            _ => Ok((id.clone(), kind)),
        }
    }

    fn emit(
        &self,
        id: &ModelId,
        kind: GqlTypeKind,
        emitting: &mut Vec<String>,
    ) -> Result<Arc<GqlType>> {
        let (target, kind) = self.resolve_target(id, kind)?;
        let name = gql_type_name(&target, kind);
        if let Some(cached) = self.emitted.pin().get(&name) {
            return Ok(Arc::clone(cached));
        }

        emitting.push(name.clone());
        let entry = self.registry.entry(&target)?;
        let mut fields = Vec::with_capacity(entry.fields.len());
        for meta in entry.fields.values() {
            let skip = match kind {
                GqlTypeKind::Object => meta.is_hidden(),
                GqlTypeKind::Input => meta.is_resolved(),
            };
            if skip {
                continue;
            }
            let leaf = self.leaf_name(meta, kind, emitting)?;
            fields.push(GqlField {
                name: meta.key.clone(),
                ty: wrap(leaf, meta),
                description: meta.description.clone(),
            });
        }
        emitting.pop();

        let ty = Arc::new(GqlType {
            name: name.clone(),
            kind,
            model: target,
            fields,
        });
        tracing::debug!("Emitted wire type {} ({} fields)", name, ty.fields.len());

        // a concurrent emission of the same name wins; both are equal
        let emitted = self.emitted.pin();
        Ok(Arc::clone(emitted.get_or_insert(name, ty)))
    }

    fn leaf_name(
        &self,
        meta: &FieldMeta,
        kind: GqlTypeKind,
        emitting: &mut Vec<String>,
    ) -> Result<String> {
        if meta.is_map() {
            return Ok(self.config.json_scalar.clone());
        }
        match &meta.base {
            FieldBase::Primitive(base) => Ok(self.scalar_name(*base)),
            FieldBase::Model(model) if kind == GqlTypeKind::Input && !model.is_scalar() => {
                Ok(BaseType::Id.name().to_string())
            }
            FieldBase::Model(model) => {
                let (target, nested_kind) = self.resolve_target(model, kind)?;
                let name = gql_type_name(&target, nested_kind);
                if !emitting.contains(&name) && self.registry.contains(&target) {
                    self.emit(&target, nested_kind, emitting)?;
                }
                Ok(name)
            }
        }
    }

    fn scalar_name(&self, base: BaseType) -> String {
        match base {
            BaseType::Date => self.config.date_scalar.clone(),
            BaseType::Json => self.config.json_scalar.clone(),
            other => other.name().to_string(),
        }
    }
}

/// Apply list and non-null markers: elements are always non-null, the
/// outermost wrapper carries the field's own nullability.
fn wrap(leaf: String, meta: &FieldMeta) -> GqlTypeRef {
    let depth = meta.depth();
    let mut ty = GqlTypeRef::Named {
        name: leaf,
        nullable: depth == 0 && meta.nullable,
    };
    for level in 0..depth {
        ty = GqlTypeRef::List {
            of: Box::new(ty),
            nullable: level + 1 == depth && meta.nullable,
        };
    }
    ty
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names_are_unique_per_variant() {
        let full = ModelId::new("post", VariantKind::Full);
        let names = [
            gql_type_name(&full, GqlTypeKind::Object),
            gql_type_name(&full.sibling(VariantKind::Light), GqlTypeKind::Object),
            gql_type_name(&full.sibling(VariantKind::Insight), GqlTypeKind::Object),
            gql_type_name(&full.sibling(VariantKind::Input), GqlTypeKind::Input),
        ];
        assert_eq!(names, ["Post", "LightPost", "PostInsight", "PostInput"]);
    }

    #[test]
    fn test_wrap_marks_outer_nullability_only() {
        let mut meta = FieldMeta::primitive("grid", BaseType::Int);
        meta.arr_depth = 2;
        meta.nullable = true;
        let ty = wrap("Int".to_string(), &meta);
        assert_eq!(ty.to_string(), "[[Int!]!]");
        assert_eq!(ty.list_depth(), 2);

        meta.nullable = false;
        assert_eq!(wrap("Int".to_string(), &meta).to_string(), "[[Int!]!]!");

        meta.arr_depth = 0;
        meta.nullable = true;
        assert_eq!(wrap("Int".to_string(), &meta).to_string(), "Int");
    }
}
