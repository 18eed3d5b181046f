use serde::{Deserialize, Serialize};
use std::fmt;

/// The shape a model identity stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantKind {
    Input,
    Object,
    Light,
    Full,
    Insight,
    Filter,
    Scalar,
}

impl VariantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Object => "object",
            Self::Light => "light",
            Self::Full => "full",
            Self::Insight => "insight",
            Self::Filter => "filter",
            Self::Scalar => "scalar",
        }
    }

    /// Models of this kind are stored as their own documents.
    pub fn is_persisted(&self) -> bool {
        !matches!(self, Self::Scalar | Self::Input | Self::Filter)
    }
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque handle naming one variant of one entity.
///
/// The registry is keyed by [`ModelId::key`], never by the field data itself,
/// so two handles with the same ref name and kind always resolve to the same
/// registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelId {
    ref_name: String,
    kind: VariantKind,
}

impl ModelId {
    pub fn new(ref_name: impl Into<String>, kind: VariantKind) -> Self {
        Self {
            ref_name: ref_name.into(),
            kind,
        }
    }

    pub fn ref_name(&self) -> &str {
        &self.ref_name
    }

    pub fn kind(&self) -> VariantKind {
        self.kind
    }

    pub fn key(&self) -> String {
        format!("{}:{}", self.ref_name, self.kind)
    }

    /// Same entity, different variant.
    pub fn sibling(&self, kind: VariantKind) -> Self {
        Self::new(self.ref_name.clone(), kind)
    }

    pub fn is_scalar(&self) -> bool {
        self.kind == VariantKind::Scalar
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.ref_name, self.kind)
    }
}

pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_stable_per_variant() {
        let full = ModelId::new("post", VariantKind::Full);
        let light = full.sibling(VariantKind::Light);
        assert_eq!(full.key(), "post:full");
        assert_eq!(light.key(), "post:light");
        assert_ne!(full, light);
        assert_eq!(full, ModelId::new("post", VariantKind::Full));
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("post"), "Post");
        assert_eq!(capitalize("byOwner"), "ByOwner");
        assert_eq!(capitalize(""), "");
    }
}
