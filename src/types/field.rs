//! Canonical field metadata shared by every emitter.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use super::ModelId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseType {
    #[serde(rename = "ID")]
    Id,
    Int,
    Float,
    String,
    Boolean,
    Date,
    #[serde(rename = "JSON")]
    Json,
}

impl BaseType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Id => "ID",
            Self::Int => "Int",
            Self::Float => "Float",
            Self::String => "String",
            Self::Boolean => "Boolean",
            Self::Date => "Date",
            Self::Json => "JSON",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "ID" | "Id" | "id" => Some(Self::Id),
            "Int" | "int" => Some(Self::Int),
            "Float" | "float" => Some(Self::Float),
            "String" | "string" => Some(Self::String),
            "Boolean" | "boolean" | "bool" => Some(Self::Boolean),
            "Date" | "date" => Some(Self::Date),
            "JSON" | "Json" | "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// What a field's innermost value is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldBase {
    Primitive(BaseType),
    Model(ModelId),
}

impl FieldBase {
    pub fn model(&self) -> Option<&ModelId> {
        match self {
            Self::Model(id) => Some(id),
            Self::Primitive(_) => None,
        }
    }

    pub fn primitive(&self) -> Option<BaseType> {
        match self {
            Self::Primitive(base) => Some(*base),
            Self::Model(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Property,
    Hidden,
    Resolve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TextRole {
    #[default]
    None,
    Search,
    Filter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    Child,
    Parent,
    Relation,
}

pub type DefaultFn = dyn Fn(&Value) -> Value + Send + Sync;
pub type ValidateFn = dyn Fn(&Value, &Value) -> bool + Send + Sync;

/// A field default: either a literal or a function of the owning document.
#[derive(Clone)]
pub enum DefaultValue {
    Value(Value),
    Generator(Arc<DefaultFn>),
}

impl DefaultValue {
    pub fn generator(f: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        Self::Generator(Arc::new(f))
    }

    pub fn resolve(&self, doc: &Value) -> Value {
        match self {
            Self::Value(value) => value.clone(),
            Self::Generator(f) => f(doc),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Value(Value::Null))
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => write!(f, "Value({value})"),
            Self::Generator(_) => f.write_str("Generator(..)"),
        }
    }
}

impl PartialEq for DefaultValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Value(a), Self::Value(b)) => a == b,
            (Self::Generator(a), Self::Generator(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Custom check run against the coerced value and the owning document.
#[derive(Clone)]
pub struct FieldValidator {
    pub name: String,
    check: Arc<ValidateFn>,
}

impl FieldValidator {
    pub fn new(
        name: impl Into<String>,
        check: impl Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    pub fn check(&self, value: &Value, doc: &Value) -> bool {
        (self.check)(value, doc)
    }
}

impl fmt::Debug for FieldValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldValidator({})", self.name)
    }
}

impl PartialEq for FieldValidator {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.check, &other.check)
    }
}

/// Normalized description of one field.
///
/// `arr_depth` and `opt_arr_depth` are exclusive encodings of array-ness: the
/// first nests the value, the second marks an optional array of embedded
/// sub-documents. They lower to different persistence shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMeta {
    pub key: String,
    pub base: FieldBase,
    pub arr_depth: u8,
    pub opt_arr_depth: u8,
    pub map_value: Option<FieldBase>,
    pub nullable: bool,
    pub default: Option<DefaultValue>,
    pub kind: FieldKind,
    pub select: bool,
    pub immutable: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub enum_domain: Option<Vec<Value>>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub accumulate: Option<Value>,
    pub validator: Option<FieldValidator>,
    pub text: TextRole,
    pub ref_name: Option<String>,
    pub ref_path: Option<String>,
    pub ref_kind: Option<RefKind>,
    pub description: Option<String>,
    pub meta: Map<String, Value>,
}

impl FieldMeta {
    pub fn primitive(key: impl Into<String>, base: BaseType) -> Self {
        Self {
            key: key.into(),
            base: FieldBase::Primitive(base),
            arr_depth: 0,
            opt_arr_depth: 0,
            map_value: None,
            nullable: false,
            default: None,
            kind: FieldKind::Property,
            select: true,
            immutable: false,
            min: None,
            max: None,
            enum_domain: None,
            min_length: None,
            max_length: None,
            accumulate: None,
            validator: None,
            text: TextRole::None,
            ref_name: None,
            ref_path: None,
            ref_kind: None,
            description: None,
            meta: Map::new(),
        }
    }

    pub fn is_class(&self) -> bool {
        matches!(self.base, FieldBase::Model(_))
    }

    pub fn is_scalar(&self) -> bool {
        self.model().is_some_and(ModelId::is_scalar)
    }

    pub fn model(&self) -> Option<&ModelId> {
        self.base.model()
    }

    pub fn is_map(&self) -> bool {
        self.map_value.is_some()
    }

    pub fn is_array(&self) -> bool {
        self.depth() > 0
    }

    /// Array nesting regardless of which encoding carries it.
    pub fn depth(&self) -> u8 {
        self.arr_depth.max(self.opt_arr_depth)
    }

    pub fn is_hidden(&self) -> bool {
        self.kind == FieldKind::Hidden
    }

    pub fn is_resolved(&self) -> bool {
        self.kind == FieldKind::Resolve
    }

    /// Same wire and storage shape, ignoring constraints.
    pub fn same_shape(&self, other: &Self) -> bool {
        self.base == other.base
            && self.nullable == other.nullable
            && self.arr_depth == other.arr_depth
            && self.opt_arr_depth == other.opt_arr_depth
            && self.map_value == other.map_value
    }
}
