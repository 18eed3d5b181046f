//! Loosely-typed field declarations and their normalization into [`FieldMeta`].

use serde_json::{Map, Value};

use super::{
    BaseType, DefaultValue, FieldBase, FieldKind, FieldMeta, FieldValidator, ModelId, RefKind,
    TextRole,
};
use crate::error::{ModelError, Result};

/// Declared type of a field, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Base(BaseType),
    Model(ModelId),
    Array(Box<FieldType>),
    /// String-keyed map; the value type comes from [`FieldDescriptor::of`].
    Map,
}

impl FieldType {
    pub fn array(inner: impl Into<FieldType>) -> Self {
        Self::Array(Box::new(inner.into()))
    }

    pub fn nested(inner: impl Into<FieldType>, depth: u8) -> Self {
        (0..depth).fold(inner.into(), |ty, _| Self::Array(Box::new(ty)))
    }

    /// The non-array type at the bottom of this one, and how many arrays
    /// wrap it.
    fn unwrap_arrays(&self) -> (Leaf<'_>, u8) {
        let mut depth = 0;
        let mut current = self;
        loop {
            match current {
                Self::Array(inner) => {
                    depth += 1;
                    current = inner;
                }
                Self::Base(base) => return (Leaf::Base(*base), depth),
                Self::Model(id) => return (Leaf::Model(id), depth),
                Self::Map => return (Leaf::Map, depth),
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Leaf<'a> {
    Base(BaseType),
    Model(&'a ModelId),
    Map,
}

impl From<BaseType> for FieldType {
    fn from(base: BaseType) -> Self {
        Self::Base(base)
    }
}

impl From<ModelId> for FieldType {
    fn from(id: ModelId) -> Self {
        Self::Model(id)
    }
}

impl From<&ModelId> for FieldType {
    fn from(id: &ModelId) -> Self {
        Self::Model(id.clone())
    }
}

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    ty: FieldType,
    kind: FieldKind,
    select: Option<bool>,
    nullable: bool,
    default: Option<DefaultValue>,
    of: Option<FieldType>,
    immutable: bool,
    min: Option<f64>,
    max: Option<f64>,
    enum_domain: Option<Vec<Value>>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    accumulate: Option<Value>,
    validator: Option<FieldValidator>,
    text: TextRole,
    ref_name: Option<String>,
    ref_path: Option<String>,
    ref_kind: Option<RefKind>,
    description: Option<String>,
    meta: Map<String, Value>,
}

/// A stored, exposed field.
pub fn field(ty: impl Into<FieldType>) -> FieldDescriptor {
    FieldDescriptor::new(ty.into(), FieldKind::Property, None)
}

/// Stored but never exposed to readers, and not selected by default.
pub fn hidden(ty: impl Into<FieldType>) -> FieldDescriptor {
    FieldDescriptor::new(ty.into(), FieldKind::Hidden, Some(false))
}

/// Hidden from readers but still selectable internally.
pub fn secret(ty: impl Into<FieldType>) -> FieldDescriptor {
    FieldDescriptor::new(ty.into(), FieldKind::Hidden, Some(true))
}

/// Computed field: part of the wire schema and services, never persisted.
pub fn resolve(ty: impl Into<FieldType>) -> FieldDescriptor {
    FieldDescriptor::new(ty.into(), FieldKind::Resolve, None)
}

impl FieldDescriptor {
    fn new(ty: FieldType, kind: FieldKind, select: Option<bool>) -> Self {
        Self {
            ty,
            kind,
            select,
            nullable: false,
            default: None,
            of: None,
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

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    pub fn with_default_fn(
        mut self,
        f: impl Fn(&Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.default = Some(DefaultValue::generator(f));
        self
    }

    /// Value type of a map field.
    pub fn of(mut self, ty: impl Into<FieldType>) -> Self {
        self.of = Some(ty.into());
        self
    }

    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn enum_of<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.enum_domain = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn min_length(mut self, len: usize) -> Self {
        self.min_length = Some(len);
        self
    }

    pub fn max_length(mut self, len: usize) -> Self {
        self.max_length = Some(len);
        self
    }

    pub fn accumulate(mut self, op: Value) -> Self {
        self.accumulate = Some(op);
        self
    }

    pub fn validate(
        mut self,
        name: impl Into<String>,
        check: impl Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(FieldValidator::new(name, check));
        self
    }

    pub fn select(mut self, select: bool) -> Self {
        self.select = Some(select);
        self
    }

    pub fn text(mut self, role: TextRole) -> Self {
        self.text = role;
        self
    }

    pub fn reference(mut self, ref_name: impl Into<String>) -> Self {
        self.ref_name = Some(ref_name.into());
        self
    }

    pub fn ref_path(mut self, path: impl Into<String>) -> Self {
        self.ref_path = Some(path.into());
        self
    }

    pub fn ref_kind(mut self, kind: RefKind) -> Self {
        self.ref_kind = Some(kind);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Turn a plain declaration into a computed one.
    pub fn into_resolved(mut self) -> Self {
        if self.kind == FieldKind::Property {
            self.kind = FieldKind::Resolve;
        }
        self
    }

    /// Normalize this declaration into the canonical metadata stored for
    /// `key` on `model`.
    pub fn apply_field_meta(self, model: &ModelId, key: &str) -> Result<FieldMeta> {
        let (inner, depth) = self.ty.unwrap_arrays();

        let (base, map_value) = match inner {
            Leaf::Base(base) => (FieldBase::Primitive(base), None),
            Leaf::Model(id) => (FieldBase::Model(id.clone()), None),
            Leaf::Map => {
                let of = self
                    .of
                    .as_ref()
                    .ok_or_else(|| ModelError::map_without_value_type(model.key(), key.into()))?;
                // map values are single leaves; arrays and maps of maps are not lowered
                let value = match of.unwrap_arrays() {
                    (Leaf::Base(base), 0) => FieldBase::Primitive(base),
                    (Leaf::Model(id), 0) => FieldBase::Model(id.clone()),
                    _ => {
                        return Err(ModelError::unsupported_map_value(
                            model.key(),
                            key.to_string(),
                            format!("{of:?}"),
                        ));
                    }
                };
                (FieldBase::Primitive(BaseType::Json), Some(value))
            }
        };

        let hidden = self.kind == FieldKind::Hidden;
        let nullable = self.nullable || hidden;
        let embedded = base.model().is_some_and(ModelId::is_scalar);

        let (arr_depth, opt_arr_depth) = if embedded && nullable && depth > 0 {
            (0, depth)
        } else {
            (depth, 0)
        };

        Ok(FieldMeta {
            key: key.to_string(),
            base,
            arr_depth,
            opt_arr_depth,
            map_value,
            nullable,
            default: self.default,
            kind: self.kind,
            select: self.select.unwrap_or(!hidden),
            immutable: self.immutable,
            min: self.min,
            max: self.max,
            enum_domain: self.enum_domain,
            min_length: self.min_length,
            max_length: self.max_length,
            accumulate: self.accumulate,
            validator: self.validator,
            text: self.text,
            ref_name: self.ref_name,
            ref_path: self.ref_path,
            ref_kind: self.ref_kind,
            description: self.description,
            meta: self.meta,
        })
    }
}

/// Ordered collection of declarations handed to the variant constructors.
#[derive(Debug, Default)]
pub struct FieldSet {
    fields: Vec<(String, FieldDescriptor)>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: impl Into<String>, descriptor: FieldDescriptor) -> &mut Self {
        let key = key.into();
        self.fields.retain(|(existing, _)| existing != &key);
        self.fields.push((key, descriptor));
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_inner(self) -> Vec<(String, FieldDescriptor)> {
        self.fields
    }

    pub(crate) fn build(build: impl FnOnce(&mut FieldSet)) -> Self {
        let mut set = Self::new();
        build(&mut set);
        set
    }
}
