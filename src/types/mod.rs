pub mod descriptor;
pub mod field;
pub mod model_id;

pub use descriptor::{FieldDescriptor, FieldSet, FieldType, field, hidden, resolve, secret};
pub use field::{
    BaseType, DefaultValue, FieldBase, FieldKind, FieldMeta, FieldValidator, RefKind, TextRole,
};
pub use model_id::{ModelId, VariantKind, capitalize};
