//! The two lowering passes over registered field metadata: wire types and
//! persistence schemas.

mod document;
mod gql;
mod lifecycle;

pub use document::{
    Coercion, Constraints, DocumentSchema, ElementConstraints, SchemaEmitter, StorageProperty,
    StorageType,
};
pub use gql::{GqlEmitter, GqlField, GqlType, GqlTypeKind, GqlTypeRef, gql_type_name};
pub use lifecycle::{LifecycleEvent, LifecycleHook, REMOVED_AT, SchemaMiddleware};
