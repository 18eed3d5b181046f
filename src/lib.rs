//! # Model Compiler
//!
//! Declare an entity's fields once and derive everything else from them:
//! input, object, light, full and insight variants, default trees, a
//! purify/crystalize round trip, GraphQL wire types, persistence schemas and
//! a filter-driven CRUD/query service surface.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use model_compiler::*;
//! use std::sync::Arc;
//!
//! # fn example() -> Result<()> {
//! let registry = Arc::new(MetadataRegistry::new());
//! let via = registry.via();
//! let input = via.input(
//!     "post",
//!     |f| {
//!         f.add("title", field(BaseType::String))
//!             .add("body", field(BaseType::String));
//!     },
//!     &[],
//! )?;
//! let object = via.object(&input, |_| {}, &[])?;
//! let light = via.light(&object, &["title"], |_| {}, &[])?;
//! let full = via.full(&object, &light, |_| {}, &[])?;
//!
//! let emitter = GqlEmitter::new(Arc::clone(&registry));
//! let post = emitter.generate_gql(&full)?;
//! println!("{}", post.to_sdl(true));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constant;
pub mod emit;
pub mod error;
pub mod manifest;
pub mod registry;
pub mod serialize;
pub mod service;
pub mod storage;
pub mod types;
pub mod variant;

pub use config::{CompilerConfig, EmitConfig, ServiceConfig};
pub use constant::ConstantModel;
pub use emit::*;
pub use error::Result;
pub use error::ModelError;
pub use manifest::{EntitySpec, FieldFlavor, FieldSpec, Manifest};
pub use registry::{BASE_FIELDS, ConstantBundle, DatabaseModel, MetadataRegistry, ModelEntry};
pub use serialize::{Crystal, CrystalModel, DefaultOptions};
pub use service::*;
pub use storage::{DocumentStore, MemoryDocumentStore, ObjectId, StoredDocument, StoredValue};
pub use types::*;
pub use variant::Via;
