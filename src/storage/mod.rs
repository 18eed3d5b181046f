//! Document store boundary and the stored value model.

mod memory;
mod query;
mod traits;
mod value;

pub use memory::MemoryDocumentStore;
pub use query::{FindOptions, accumulate, compare_by, compare_values, get_path, matches};
pub use traits::DocumentStore;
pub use value::{ObjectId, StoredDocument, StoredValue, document_to_json};
