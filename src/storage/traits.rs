use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{FindOptions, ObjectId, StoredDocument};
use crate::Result;

/// Persistence engine the generated services run against.
///
/// Filters are JSON documents evaluated over the service-facing form of the
/// stored documents (identifiers as hex strings, canonical dates). Engine
/// errors surface as `ModelError::Store` and are propagated unchanged.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(
        &self,
        collection: &str,
        filter: &Value,
        options: &FindOptions,
    ) -> Result<Vec<StoredDocument>>;
    async fn count(&self, collection: &str, filter: &Value) -> Result<u64>;
    async fn get(&self, collection: &str, id: &ObjectId) -> Result<Option<StoredDocument>>;
    async fn insert(&self, collection: &str, doc: StoredDocument) -> Result<()>;
    /// Replace the document with the same id; false when none exists.
    async fn replace(&self, collection: &str, id: &ObjectId, doc: StoredDocument) -> Result<bool>;
    async fn aggregate(
        &self,
        collection: &str,
        filter: &Value,
        accumulators: &Map<String, Value>,
    ) -> Result<Map<String, Value>>;
}
