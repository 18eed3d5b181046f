use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::query::{accumulate, compare_by, matches};
use super::{DocumentStore, FindOptions, ObjectId, StoredDocument, StoredValue, document_to_json};
use crate::error::{ModelError, Result};

type Collection = IndexMap<ObjectId, StoredDocument>;

/// In-process document store; collections keep insertion order.
#[derive(Debug)]
pub struct MemoryDocumentStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, IndexMap::len)
    }

    pub async fn is_empty(&self, collection: &str) -> bool {
        self.len(collection).await == 0
    }

    pub async fn clear(&self) {
        self.collections.write().await.clear();
    }

    async fn matching(
        &self,
        collection: &str,
        filter: &Value,
    ) -> Result<Vec<(Value, StoredDocument)>> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut found = Vec::new();
        for doc in docs.values() {
            let json = document_to_json(doc);
            if matches(&json, filter)? {
                found.push((json, doc.clone()));
            }
        }
        Ok(found)
    }
}

fn document_id(doc: &StoredDocument) -> Result<ObjectId> {
    match doc.get("id") {
        Some(StoredValue::ObjectId(id)) => Ok(*id),
        Some(StoredValue::String(raw)) => raw.parse(),
        _ => Err(ModelError::store("document has no object id")),
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn find(
        &self,
        collection: &str,
        filter: &Value,
        options: &FindOptions,
    ) -> Result<Vec<StoredDocument>> {
        let mut found = self.matching(collection, filter).await?;
        if let Some(sort) = &options.sort {
            found.sort_by(|(a, _), (b, _)| compare_by(sort, a, b));
        }
        let skip = options.skip.unwrap_or(0);
        let limit = options.limit.unwrap_or(usize::MAX);
        Ok(found
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|(_, doc)| match &options.select {
                Some(keys) => doc
                    .into_iter()
                    .filter(|(key, _)| key == "id" || keys.contains(key))
                    .collect(),
                None => doc,
            })
            .collect())
    }

    async fn count(&self, collection: &str, filter: &Value) -> Result<u64> {
        Ok(self.matching(collection, filter).await?.len() as u64)
    }

    async fn get(&self, collection: &str, id: &ObjectId) -> Result<Option<StoredDocument>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn insert(&self, collection: &str, doc: StoredDocument) -> Result<()> {
        let id = document_id(&doc)?;
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(&id) {
            return Err(ModelError::store(format!("duplicate id {id} in {collection}")));
        }
        docs.insert(id, doc);
        Ok(())
    }

    async fn replace(&self, collection: &str, id: &ObjectId, doc: StoredDocument) -> Result<bool> {
        let mut collections = self.collections.write().await;
        match collections.get_mut(collection).and_then(|docs| docs.get_mut(id)) {
            Some(slot) => {
                *slot = doc;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn aggregate(
        &self,
        collection: &str,
        filter: &Value,
        accumulators: &Map<String, Value>,
    ) -> Result<Map<String, Value>> {
        let docs: Vec<Value> = self
            .matching(collection, filter)
            .await?
            .into_iter()
            .map(|(json, _)| json)
            .collect();
        accumulate(&docs, accumulators)
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryDocumentStore {
    fn clone(&self) -> Self {
        Self {
            collections: Arc::clone(&self.collections),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(title: &str, n: i64) -> StoredDocument {
        let mut doc = StoredDocument::new();
        doc.insert("id".into(), StoredValue::ObjectId(ObjectId::new()));
        doc.insert("title".into(), StoredValue::String(title.into()));
        doc.insert("n".into(), StoredValue::from_json(&json!(n)));
        doc
    }

    #[tokio::test]
    async fn test_find_with_options() {
        let store = MemoryDocumentStore::new();
        for (title, n) in [("a", 3), ("b", 1), ("c", 2)] {
            store.insert("post", doc(title, n)).await.unwrap();
        }
        let options = FindOptions {
            sort: json!({ "n": 1 }).as_object().cloned(),
            skip: Some(1),
            limit: Some(1),
            select: Some(vec!["title".into()]),
        };
        let found = store.find("post", &json!({}), &options).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get("title"), Some(&StoredValue::String("c".into())));
        assert!(found[0].get("n").is_none());
        assert!(found[0].contains_key("id"));
    }

    #[tokio::test]
    async fn test_replace_and_count() {
        let store = MemoryDocumentStore::new();
        let original = doc("a", 1);
        let id = document_id(&original).unwrap();
        store.insert("post", original.clone()).await.unwrap();
        assert!(store.insert("post", original).await.is_err());

        let mut updated = doc("a", 10);
        updated.insert("id".into(), StoredValue::ObjectId(id));
        assert!(store.replace("post", &id, updated).await.unwrap());
        assert!(!store.replace("post", &ObjectId::new(), doc("x", 0)).await.unwrap());

        assert_eq!(store.count("post", &json!({ "n": { "$gte": 10 } })).await.unwrap(), 1);
        assert_eq!(store.len("post").await, 1);
        assert!(store.is_empty("other").await);
    }

    #[tokio::test]
    async fn test_aggregate_sums() {
        let store = MemoryDocumentStore::new();
        store.insert("post", doc("a", 2)).await.unwrap();
        store.insert("post", doc("b", 5)).await.unwrap();
        let acc = json!({ "count": { "$sum": 1 }, "total": { "$sum": "$n" } });
        let out = store
            .aggregate("post", &json!({}), acc.as_object().unwrap())
            .await
            .unwrap();
        assert_eq!(out["count"], 2);
        assert_eq!(out["total"], 7);
    }
}
