use chrono::Utc;
use futures::future::try_join_all;
use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use std::sync::Arc;

use super::method::{CrudMethod, Method, QueryMethod, method_table};
use super::options::{QueryOptions, split_arguments};
use super::FilterSpec;
use crate::config::ServiceConfig;
use crate::emit::{DocumentSchema, LifecycleEvent, SchemaEmitter};
use crate::error::{ModelError, Result};
use crate::registry::{BASE_FIELDS, DatabaseModel, MetadataRegistry};
use crate::serialize::{Crystal, format_date};
use crate::storage::{DocumentStore, FindOptions, ObjectId, StoredDocument};
use crate::types::TextRole;

/// Result of a dispatched service call.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceOutput {
    Many(Vec<Crystal>),
    Ids(Vec<String>),
    One(Option<Crystal>),
    Id(Option<String>),
    Exists(bool),
    Count(u64),
    Insight(Crystal),
    /// A predicate built but not executed.
    Filter(Value),
}

impl ServiceOutput {
    pub fn to_value(&self) -> Value {
        match self {
            Self::Many(items) => Value::Array(items.iter().map(Crystal::to_value).collect()),
            Self::Ids(ids) => json!(ids),
            Self::One(item) => item.as_ref().map_or(Value::Null, Crystal::to_value),
            Self::Id(id) => json!(id),
            Self::Exists(exists) => json!(exists),
            Self::Count(count) => json!(count),
            Self::Insight(insight) => insight.to_value(),
            Self::Filter(filter) => filter.clone(),
        }
    }
}

/// CRUD and per-query-key methods for one persisted entity, synthesized from
/// its filter spec and run against a [`DocumentStore`].
pub struct QueryService {
    database: DatabaseModel,
    schema: Arc<DocumentSchema>,
    store: Arc<dyn DocumentStore>,
    config: ServiceConfig,
    methods: IndexMap<String, Method>,
}

impl QueryService {
    pub fn new(
        database: DatabaseModel,
        schema: DocumentSchema,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        let config = database.constant.registry().config().service.clone();
        let methods = method_table(&database.filter);
        tracing::debug!(
            "Synthesized {} service methods for {}",
            methods.len(),
            database.ref_name()
        );
        Self {
            database,
            schema: Arc::new(schema),
            store,
            config,
            methods,
        }
    }

    /// Service for the database registered under `ref_name`, persisted with
    /// the schema lowered from its full variant.
    pub fn for_database(
        registry: &Arc<MetadataRegistry>,
        ref_name: &str,
        emitter: &SchemaEmitter,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Self> {
        let database = registry.get_database(ref_name)?;
        let schema = emitter.build_schema(database.constant.full())?;
        Ok(Self::new(database, schema, store))
    }

    pub fn ref_name(&self) -> &str {
        self.database.ref_name()
    }

    pub fn schema(&self) -> &DocumentSchema {
        &self.schema
    }

    pub fn filter(&self) -> &FilterSpec {
        &self.database.filter
    }

    pub fn method_names(&self) -> Vec<&str> {
        self.methods.keys().map(String::as_str).collect()
    }

    pub fn method(&self, name: &str) -> Result<&Method> {
        self.methods
            .get(name)
            .ok_or_else(|| ModelError::UnknownMethod {
                name: name.to_string(),
            })
    }

    /// Dispatch a generated method by name. A trailing argument that looks
    /// like an option bag is split off as query options.
    pub async fn call(&self, name: &str, args: Vec<Value>) -> Result<ServiceOutput> {
        let method = self.method(name)?.clone();
        tracing::debug!("Dispatching {} with {} arguments", name, args.len());
        match method {
            Method::Query { method, key } => {
                let (args, options) = split_arguments(args, &self.config.option_keys)?;
                self.run_query(method, &key, &args, &options).await
            }
            Method::Crud { method } => {
                let (args, options) = if method == CrudMethod::Search {
                    split_arguments(args, &self.config.option_keys)?
                } else {
                    (args, QueryOptions::default())
                };
                self.run_crud(method, name, &args, &options).await
            }
        }
    }

    /// Dispatch with options passed explicitly; no argument is inspected.
    pub async fn call_with(
        &self,
        name: &str,
        args: Vec<Value>,
        options: QueryOptions,
    ) -> Result<ServiceOutput> {
        match self.method(name)?.clone() {
            Method::Query { method, key } => self.run_query(method, &key, &args, &options).await,
            Method::Crud { method } => self.run_crud(method, name, &args, &options).await,
        }
    }

    pub async fn run_query(
        &self,
        method: QueryMethod,
        key: &str,
        args: &[Value],
        options: &QueryOptions,
    ) -> Result<ServiceOutput> {
        let arity = self.filter().get_query(key)?.arity();
        if args.len() != arity {
            return Err(ModelError::InvalidArguments {
                method: method.method_name(key),
                expected: arity,
                got: args.len(),
            });
        }
        Ok(match method {
            QueryMethod::List => ServiceOutput::Many(self.list(key, args, options).await?),
            QueryMethod::ListIds => ServiceOutput::Ids(self.list_ids(key, args, options).await?),
            QueryMethod::Find => ServiceOutput::One(self.find(key, args, options).await?),
            QueryMethod::FindId => ServiceOutput::Id(self.find_id(key, args, options).await?),
            QueryMethod::Pick => ServiceOutput::One(Some(self.pick(key, args, options).await?)),
            QueryMethod::PickId => ServiceOutput::Id(Some(self.pick_id(key, args, options).await?)),
            QueryMethod::Exists => ServiceOutput::Exists(self.exists(key, args).await?),
            QueryMethod::Count => ServiceOutput::Count(self.count(key, args).await?),
            QueryMethod::Insight => ServiceOutput::Insight(self.insight(key, args).await?),
            QueryMethod::Query => ServiceOutput::Filter(self.query(key, args)?),
        })
    }

    async fn run_crud(
        &self,
        method: CrudMethod,
        name: &str,
        args: &[Value],
        options: &QueryOptions,
    ) -> Result<ServiceOutput> {
        if args.len() != method.arity() {
            return Err(ModelError::InvalidArguments {
                method: name.to_string(),
                expected: method.arity(),
                got: args.len(),
            });
        }
        Ok(match method {
            CrudMethod::Get => {
                ServiceOutput::One(Some(self.get(string_arg("id", &args[0])?).await?))
            }
            CrudMethod::Load => ServiceOutput::One(self.load(string_arg("id", &args[0])?).await?),
            CrudMethod::Create => ServiceOutput::One(Some(self.create(&args[0]).await?)),
            CrudMethod::Update => ServiceOutput::One(Some(
                self.update(string_arg("id", &args[0])?, &args[1]).await?,
            )),
            CrudMethod::Remove => {
                ServiceOutput::One(Some(self.remove(string_arg("id", &args[0])?).await?))
            }
            CrudMethod::Search => {
                ServiceOutput::Many(self.search(string_arg("text", &args[0])?, options).await?)
            }
            CrudMethod::SearchCount => {
                ServiceOutput::Count(self.search_count(string_arg("text", &args[0])?).await?)
            }
        })
    }

    /// The raw predicate for `key`, without executing it.
    pub fn query(&self, key: &str, args: &[Value]) -> Result<Value> {
        self.filter().get_query(key)?.build(args)
    }

    pub async fn list(
        &self,
        key: &str,
        args: &[Value],
        options: &QueryOptions,
    ) -> Result<Vec<Crystal>> {
        let filter = self.live_filter(self.query(key, args)?);
        self.find_many(&filter, options).await
    }

    pub async fn list_ids(
        &self,
        key: &str,
        args: &[Value],
        options: &QueryOptions,
    ) -> Result<Vec<String>> {
        let options = QueryOptions {
            select: Some(vec!["id".to_string()]),
            ..options.clone()
        };
        Ok(self
            .list(key, args, &options)
            .await?
            .iter()
            .filter_map(document_id)
            .collect())
    }

    pub async fn find(
        &self,
        key: &str,
        args: &[Value],
        options: &QueryOptions,
    ) -> Result<Option<Crystal>> {
        let options = QueryOptions {
            limit: Some(1),
            ..options.clone()
        };
        Ok(self.list(key, args, &options).await?.into_iter().next())
    }

    pub async fn find_id(
        &self,
        key: &str,
        args: &[Value],
        options: &QueryOptions,
    ) -> Result<Option<String>> {
        let options = QueryOptions {
            limit: Some(1),
            ..options.clone()
        };
        Ok(self.list_ids(key, args, &options).await?.into_iter().next())
    }

    /// Like [`find`](Self::find), but a miss is a `NotFound` error.
    pub async fn pick(
        &self,
        key: &str,
        args: &[Value],
        options: &QueryOptions,
    ) -> Result<Crystal> {
        match self.find(key, args, options).await? {
            Some(found) => Ok(found),
            None => Err(self.not_found(key, args)?),
        }
    }

    pub async fn pick_id(
        &self,
        key: &str,
        args: &[Value],
        options: &QueryOptions,
    ) -> Result<String> {
        match self.find_id(key, args, options).await? {
            Some(found) => Ok(found),
            None => Err(self.not_found(key, args)?),
        }
    }

    pub async fn exists(&self, key: &str, args: &[Value]) -> Result<bool> {
        Ok(self.count(key, args).await? > 0)
    }

    pub async fn count(&self, key: &str, args: &[Value]) -> Result<u64> {
        let filter = self.live_filter(self.query(key, args)?);
        self.store.count(self.ref_name(), &filter).await
    }

    /// Aggregate the insight variant's accumulators over the matches; fields
    /// without an accumulator keep their defaults.
    pub async fn insight(&self, key: &str, args: &[Value]) -> Result<Crystal> {
        let filter = self.live_filter(self.query(key, args)?);
        let constant = &self.database.constant;
        let entry = constant.registry().entry(constant.insight())?;
        let accumulators: Map<String, Value> = entry
            .fields
            .values()
            .filter_map(|meta| meta.accumulate.clone().map(|op| (meta.key.clone(), op)))
            .collect();
        let aggregated = self
            .store
            .aggregate(self.ref_name(), &filter, &accumulators)
            .await?;

        let mut insight = constant.get_default_insight()?;
        if let Value::Object(fields) = &mut insight {
            fields.extend(aggregated);
        }
        constant.crystalize_insight(&insight)
    }

    pub async fn load(&self, id: &str) -> Result<Option<Crystal>> {
        match self.load_live(id).await? {
            Some((_, doc)) => self.project(&doc).map(Some),
            None => Ok(None),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Crystal> {
        match self.load(id).await? {
            Some(found) => Ok(found),
            None => Err(self.missing_id(id)),
        }
    }

    /// Purify `data` through the input variant, complete it with the full
    /// defaults and base fields, validate and store it.
    pub async fn create(&self, data: &Value) -> Result<Crystal> {
        let constant = &self.database.constant;
        let input = constant.purify(data)?;
        let mut doc = constant.get_default()?;
        overlay(&mut doc, &input);

        let now = Value::String(format_date(&Utc::now()));
        if let Value::Object(fields) = &mut doc {
            fields.insert("id".into(), Value::String(ObjectId::new().to_hex()));
            fields.insert("createdAt".into(), now.clone());
            fields.insert("updatedAt".into(), now);
            fields.insert("removedAt".into(), Value::Null);
        }

        let written = self.write(None, &doc).await?;
        let id = written.get("id").and_then(Value::as_str).unwrap_or_default();
        tracing::info!("Created {} {}", self.ref_name(), id);
        self.project(&written)
    }

    /// Create every document concurrently; the first failure aborts the batch
    /// but documents already written stay written.
    pub async fn create_many(&self, items: &[Value]) -> Result<Vec<Crystal>> {
        let created = try_join_all(items.iter().map(|data| self.create(data))).await?;
        tracing::debug!("Created {} {} documents", created.len(), self.ref_name());
        Ok(created)
    }

    /// Apply the keys of `patch` to a live document. Base and immutable
    /// fields are kept; input fields are re-purified.
    pub async fn update(&self, id: &str, patch: &Value) -> Result<Crystal> {
        let Value::Object(patch) = patch else {
            return Err(ModelError::coercion(
                self.ref_name().to_string(),
                format!("expected an update document, got {patch}"),
            ));
        };
        let Some((object_id, before)) = self.load_live(id).await? else {
            return Err(self.missing_id(id));
        };

        let mut after = before.clone();
        if let Value::Object(fields) = &mut after {
            for (key, value) in patch {
                let writable = self
                    .schema
                    .property(key)
                    .is_some_and(|prop| !prop.immutable)
                    && !BASE_FIELDS.contains(&key.as_str());
                if writable {
                    fields.insert(key.clone(), value.clone());
                }
            }
        }
        let canonical = self.database.constant.purify(&after)?;
        overlay(&mut after, &canonical);
        touch(&mut after, "updatedAt");

        let written = self.write(Some((&object_id, &before)), &after).await?;
        self.project(&written)
    }

    /// Soft delete: set the removal marker.
    pub async fn remove(&self, id: &str) -> Result<Crystal> {
        let Some((object_id, before)) = self.load_live(id).await? else {
            return Err(self.missing_id(id));
        };
        let mut after = before.clone();
        touch(&mut after, "updatedAt");
        touch(&mut after, "removedAt");

        let written = self.write(Some((&object_id, &before)), &after).await?;
        tracing::info!("Removed {} {}", self.ref_name(), id);
        self.project(&written)
    }

    /// Case-insensitive substring match over the search text fields.
    pub async fn search(&self, text: &str, options: &QueryOptions) -> Result<Vec<Crystal>> {
        let filter = self.live_filter(self.search_filter(text));
        self.find_many(&filter, options).await
    }

    pub async fn search_count(&self, text: &str) -> Result<u64> {
        let filter = self.live_filter(self.search_filter(text));
        self.store.count(self.ref_name(), &filter).await
    }

    fn search_filter(&self, text: &str) -> Value {
        let pattern = regex::escape(text);
        let branches: Vec<Value> = self
            .schema
            .properties
            .values()
            .filter(|prop| prop.text == TextRole::Search)
            .map(|prop| {
                let mut branch = Map::new();
                branch.insert(
                    prop.key.clone(),
                    json!({ "$regex": pattern, "$options": "i" }),
                );
                Value::Object(branch)
            })
            .collect();
        json!({ "$or": branches })
    }

    fn live_filter(&self, predicate: Value) -> Value {
        json!({ "$and": [predicate, { "removedAt": null }] })
    }

    fn find_options(&self, options: &QueryOptions) -> Result<FindOptions> {
        let sort = match &options.sort {
            Some(key) => Some(self.filter().get_sort(key)?.clone()),
            None => self.filter().get_sort("latest").ok().cloned(),
        };
        let limit = options
            .limit
            .or(self.config.default_limit)
            .map(|limit| {
                if limit > self.config.max_limit {
                    tracing::warn!(
                        "Limit {} on {} clamped to {}",
                        limit,
                        self.ref_name(),
                        self.config.max_limit
                    );
                }
                limit.min(self.config.max_limit)
            });
        Ok(FindOptions {
            sort,
            skip: options.skip,
            limit,
            select: options
                .select
                .clone()
                .or_else(|| self.schema.default_projection()),
        })
    }

    async fn find_many(&self, filter: &Value, options: &QueryOptions) -> Result<Vec<Crystal>> {
        let options = self.find_options(options)?;
        let docs = self.store.find(self.ref_name(), filter, &options).await?;
        docs.iter().map(|doc| self.hydrate(doc)).collect()
    }

    fn hydrate(&self, doc: &StoredDocument) -> Result<Crystal> {
        self.database
            .constant
            .crystalize(&self.schema.from_stored(doc))
    }

    /// Hydrate a single document, keeping only the default projection.
    fn project(&self, doc: &Value) -> Result<Crystal> {
        let projected = match (self.schema.default_projection(), doc) {
            (Some(keys), Value::Object(fields)) => Value::Object(
                fields
                    .iter()
                    .filter(|(key, _)| keys.contains(key))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
            ),
            _ => doc.clone(),
        };
        self.database.constant.crystalize(&projected)
    }

    async fn load_live(&self, id: &str) -> Result<Option<(ObjectId, Value)>> {
        let object_id = ObjectId::parse_str(id).ok_or_else(|| {
            ModelError::coercion("id".to_string(), format!("invalid object id '{id}'"))
        })?;
        let Some(stored) = self.store.get(self.ref_name(), &object_id).await? else {
            return Ok(None);
        };
        let doc = self.schema.from_stored(&stored);
        let removed = doc.get("removedAt").is_some_and(|v| !v.is_null());
        Ok((!removed).then_some((object_id, doc)))
    }

    /// Validate, store and announce a write; returns the stored document in
    /// service-facing form.
    async fn write(&self, before: Option<(&ObjectId, &Value)>, after: &Value) -> Result<Value> {
        self.schema.validate(after)?;
        let stored = self.schema.to_stored(after)?;
        let written = self.schema.from_stored(&stored);
        match before {
            None => self.store.insert(self.ref_name(), stored).await?,
            Some((id, _)) => {
                if !self.store.replace(self.ref_name(), id, stored).await? {
                    return Err(self.missing_id(&id.to_hex()));
                }
            }
        }
        let event = LifecycleEvent::classify(before.map(|(_, doc)| doc), &written);
        self.schema.fire(event, &written);
        Ok(written)
    }

    fn not_found(&self, key: &str, args: &[Value]) -> Result<ModelError> {
        Ok(ModelError::not_found(
            self.ref_name().to_string(),
            self.query(key, args)?.to_string(),
        ))
    }

    fn missing_id(&self, id: &str) -> ModelError {
        ModelError::not_found(self.ref_name().to_string(), json!({ "id": id }).to_string())
    }
}

impl std::fmt::Debug for QueryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryService")
            .field("ref_name", &self.ref_name())
            .field("methods", &self.methods.len())
            .finish()
    }
}

fn string_arg<'a>(name: &str, value: &'a Value) -> Result<&'a str> {
    value.as_str().ok_or_else(|| {
        ModelError::coercion(name.to_string(), format!("expected a string, got {value}"))
    })
}

fn document_id(crystal: &Crystal) -> Option<String> {
    match crystal.get("id") {
        Some(Crystal::String(id)) => Some(id.clone()),
        _ => None,
    }
}

fn overlay(target: &mut Value, source: &Value) {
    if let (Value::Object(target), Value::Object(source)) = (target, source) {
        for (key, value) in source {
            target.insert(key.clone(), value.clone());
        }
    }
}

fn touch(doc: &mut Value, key: &str) {
    if let Value::Object(fields) = doc {
        fields.insert(key.to_string(), Value::String(format_date(&Utc::now())));
    }
}
