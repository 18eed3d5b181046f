use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use std::fmt;
use std::sync::Arc;

use crate::error::{ModelError, Result};

pub type PredicateFn = dyn Fn(&[Value]) -> Result<Value> + Send + Sync;

/// One named query: argument names and the predicate that turns positional
/// arguments into a store filter.
#[derive(Clone)]
pub struct QueryDef {
    pub arg_names: Vec<String>,
    predicate: Arc<PredicateFn>,
}

impl QueryDef {
    pub fn new<I, S>(
        arg_names: I,
        predicate: impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            arg_names: arg_names.into_iter().map(Into::into).collect(),
            predicate: Arc::new(predicate),
        }
    }

    /// Query matching every field named in `fields` against the argument of
    /// the same position.
    pub fn equality<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        let names = fields.clone();
        Self::new(names, move |args| {
            Ok(Value::Object(
                fields
                    .iter()
                    .cloned()
                    .zip(args.iter().cloned())
                    .collect::<Map<String, Value>>(),
            ))
        })
    }

    pub fn arity(&self) -> usize {
        self.arg_names.len()
    }

    pub fn build(&self, args: &[Value]) -> Result<Value> {
        (self.predicate)(args)
    }
}

impl fmt::Debug for QueryDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryDef")
            .field("arg_names", &self.arg_names)
            .finish()
    }
}

/// Named queries and sort keys for one entity.
///
/// Every spec starts with the `any` query (no arguments, matches every live
/// document) and the `latest`/`oldest` sorts on `createdAt`. Keys become part
/// of generated method names, so they must stay stable.
#[derive(Debug, Clone)]
pub struct FilterSpec {
    ref_name: String,
    queries: IndexMap<String, QueryDef>,
    sorts: IndexMap<String, Map<String, Value>>,
}

impl FilterSpec {
    pub fn new(ref_name: impl Into<String>) -> Self {
        let mut spec = Self {
            ref_name: ref_name.into(),
            queries: IndexMap::new(),
            sorts: IndexMap::new(),
        };
        spec.add_query("any", QueryDef::new(Vec::<String>::new(), |_| Ok(json!({}))));
        spec.add_sort("latest", sort_doc(json!({ "createdAt": -1 })));
        spec.add_sort("oldest", sort_doc(json!({ "createdAt": 1 })));
        spec
    }

    pub fn ref_name(&self) -> &str {
        &self.ref_name
    }

    pub fn query<I, S>(
        mut self,
        key: &str,
        arg_names: I,
        predicate: impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_query(key, QueryDef::new(arg_names, predicate));
        self
    }

    /// `spec` is a `{ field: 1 | -1 }` document.
    pub fn sort(mut self, key: &str, spec: Value) -> Self {
        self.add_sort(key, sort_doc(spec));
        self
    }

    pub fn add_query(&mut self, key: &str, query: QueryDef) {
        self.queries.insert(key.to_string(), query);
    }

    pub fn add_sort(&mut self, key: &str, spec: Map<String, Value>) {
        self.sorts.insert(key.to_string(), spec);
    }

    pub fn query_keys(&self) -> Vec<&str> {
        self.queries.keys().map(String::as_str).collect()
    }

    pub fn sort_keys(&self) -> Vec<&str> {
        self.sorts.keys().map(String::as_str).collect()
    }

    pub fn get_query(&self, key: &str) -> Result<&QueryDef> {
        self.queries.get(key).ok_or_else(|| ModelError::UnknownQuery {
            ref_name: self.ref_name.clone(),
            key: key.to_string(),
        })
    }

    pub fn get_sort(&self, key: &str) -> Result<&Map<String, Value>> {
        self.sorts.get(key).ok_or_else(|| ModelError::UnknownSort {
            ref_name: self.ref_name.clone(),
            key: key.to_string(),
        })
    }
}

fn sort_doc(spec: Value) -> Map<String, Value> {
    match spec {
        Value::Object(entries) => entries,
        _ => Map::new(),
    }
}
