use indexmap::IndexMap;
use serde::Serialize;

use super::FilterSpec;
use crate::types::capitalize;

/// Per-query-key operations, one generated method each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryMethod {
    List,
    ListIds,
    Find,
    FindId,
    Pick,
    PickId,
    Exists,
    Count,
    Insight,
    Query,
}

impl QueryMethod {
    pub const ALL: [QueryMethod; 10] = [
        Self::List,
        Self::ListIds,
        Self::Find,
        Self::FindId,
        Self::Pick,
        Self::PickId,
        Self::Exists,
        Self::Count,
        Self::Insight,
        Self::Query,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::ListIds => "listIds",
            Self::Find => "find",
            Self::FindId => "findId",
            Self::Pick => "pick",
            Self::PickId => "pickId",
            Self::Exists => "exists",
            Self::Count => "count",
            Self::Insight => "insight",
            Self::Query => "query",
        }
    }

    pub fn method_name(&self, query_key: &str) -> String {
        format!("{}{}", self.prefix(), capitalize(query_key))
    }
}

/// Entity-level operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CrudMethod {
    Get,
    Load,
    Create,
    Update,
    Remove,
    Search,
    SearchCount,
}

impl CrudMethod {
    pub const ALL: [CrudMethod; 7] = [
        Self::Get,
        Self::Load,
        Self::Create,
        Self::Update,
        Self::Remove,
        Self::Search,
        Self::SearchCount,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Load => "load",
            Self::Create => "create",
            Self::Update => "update",
            Self::Remove => "remove",
            Self::Search => "search",
            Self::SearchCount => "searchCount",
        }
    }

    /// Positional arguments, not counting a trailing option bag.
    pub fn arity(&self) -> usize {
        match self {
            Self::Update => 2,
            _ => 1,
        }
    }

    pub fn method_name(&self, ref_name: &str) -> String {
        format!("{}{}", self.prefix(), capitalize(ref_name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Method {
    Query { method: QueryMethod, key: String },
    Crud { method: CrudMethod },
}

/// Every generated method name for `filter`, in declaration order: the
/// entity-level methods first, then the per-key methods.
pub fn method_table(filter: &FilterSpec) -> IndexMap<String, Method> {
    let mut table = IndexMap::new();
    for method in CrudMethod::ALL {
        table.insert(
            method.method_name(filter.ref_name()),
            Method::Crud { method },
        );
    }
    for key in filter.query_keys() {
        for method in QueryMethod::ALL {
            table.insert(
                method.method_name(key),
                Method::Query {
                    method,
                    key: key.to_string(),
                },
            );
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_table_names() {
        let filter = FilterSpec::new("post")
            .query("byOwner", ["ownerId"], |args| Ok(json!({ "owner": args[0] })));
        let table = method_table(&filter);
        for name in [
            "getPost",
            "createPost",
            "searchCountPost",
            "listAny",
            "listByOwner",
            "listIdsByOwner",
            "findByOwner",
            "pickIdByOwner",
            "existsByOwner",
            "countByOwner",
            "insightByOwner",
            "queryByOwner",
        ] {
            assert!(table.contains_key(name), "missing {name}");
        }
        assert_eq!(
            table["countByOwner"],
            Method::Query {
                method: QueryMethod::Count,
                key: "byOwner".to_string()
            }
        );
        assert_eq!(table.len(), 7 + 2 * 10);
    }
}
