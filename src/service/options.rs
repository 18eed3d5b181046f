use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelError, Result};

/// Paging, ordering and projection accepted by generated query methods.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    pub select: Option<Vec<String>>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
    /// Sort key from the filter spec.
    pub sort: Option<String>,
}

impl QueryOptions {
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn sort(mut self, key: impl Into<String>) -> Self {
        self.sort = Some(key.into());
        self
    }

    pub fn select<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Read an option bag. `select` may be a space-separated string, an array
    /// of keys or a `{ key: 1 }` projection.
    pub fn from_value(value: &Value) -> Result<Self> {
        let Value::Object(bag) = value else {
            return Err(ModelError::coercion(
                "options".to_string(),
                format!("expected an option bag, got {value}"),
            ));
        };
        let count = |key: &str| -> Result<Option<usize>> {
            match bag.get(key) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::Number(n)) => n.as_u64().map(|n| Some(n as usize)).ok_or_else(|| {
                    ModelError::coercion(key.to_string(), format!("expected a count, got {n}"))
                }),
                Some(other) => Err(ModelError::coercion(
                    key.to_string(),
                    format!("expected a count, got {other}"),
                )),
            }
        };
        let select = match bag.get("select") {
            None | Some(Value::Null) => None,
            Some(Value::String(keys)) => {
                Some(keys.split_whitespace().map(str::to_string).collect())
            }
            Some(Value::Array(keys)) => Some(
                keys.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            ),
            Some(Value::Object(projection)) => Some(
                projection
                    .iter()
                    .filter(|(_, on)| on.as_i64() != Some(0) && on.as_bool() != Some(false))
                    .map(|(key, _)| key.clone())
                    .collect(),
            ),
            Some(other) => {
                return Err(ModelError::coercion(
                    "select".to_string(),
                    format!("unsupported projection {other}"),
                ));
            }
        };
        let sort = match bag.get("sort") {
            None | Some(Value::Null) => None,
            Some(Value::String(key)) => Some(key.clone()),
            Some(other) => {
                return Err(ModelError::coercion(
                    "sort".to_string(),
                    format!("expected a sort key, got {other}"),
                ));
            }
        };
        Ok(Self {
            select,
            skip: count("skip")?,
            limit: count("limit")?,
            sort,
        })
    }
}

/// Whether `value` looks like a query-option bag: an object carrying at
/// least one of `option_keys`.
///
/// This is a shape heuristic. A predicate whose last positional argument is
/// an object with one of these keys is misread as options; callers in that
/// position should use the explicit options channel instead.
pub fn is_option_bag(value: &Value, option_keys: &[String]) -> bool {
    value
        .as_object()
        .is_some_and(|bag| option_keys.iter().any(|key| bag.contains_key(key)))
}

/// Split a trailing option bag off positional arguments.
pub fn split_arguments(
    mut args: Vec<Value>,
    option_keys: &[String],
) -> Result<(Vec<Value>, QueryOptions)> {
    match args.last() {
        Some(last) if is_option_bag(last, option_keys) => {
            let options = QueryOptions::from_value(last)?;
            args.pop();
            Ok((args, options))
        }
        _ => Ok((args, QueryOptions::default())),
    }
}
