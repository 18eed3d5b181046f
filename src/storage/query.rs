//! Filter documents evaluated against the service-facing JSON form of stored
//! documents.

use regex::RegexBuilder;
use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::error::{ModelError, Result};

/// Paging, ordering and projection for a find.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// `{ field: 1 | -1 }` in priority order.
    pub sort: Option<Map<String, Value>>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
    pub select: Option<Vec<String>>,
}

/// Value at a dotted path.
pub fn get_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, segment| match current {
        Value::Object(entries) => entries.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

pub fn matches(doc: &Value, filter: &Value) -> Result<bool> {
    let Value::Object(conditions) = filter else {
        return Err(ModelError::store(format!("filter must be an object, got {filter}")));
    };
    for (key, condition) in conditions {
        let matched = match key.as_str() {
            "$or" => any_matches(doc, condition)?,
            "$and" => all_match(doc, condition)?,
            "$nor" => !any_matches(doc, condition)?,
            _ => field_matches(get_path(doc, key), condition)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn branches(condition: &Value) -> Result<&[Value]> {
    condition
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| ModelError::store("logical operators take an array of filters"))
}

fn any_matches(doc: &Value, condition: &Value) -> Result<bool> {
    for branch in branches(condition)? {
        if matches(doc, branch)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn all_match(doc: &Value, condition: &Value) -> Result<bool> {
    for branch in branches(condition)? {
        if !matches(doc, branch)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn is_operator_object(condition: &Value) -> bool {
    condition
        .as_object()
        .is_some_and(|ops| !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')))
}

fn field_matches(value: Option<&Value>, condition: &Value) -> Result<bool> {
    if !is_operator_object(condition) {
        return Ok(equals(value, condition));
    }
    let Some(ops) = condition.as_object() else {
        return Ok(false);
    };
    for (op, operand) in ops {
        let matched = match op.as_str() {
            "$eq" => equals(value, operand),
            "$ne" => !equals(value, operand),
            "$in" => in_list(value, operand)?,
            "$nin" => !in_list(value, operand)?,
            "$exists" => value.is_some_and(|v| !v.is_null()) == operand.as_bool().unwrap_or(true),
            "$gt" => compare_with(value, operand, |o| o == Ordering::Greater),
            "$gte" => compare_with(value, operand, |o| o != Ordering::Less),
            "$lt" => compare_with(value, operand, |o| o == Ordering::Less),
            "$lte" => compare_with(value, operand, |o| o != Ordering::Greater),
            "$regex" => regex_matches(value, operand, ops.get("$options"))?,
            "$options" => true,
            other => return Err(ModelError::store(format!("unsupported operator {other}"))),
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Equality with array containment; a missing field equals `null`.
fn equals(value: Option<&Value>, expected: &Value) -> bool {
    match value {
        None | Some(Value::Null) => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
        Some(actual) => actual == expected,
    }
}

fn in_list(value: Option<&Value>, operand: &Value) -> Result<bool> {
    let candidates = operand
        .as_array()
        .ok_or_else(|| ModelError::store("$in takes an array"))?;
    Ok(candidates.iter().any(|candidate| equals(value, candidate)))
}

fn compare_with(value: Option<&Value>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let Some(value) = value else {
        return false;
    };
    let candidates: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    candidates.into_iter().any(|candidate| {
        same_class(candidate, operand) && accept(compare_values(candidate, operand))
    })
}

fn same_class(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_))
            | (Value::Bool(_), Value::Bool(_))
    )
}

fn regex_matches(value: Option<&Value>, pattern: &Value, options: Option<&Value>) -> Result<bool> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| ModelError::store("$regex takes a string pattern"))?;
    let case_insensitive = options
        .and_then(Value::as_str)
        .is_some_and(|flags| flags.contains('i'));
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| ModelError::store(format!("invalid $regex: {e}")))?;
    Ok(match value {
        Some(Value::String(s)) => regex.is_match(s),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .any(|s| regex.is_match(s)),
        _ => false,
    })
}

/// Total order used for sorting: null < bool < number < string < others.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Compare two documents under a `{ field: 1 | -1 }` sort spec.
pub fn compare_by(sort: &Map<String, Value>, a: &Value, b: &Value) -> Ordering {
    for (path, direction) in sort {
        let null = Value::Null;
        let left = get_path(a, path).unwrap_or(&null);
        let right = get_path(b, path).unwrap_or(&null);
        let ordering = compare_values(left, right);
        let ordering = if direction.as_i64() == Some(-1) {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Fold `$sum` accumulators over the matched documents.
///
/// An accumulator is either `{ "$sum": <number> }`, adding the constant per
/// document, or `{ "$sum": "$field" }`, adding the field's numeric value.
pub fn accumulate(docs: &[Value], accumulators: &Map<String, Value>) -> Result<Map<String, Value>> {
    let mut out = Map::new();
    for (key, spec) in accumulators {
        let operand = spec.get("$sum").ok_or_else(|| {
            ModelError::store(format!("unsupported accumulator for {key}: {spec}"))
        })?;
        let mut integral = true;
        let mut total = 0f64;
        for doc in docs {
            let addend = match operand {
                Value::String(path) if path.starts_with('$') => {
                    get_path(doc, &path[1..]).cloned().unwrap_or(Value::Null)
                }
                other => other.clone(),
            };
            if let Value::Number(n) = addend {
                integral &= n.is_i64() || n.is_u64();
                total += n.as_f64().unwrap_or(0.0);
            }
        }
        let value = if integral {
            Value::from(total as i64)
        } else {
            serde_json::Number::from_f64(total)
                .map(Value::Number)
                .unwrap_or(Value::Null)
        };
        out.insert(key.clone(), value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equality_and_containment() {
        let doc = json!({ "owner": "u1", "tags": ["a", "b"], "removedAt": null });
        assert!(matches(&doc, &json!({ "owner": "u1" })).unwrap());
        assert!(matches(&doc, &json!({ "tags": "b" })).unwrap());
        assert!(matches(&doc, &json!({ "removedAt": null })).unwrap());
        assert!(matches(&doc, &json!({ "missing": null })).unwrap());
        assert!(!matches(&doc, &json!({ "owner": "u2" })).unwrap());
    }

    #[test]
    fn test_operators() {
        let doc = json!({ "n": 5, "title": "Hello World", "meta": { "depth": 2 } });
        assert!(matches(&doc, &json!({ "n": { "$gt": 4, "$lte": 5 } })).unwrap());
        assert!(!matches(&doc, &json!({ "n": { "$lt": 5 } })).unwrap());
        assert!(matches(&doc, &json!({ "n": { "$in": [1, 5] } })).unwrap());
        assert!(matches(&doc, &json!({ "n": { "$ne": 4 } })).unwrap());
        assert!(matches(&doc, &json!({ "x": { "$exists": false } })).unwrap());
        assert!(matches(&doc, &json!({ "meta.depth": 2 })).unwrap());
        assert!(
            matches(&doc, &json!({ "title": { "$regex": "world", "$options": "i" } })).unwrap()
        );
        assert!(
            matches(&doc, &json!({ "$or": [{ "n": 1 }, { "title": { "$regex": "^Hello" } }] }))
                .unwrap()
        );
    }

    #[test]
    fn test_unknown_operator_is_error() {
        let err = matches(&json!({}), &json!({ "n": { "$near": 1 } })).unwrap_err();
        assert!(matches!(err, ModelError::Store { .. }));
    }

    #[test]
    fn test_sort_and_accumulate() {
        let mut docs = vec![json!({ "n": 2 }), json!({ "n": 3 }), json!({ "n": 1 })];
        let sort = json!({ "n": -1 });
        docs.sort_by(|a, b| compare_by(sort.as_object().unwrap(), a, b));
        assert_eq!(docs[0]["n"], 3);

        let acc = json!({ "count": { "$sum": 1 }, "total": { "$sum": "$n" } });
        let out = accumulate(&docs, acc.as_object().unwrap()).unwrap();
        assert_eq!(out["count"], 3);
        assert_eq!(out["total"], 6);
    }
}
