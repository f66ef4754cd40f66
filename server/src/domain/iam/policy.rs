//! IAM policy expressions
//!
//! A policy query returns an expression tree over resource attributes
//! (`{"op": "eq", "field": "biz.id", "value": "2"}`, combined with `AND` /
//! `OR`). The tree is evaluated locally against an [`ObjectSet`] built from
//! the resources being checked.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::types::Resource;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum PolicyExpression {
    #[serde(rename = "AND")]
    And { content: Vec<PolicyExpression> },
    #[serde(rename = "OR")]
    Or { content: Vec<PolicyExpression> },
    #[serde(rename = "eq")]
    Eq { field: String, value: Value },
    #[serde(rename = "not_eq")]
    NotEq { field: String, value: Value },
    #[serde(rename = "in")]
    In { field: String, value: Vec<Value> },
    #[serde(rename = "not_in")]
    NotIn { field: String, value: Vec<Value> },
    #[serde(rename = "contains")]
    Contains { field: String, value: Value },
    #[serde(rename = "starts_with")]
    StartsWith { field: String, value: Value },
    #[serde(rename = "any")]
    Any {
        field: String,
        #[serde(default)]
        value: Value,
    },
}

/// Attributes of the objects an expression is evaluated against, keyed by
/// resource type
#[derive(Debug, Clone, Default)]
pub struct ObjectSet {
    objects: HashMap<String, Map<String, Value>>,
}

impl ObjectSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_object(&mut self, object_type: impl Into<String>, attributes: Map<String, Value>) {
        self.objects.insert(object_type.into(), attributes);
    }

    /// Build the object set for a resource list: each resource contributes
    /// its `id` plus its attributes under its type
    pub fn from_resources(resources: &[Resource]) -> Self {
        let mut set = Self::new();
        for resource in resources {
            let mut attributes = resource.attribute.clone();
            attributes.insert("id".to_string(), Value::String(resource.id.clone()));
            set.add_object(resource.resource_type.clone(), attributes);
        }
        set
    }

    /// Look up `type.attribute`
    fn get(&self, field: &str) -> Option<&Value> {
        let (object_type, attribute) = field.split_once('.')?;
        self.objects.get(object_type)?.get(attribute)
    }
}

impl PolicyExpression {
    pub fn eval(&self, objects: &ObjectSet) -> bool {
        match self {
            Self::And { content } => content.iter().all(|e| e.eval(objects)),
            Self::Or { content } => content.iter().any(|e| e.eval(objects)),
            Self::Any { .. } => true,
            Self::Eq { field, value } => {
                objects.get(field).is_some_and(|attr| matches_any(attr, |a| loose_eq(a, value)))
            }
            Self::NotEq { field, value } => objects
                .get(field)
                .is_some_and(|attr| !matches_any(attr, |a| loose_eq(a, value))),
            Self::In { field, value } => objects.get(field).is_some_and(|attr| {
                matches_any(attr, |a| value.iter().any(|v| loose_eq(a, v)))
            }),
            Self::NotIn { field, value } => objects.get(field).is_some_and(|attr| {
                !matches_any(attr, |a| value.iter().any(|v| loose_eq(a, v)))
            }),
            Self::Contains { field, value } => match objects.get(field) {
                Some(Value::Array(items)) => items.iter().any(|a| loose_eq(a, value)),
                _ => false,
            },
            Self::StartsWith { field, value } => {
                let Some(prefix) = as_text(value) else {
                    return false;
                };
                objects.get(field).is_some_and(|attr| {
                    matches_any(attr, |a| as_text(a).is_some_and(|s| s.starts_with(&prefix)))
                })
            }
        }
    }
}

/// Apply `pred` to a scalar attribute, or to each element of a list attribute
fn matches_any(attr: &Value, pred: impl Fn(&Value) -> bool) -> bool {
    match attr {
        Value::Array(items) => items.iter().any(pred),
        other => pred(other),
    }
}

/// Compare values the way policy ids are stored: `"2"` equals `2`
fn loose_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (as_text(a), as_text(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn biz(id: &str) -> ObjectSet {
        let mut set = ObjectSet::new();
        let mut attrs = Map::new();
        attrs.insert("id".into(), json!(id));
        set.add_object("biz", attrs);
        set
    }

    fn parse(value: Value) -> PolicyExpression {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_eq_with_loose_types() {
        let expr = parse(json!({"op": "eq", "field": "biz.id", "value": 2}));
        assert!(expr.eval(&biz("2")));
        assert!(!expr.eval(&biz("3")));
    }

    #[test]
    fn test_in_and_not_in() {
        let expr = parse(json!({"op": "in", "field": "biz.id", "value": ["1", "2"]}));
        assert!(expr.eval(&biz("2")));
        assert!(!expr.eval(&biz("5")));

        let expr = parse(json!({"op": "not_in", "field": "biz.id", "value": ["1", "2"]}));
        assert!(expr.eval(&biz("5")));
        assert!(!expr.eval(&biz("1")));
    }

    #[test]
    fn test_any_allows_everything() {
        let expr = parse(json!({"op": "any", "field": "biz.id", "value": []}));
        assert!(expr.eval(&biz("42")));
        assert!(expr.eval(&ObjectSet::new()));
    }

    #[test]
    fn test_nested_and_or() {
        let expr = parse(json!({
            "op": "OR",
            "content": [
                {"op": "eq", "field": "biz.id", "value": "1"},
                {"op": "AND", "content": [
                    {"op": "not_eq", "field": "biz.id", "value": "3"},
                    {"op": "in", "field": "biz.id", "value": ["2", "3"]}
                ]}
            ]
        }));
        assert!(expr.eval(&biz("1")));
        assert!(expr.eval(&biz("2")));
        assert!(!expr.eval(&biz("3")));
        assert!(!expr.eval(&biz("4")));
    }

    #[test]
    fn test_missing_attribute_is_denied() {
        let expr = parse(json!({"op": "not_eq", "field": "indices.id", "value": "1"}));
        assert!(!expr.eval(&biz("1")));
    }

    #[test]
    fn test_starts_with_on_iam_path() {
        let resource = Resource::new("bk_log_search", "indices", "9")
            .with_attribute("_bk_iam_path_", "/biz,2/");
        let set = ObjectSet::from_resources(&[resource]);
        let expr = parse(json!({
            "op": "starts_with", "field": "indices._bk_iam_path_", "value": "/biz,2/"
        }));
        assert!(expr.eval(&set));
        let expr = parse(json!({"op": "eq", "field": "indices.id", "value": "9"}));
        assert!(expr.eval(&set));
    }

    #[test]
    fn test_contains_requires_list_attribute() {
        let mut set = ObjectSet::new();
        let mut attrs = Map::new();
        attrs.insert("owners".into(), json!(["alice", "bob"]));
        set.add_object("indices", attrs);
        let expr = parse(json!({"op": "contains", "field": "indices.owners", "value": "bob"}));
        assert!(expr.eval(&set));
        let expr = parse(json!({"op": "contains", "field": "indices.owners", "value": "eve"}));
        assert!(!expr.eval(&set));
    }

    #[test]
    fn test_unknown_op_fails_to_parse() {
        let result: Result<PolicyExpression, _> =
            serde_json::from_value(json!({"op": "regex", "field": "biz.id", "value": ".*"}));
        assert!(result.is_err());
    }
}
