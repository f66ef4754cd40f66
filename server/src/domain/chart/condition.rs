//! Filter conditions and the operator table
//!
//! A condition is `{field, operator, value}` where `value` is a scalar or a
//! list of scalars. Each known operator maps to one row of [`OPERATOR_RULES`]
//! which fixes its SQL token, how multiple values are joined and how each
//! value is rewritten before quoting.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

/// A single filter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => f.write_str(&format_float(*x)),
            Self::Str(s) => f.write_str(s),
        }
    }
}

/// Float text keeps a fractional part and writes exponents as `e+20` / `e-05`
fn format_float(x: f64) -> String {
    let text = format!("{:?}", x);
    let Some((mantissa, exponent)) = text.split_once('e') else {
        return text;
    };
    let (sign, digits) = match exponent.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exponent),
    };
    format!("{}e{}{:0>2}", mantissa, sign, digits)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Many(Vec<Option<Scalar>>),
    One(Option<Scalar>),
}

/// Accept `null`, a scalar or a list. `null`, `""` and `[]` are empty.
fn deserialize_values<'de, D>(deserializer: D) -> Result<Vec<Scalar>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawValue>::deserialize(deserializer)?;
    Ok(match raw {
        None | Some(RawValue::One(None)) => Vec::new(),
        Some(RawValue::One(Some(Scalar::Str(s)))) if s.is_empty() => Vec::new(),
        Some(RawValue::One(Some(value))) => vec![value],
        Some(RawValue::Many(values)) => values.into_iter().flatten().collect(),
    })
}

/// How the per-value fragments of one condition are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinWord {
    And,
    Or,
}

impl JoinWord {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// Rewrite applied to each value before it is quoted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueTransform {
    None,
    /// `*` -> `%`, `?` -> `_`
    Wildcard,
    /// `v` -> `%v%`
    Wrap,
}

#[derive(Debug, PartialEq, Eq)]
pub struct OperatorRule {
    pub name: &'static str,
    pub token: &'static str,
    pub join: JoinWord,
    pub transform: ValueTransform,
    /// The operator is unary and its value is never read
    pub ignores_value: bool,
}

const fn rule(
    name: &'static str,
    token: &'static str,
    join: JoinWord,
    transform: ValueTransform,
) -> OperatorRule {
    OperatorRule {
        name,
        token,
        join,
        transform,
        ignores_value: false,
    }
}

const fn unary(name: &'static str, token: &'static str) -> OperatorRule {
    OperatorRule {
        name,
        token,
        join: JoinWord::Or,
        transform: ValueTransform::None,
        ignores_value: true,
    }
}

pub static OPERATOR_RULES: &[OperatorRule] = &[
    unary("is true", "IS TRUE"),
    unary("is false", "IS FALSE"),
    rule("=~", "LIKE", JoinWord::Or, ValueTransform::Wildcard),
    rule("&=~", "LIKE", JoinWord::And, ValueTransform::Wildcard),
    rule("!=~", "NOT LIKE", JoinWord::Or, ValueTransform::Wildcard),
    rule("&!=~", "NOT LIKE", JoinWord::And, ValueTransform::Wildcard),
    rule("contains", "LIKE", JoinWord::Or, ValueTransform::Wrap),
    rule("not contains", "NOT LIKE", JoinWord::Or, ValueTransform::Wrap),
    rule("contains match phrase", "MATCH_ANY", JoinWord::Or, ValueTransform::None),
    rule("all contains match phrase", "MATCH_ANY", JoinWord::And, ValueTransform::None),
    rule("not contains match phrase", "NOT MATCH_ANY", JoinWord::Or, ValueTransform::None),
    rule("all not contains match phrase", "NOT MATCH_ANY", JoinWord::And, ValueTransform::None),
];

/// A condition operator: a row of the table, or a literal passed through
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    Known(&'static OperatorRule),
    Other(String),
}

impl Operator {
    /// Case-insensitive lookup after trimming
    pub fn parse(raw: &str) -> Self {
        let name = raw.trim();
        OPERATOR_RULES
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
            .map(Self::Known)
            .unwrap_or_else(|| Self::Other(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Known(rule) => rule.name,
            Self::Other(name) => name,
        }
    }

    pub fn token(&self) -> &str {
        match self {
            Self::Known(rule) => rule.token,
            Self::Other(name) => name,
        }
    }

    pub fn join(&self) -> JoinWord {
        match self {
            Self::Known(rule) => rule.join,
            Self::Other(_) => JoinWord::Or,
        }
    }

    pub fn transform(&self) -> ValueTransform {
        match self {
            Self::Known(rule) => rule.transform,
            Self::Other(_) => ValueTransform::None,
        }
    }

    pub fn ignores_value(&self) -> bool {
        matches!(self, Self::Known(rule) if rule.ignores_value)
    }
}

impl From<String> for Operator {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<Operator> for String {
    fn from(value: Operator) -> Self {
        value.as_str().to_string()
    }
}

impl Serialize for Operator {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Operator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

/// One filter condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Condition {
    pub field: String,
    #[schema(value_type = String, example = "contains")]
    pub operator: Operator,
    #[serde(default, deserialize_with = "deserialize_values")]
    #[schema(value_type = Vec<Scalar>)]
    pub value: Vec<Scalar>,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: &str, value: Vec<Scalar>) -> Self {
        Self {
            field: field.into(),
            operator: Operator::parse(operator),
            value,
        }
    }
}

/// Time range plus conditions, as sent by the search UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FilterSpec {
    /// Epoch seconds
    pub start_time: i64,
    /// Epoch seconds
    pub end_time: i64,
    #[serde(default, rename = "addition", alias = "conditions")]
    pub conditions: Vec<Condition>,
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}
