//! Filter to SQL predicate synthesis
//!
//! Turns a [`FilterSpec`] into a boolean SQL expression: a millisecond time
//! range on the time column, then one ` AND ` fragment per non-empty
//! condition in input order. Output is deterministic for a given input.

use super::condition::{Condition, FilterSpec, JoinWord, Scalar, ValueTransform};
use crate::utils::sql::{quote_literal, wildcard_to_like};

pub const DEFAULT_TIME_FIELD: &str = "dtEventTimeStamp";
pub const DEFAULT_SQL_PREFIX: &str = "SELECT thedate, dtEventTimeStamp, iterationIndex, log, time";
pub const DEFAULT_SQL_SUFFIX: &str = "LIMIT 10000";

/// Knobs for SQL generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlOptions {
    pub time_field: String,
    pub sql_prefix: String,
    pub sql_suffix: String,
    /// Double embedded single quotes in string literals
    pub escape_literals: bool,
}

impl Default for SqlOptions {
    fn default() -> Self {
        Self {
            time_field: DEFAULT_TIME_FIELD.to_string(),
            sql_prefix: DEFAULT_SQL_PREFIX.to_string(),
            sql_suffix: DEFAULT_SQL_SUFFIX.to_string(),
            escape_literals: false,
        }
    }
}

/// Build the WHERE-clause body for a filter
pub fn synthesize(spec: &FilterSpec, options: &SqlOptions) -> String {
    let start_ms = spec.start_time.saturating_mul(1000);
    let end_ms = spec.end_time.saturating_mul(1000);
    let field = &options.time_field;

    let mut sql = format!(
        "{} >= {} AND {} <= {}",
        field, start_ms, field, end_ms
    );

    for condition in &spec.conditions {
        if let Some(fragment) = condition_predicate(condition, options.escape_literals) {
            sql.push_str(" AND ");
            sql.push_str(&fragment);
        }
    }
    sql
}

/// Predicate for a single condition; `None` when the value is empty
pub fn condition_predicate(condition: &Condition, escape_literals: bool) -> Option<String> {
    let field = &condition.field;
    let operator = &condition.operator;

    if operator.ignores_value() {
        return Some(format!("{} {}", field, operator.token()));
    }
    if condition.value.is_empty() {
        return None;
    }

    let transform = operator.transform();
    let fragments: Vec<String> = condition
        .value
        .iter()
        .map(|value| {
            format!(
                "{} {} {}",
                field,
                operator.token(),
                render_value(field, value, transform, escape_literals)
            )
        })
        .collect();

    let join = operator.join();
    let joined = fragments.join(&format!(" {} ", join.as_sql()));

    if join == JoinWord::Or && fragments.len() > 1 {
        Some(format!("({})", joined))
    } else {
        Some(joined)
    }
}

/// Full statement used to seed the SQL editor and by UI chart mode
pub fn generate_sql(spec: &FilterSpec, options: &SqlOptions) -> String {
    let sql = format!(
        "{} WHERE {} {}",
        options.sql_prefix,
        synthesize(spec, options),
        options.sql_suffix
    );
    sql.trim().to_string()
}

fn render_value(field: &str, value: &Scalar, transform: ValueTransform, escape: bool) -> String {
    let text = match (transform, value) {
        (ValueTransform::None, Scalar::Int(i)) => return i.to_string(),
        (ValueTransform::None, Scalar::Bool(b)) => {
            return if *b { "TRUE" } else { "FALSE" }.to_string();
        }
        (ValueTransform::None, other) => other.to_string(),
        (ValueTransform::Wildcard, other) => wildcard_to_like(&other.to_string()),
        (ValueTransform::Wrap, other) => format!("%{}%", other),
    };

    if !escape && text.contains('\'') {
        tracing::warn!(
            field = %field,
            "Filter value contains a single quote and is interpolated unescaped"
        );
    }
    quote_literal(&text, escape)
}
