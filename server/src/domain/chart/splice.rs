//! SQL splicing
//!
//! Forces the FROM clause of a caller-supplied query onto a table resolved
//! by the server. The caller's projection and trailing clauses are kept;
//! whatever the caller wrote after FROM (up to the trailing clauses) is
//! discarded.

use std::sync::LazyLock;

use regex::Regex;

use super::ChartError;

static QUERY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?is)^\s*?(SELECT\s+?.+?)",
        r"(?:\bFROM\b.+?)?",
        r"(\bWHERE\b.*|\bGROUP\s+?BY\b.*|\bHAVING\b.*|\bORDER\s+?BY\b.*|\bINTO\s+?OUTFILE\b.*)?$",
    ))
    .expect("Invalid regex")
});

pub const MISSING_KEYWORD: &str = "missing SQL query keyword";

/// Rewrite `raw_query` to select from `table`.
///
/// Output is `<SELECT clause> FROM <table>` followed by the trailing
/// WHERE / GROUP BY / HAVING / ORDER BY / INTO OUTFILE clause when present.
/// A LIMIT is kept only when it follows one of those clauses.
pub fn splice(raw_query: &str, table: &str) -> Result<String, ChartError> {
    let captures = QUERY_RE
        .captures(raw_query)
        .ok_or_else(|| ChartError::SqlQuery(MISSING_KEYWORD.to_string()))?;

    // group 1 always participates when the pattern matches
    let select = captures.get(1).map_or("", |m| m.as_str()).trim_end();

    let mut sql = format!("{} FROM {}", select, table);
    if let Some(tail) = captures.get(2) {
        sql.push(' ');
        sql.push_str(tail.as_str());
    }
    Ok(sql)
}
