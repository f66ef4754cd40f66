//! SQL text helpers shared by the chart query builders

use std::sync::LazyLock;

use regex::Regex;

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").expect("Invalid regex"));

/// Wrap a value in single quotes.
///
/// With `escape` unset the value is interpolated verbatim, which is what the
/// query collaborator historically received. With `escape` set, embedded single
/// quotes are doubled so the literal cannot terminate early.
pub fn quote_literal(value: &str, escape: bool) -> String {
    if escape {
        format!("'{}'", value.replace('\'', "''"))
    } else {
        format!("'{}'", value)
    }
}

/// Rewrite shell-style wildcards into SQL LIKE wildcards (`*` -> `%`, `?` -> `_`)
pub fn wildcard_to_like(value: &str) -> String {
    value.replace('*', "%").replace('?', "_")
}

/// Check that a column name is a plain (optionally dotted) identifier
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_literal_compat_keeps_quotes() {
        assert_eq!(quote_literal("it's", false), "'it's'");
    }

    #[test]
    fn test_quote_literal_escape_doubles_quotes() {
        assert_eq!(quote_literal("it's", true), "'it''s'");
    }

    #[test]
    fn test_quote_literal_empty() {
        assert_eq!(quote_literal("", false), "''");
    }

    #[test]
    fn test_wildcard_to_like() {
        assert_eq!(wildcard_to_like("err*or?"), "err%or_");
        assert_eq!(wildcard_to_like("plain"), "plain");
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("log"));
        assert!(is_identifier("__ext.container_name"));
        assert!(is_identifier("_id1"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("log; DROP TABLE t"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("a b"));
    }
}
