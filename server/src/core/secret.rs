//! Secret values loaded from config
//!
//! API gateway credentials are read from the config file or environment and
//! must never appear in logs, so the wrapper redacts itself in `Debug`.

use serde::{Deserialize, Serialize};

/// A secret string value
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppSecret(String);

impl std::fmt::Debug for AppSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            f.write_str("AppSecret(\"\")")
        } else {
            f.write_str("AppSecret([REDACTED])")
        }
    }
}

impl AppSecret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw value. Only call this when building outbound requests.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for AppSecret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_debug_redacts_value() {
        let secret = AppSecret::new("super-secret-value");
        let debug = format!("{:?}", secret);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret-value"));
    }

    #[test]
    fn test_secret_expose() {
        let secret = AppSecret::from("abc".to_string());
        assert_eq!(secret.expose(), "abc");
        assert!(!secret.is_empty());
        assert!(AppSecret::default().is_empty());
    }

    #[test]
    fn test_secret_serde_transparent() {
        let secret: AppSecret = serde_json::from_str(r#""xyz""#).unwrap();
        assert_eq!(secret.expose(), "xyz");
    }
}
