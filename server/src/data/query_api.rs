//! BigData query API client
//!
//! Executes SQL against the Doris storage behind the BigData query API and
//! returns the raw response envelope. Reshaping into chart results happens in
//! `domain::chart::result`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::DataError;
use super::{BkApiCredentials, bkapi_authorization};

const BACKEND: &str = "bkdata";

/// Column description returned by (or inferred for) a query
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FieldSchema {
    pub field_type: String,
    pub field_name: String,
    #[serde(default)]
    pub field_alias: String,
    #[serde(default)]
    pub field_index: usize,
    /// Extra keys the collaborator sends are passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of a successful query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryApiData {
    #[serde(default)]
    pub list: Vec<Map<String, Value>>,
    #[serde(default)]
    pub result_schema: Vec<FieldSchema>,
    #[serde(default, rename = "totalRecords")]
    pub total_records: u64,
    #[serde(default)]
    pub timetaken: f64,
    #[serde(default)]
    pub select_fields_order: Vec<String>,
}

/// Nested error detail of a failed query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryApiErrors {
    #[serde(default)]
    pub error: Option<String>,
}

/// Raw response envelope of the query API
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryApiResponse {
    #[serde(default)]
    pub result: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default)]
    pub errors: Option<QueryApiErrors>,
    #[serde(default)]
    pub data: Option<QueryApiData>,
}

/// Port for executing SQL against the log storage
#[async_trait]
pub trait QueryApi: Send + Sync {
    /// Run a query and return the raw envelope. A `result: false` envelope is
    /// returned as `Ok`; only transport and decoding failures are errors.
    async fn query(&self, sql: &str) -> Result<QueryApiResponse, DataError>;
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    sql: &'a str,
    bk_app_code: &'a str,
    prefer_storage: &'a str,
}

/// HTTP implementation of [`QueryApi`]
pub struct HttpQueryApi {
    http: reqwest::Client,
    api_url: String,
    credentials: BkApiCredentials,
    timeout_secs: u64,
}

impl HttpQueryApi {
    pub fn new(
        api_url: impl Into<String>,
        credentials: BkApiCredentials,
        timeout_secs: u64,
    ) -> Result<Self, DataError> {
        let api_url = api_url.into();
        if api_url.trim().is_empty() {
            return Err(DataError::Config("query.api_url must not be empty".into()));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("logquery/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_url,
            credentials,
            timeout_secs,
        })
    }
}

#[async_trait]
impl QueryApi for HttpQueryApi {
    async fn query(&self, sql: &str) -> Result<QueryApiResponse, DataError> {
        tracing::debug!(sql = %sql, "Executing query");

        let body = QueryRequest {
            sql,
            bk_app_code: &self.credentials.app_code,
            prefer_storage: "doris",
        };

        let resp = self
            .http
            .post(&self.api_url)
            .header("X-Bkapi-Authorization", bkapi_authorization(&self.credentials))
            .json(&body)
            .send()
            .await
            .map_err(|e| DataError::from_reqwest(BACKEND, self.timeout_secs, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DataError::bad_status(BACKEND, status.as_u16()));
        }

        resp.json::<QueryApiResponse>()
            .await
            .map_err(|e| DataError::invalid_response(BACKEND, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::secret::AppSecret;

    #[test]
    fn test_parse_success_envelope() {
        let json = r#"{
            "result": true,
            "message": "ok",
            "data": {
                "list": [{"log": "hello", "count": 3}],
                "totalRecords": 1,
                "timetaken": 0.25,
                "select_fields_order": ["log", "count"]
            }
        }"#;
        let resp: QueryApiResponse = serde_json::from_str(json).unwrap();
        assert!(resp.result);
        let data = resp.data.unwrap();
        assert_eq!(data.total_records, 1);
        assert_eq!(data.timetaken, 0.25);
        assert!(data.result_schema.is_empty());
        assert_eq!(data.select_fields_order, vec!["log", "count"]);
    }

    #[test]
    fn test_parse_failure_envelope() {
        let json = r#"{
            "result": false,
            "message": "query failed",
            "code": "1532001",
            "errors": {"error": "syntax error at line 1"},
            "data": null
        }"#;
        let resp: QueryApiResponse = serde_json::from_str(json).unwrap();
        assert!(!resp.result);
        assert!(resp.data.is_none());
        assert_eq!(
            resp.errors.unwrap().error.as_deref(),
            Some("syntax error at line 1")
        );
    }

    #[test]
    fn test_parse_failure_with_null_message() {
        let json = r#"{"result": false, "message": null, "errors": {"error": "table not found"}}"#;
        let resp: QueryApiResponse = serde_json::from_str(json).unwrap();
        assert!(!resp.result);
        assert!(resp.message.is_none());
    }

    #[test]
    fn test_field_schema_passes_extra_keys() {
        let json = r#"{"field_type": "long", "field_name": "n", "is_time": false}"#;
        let schema: FieldSchema = serde_json::from_str(json).unwrap();
        assert_eq!(schema.field_alias, "");
        assert_eq!(schema.extra.get("is_time"), Some(&Value::Bool(false)));
        let back = serde_json::to_value(&schema).unwrap();
        assert_eq!(back["is_time"], Value::Bool(false));
    }

    #[test]
    fn test_request_body_shape() {
        let body = QueryRequest {
            sql: "SELECT 1",
            bk_app_code: "bk_log_search",
            prefer_storage: "doris",
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["sql"], "SELECT 1");
        assert_eq!(value["prefer_storage"], "doris");
    }

    #[test]
    fn test_empty_url_rejected() {
        let creds = BkApiCredentials::new("app", AppSecret::new("secret"));
        let result = HttpQueryApi::new("  ", creds, 30);
        assert!(matches!(result, Err(DataError::Config(_))));
    }
}
