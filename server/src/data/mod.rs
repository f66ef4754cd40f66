//! Data access layer
//!
//! Clients for the external collaborators this service depends on:
//! - `query_api` - BigData query API (SQL execution against Doris)
//! - `iam_client` - IAM policy-decision API behind the API gateway
//! - `index_set` - In-memory index set registry built from config
//! - `error` - Unified error type for all collaborators

pub mod error;
pub mod iam_client;
pub mod index_set;
pub mod query_api;

pub use error::DataError;
pub use iam_client::{CachedPolicyClient, HttpIamClient, PolicyClient};
pub use index_set::{IndexSet, IndexSetRegistry};
pub use query_api::{FieldSchema, HttpQueryApi, QueryApi, QueryApiResponse};

use crate::core::secret::AppSecret;

/// App credentials presented to the API gateway
#[derive(Debug, Clone)]
pub struct BkApiCredentials {
    pub app_code: String,
    pub app_secret: AppSecret,
}

impl BkApiCredentials {
    pub fn new(app_code: impl Into<String>, app_secret: AppSecret) -> Self {
        Self {
            app_code: app_code.into(),
            app_secret,
        }
    }
}

/// Value of the `X-Bkapi-Authorization` header
pub(crate) fn bkapi_authorization(credentials: &BkApiCredentials) -> String {
    serde_json::json!({
        "bk_app_code": credentials.app_code,
        "bk_app_secret": credentials.app_secret.expose(),
    })
    .to_string()
}
