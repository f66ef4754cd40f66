//! IAM policy API client
//!
//! Talks to the IAM service through the API gateway. Every call is scoped to
//! a tenant via the `X-Bk-Tenant-Id` header and authenticated with the app
//! credentials in `X-Bkapi-Authorization`. Responses use the
//! `{code, message, data}` envelope where a non-zero `code` is an error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::DataError;
use super::{BkApiCredentials, bkapi_authorization};
use crate::domain::iam::policy::{ObjectSet, PolicyExpression};
use crate::domain::iam::types::{
    Application, AuthRequest, CreatorGrant, MultiActionRequest, Resource,
};

const BACKEND: &str = "iam";

/// Per-resource, per-action decisions keyed by resource id then action id
pub type BatchDecisions = HashMap<String, HashMap<String, bool>>;

/// Port to the IAM policy-decision service
#[async_trait]
pub trait PolicyClient: Send + Sync {
    async fn is_allowed(&self, tenant_id: &str, request: &AuthRequest) -> Result<bool, DataError>;

    /// Evaluate every action in `request` against each resource list.
    /// Results are keyed by the id of the first resource of each list.
    async fn batch_resource_multi_actions_allowed(
        &self,
        tenant_id: &str,
        request: &MultiActionRequest,
        resources: &[Vec<Resource>],
    ) -> Result<BatchDecisions, DataError>;

    /// Fetch the policy expression for an action; `None` means no policy
    async fn policy_query(
        &self,
        tenant_id: &str,
        request: &AuthRequest,
    ) -> Result<Option<PolicyExpression>, DataError>;

    async fn get_apply_url(
        &self,
        tenant_id: &str,
        application: &Application,
    ) -> Result<String, DataError>;

    async fn grant_resource_creator_actions(
        &self,
        tenant_id: &str,
        grant: &CreatorGrant,
    ) -> Result<Value, DataError>;

    async fn query_system(&self, tenant_id: &str, system_id: &str) -> Result<Value, DataError>;
}

#[derive(Deserialize)]
struct IamEnvelope<T> {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Deserialize)]
struct AuthDecision {
    #[serde(default)]
    allowed: bool,
}

#[derive(Deserialize)]
struct ApplyUrl {
    url: String,
}

#[derive(Deserialize)]
struct ActionPolicy {
    action: ActionId,
    #[serde(default)]
    condition: Value,
}

#[derive(Deserialize)]
struct ActionId {
    id: String,
}

/// Parse a policy payload; an absent or empty object means no policy
fn parse_policy(data: Value) -> Result<Option<PolicyExpression>, DataError> {
    match &data {
        Value::Null => Ok(None),
        Value::Object(map) if map.is_empty() => Ok(None),
        _ => serde_json::from_value(data)
            .map(Some)
            .map_err(|e| DataError::invalid_response(BACKEND, format!("bad policy: {}", e))),
    }
}

/// HTTP implementation of [`PolicyClient`]
pub struct HttpIamClient {
    http: reqwest::Client,
    base_url: String,
    credentials: BkApiCredentials,
    timeout_secs: u64,
}

impl HttpIamClient {
    pub fn new(
        base_url: impl Into<String>,
        credentials: BkApiCredentials,
        timeout_secs: u64,
    ) -> Result<Self, DataError> {
        let base_url = base_url.into();
        if base_url.trim().is_empty() {
            return Err(DataError::Config("iam.api_url must not be empty".into()));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("logquery/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            timeout_secs,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        tenant_id: &str,
    ) -> Result<Option<T>, DataError> {
        let resp = builder
            .header("X-Bkapi-Authorization", bkapi_authorization(&self.credentials))
            .header("X-Bk-Tenant-Id", tenant_id)
            .send()
            .await
            .map_err(|e| DataError::from_reqwest(BACKEND, self.timeout_secs, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DataError::bad_status(BACKEND, status.as_u16()));
        }

        let envelope = resp
            .json::<IamEnvelope<T>>()
            .await
            .map_err(|e| DataError::invalid_response(BACKEND, e.to_string()))?;

        if envelope.code != 0 {
            return Err(DataError::api(BACKEND, envelope.code, envelope.message));
        }
        Ok(envelope.data)
    }

    async fn post<B: serde::Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        tenant_id: &str,
        body: &B,
    ) -> Result<Option<T>, DataError> {
        tracing::trace!(path, tenant_id, "IAM request");
        self.send(self.http.post(self.url(path)).json(body), tenant_id)
            .await
    }
}

#[async_trait]
impl PolicyClient for HttpIamClient {
    async fn is_allowed(&self, tenant_id: &str, request: &AuthRequest) -> Result<bool, DataError> {
        let decision: Option<AuthDecision> = self
            .post("/api/v1/policy/auth/", tenant_id, request)
            .await?;
        Ok(decision.is_some_and(|d| d.allowed))
    }

    async fn batch_resource_multi_actions_allowed(
        &self,
        tenant_id: &str,
        request: &MultiActionRequest,
        resources: &[Vec<Resource>],
    ) -> Result<BatchDecisions, DataError> {
        let policies: Option<Vec<ActionPolicy>> = self
            .post("/api/v1/policy/query_by_actions/", tenant_id, request)
            .await?;

        let mut expressions: HashMap<String, Option<PolicyExpression>> = HashMap::new();
        for policy in policies.unwrap_or_default() {
            expressions.insert(policy.action.id, parse_policy(policy.condition)?);
        }

        let mut result = BatchDecisions::new();
        for resource_list in resources {
            let Some(first) = resource_list.first() else {
                continue;
            };
            let objects = ObjectSet::from_resources(resource_list);
            let decisions = request
                .actions
                .iter()
                .map(|action| {
                    let allowed = expressions
                        .get(&action.id)
                        .and_then(Option::as_ref)
                        .is_some_and(|expr| expr.eval(&objects));
                    (action.id.clone(), allowed)
                })
                .collect();
            result.insert(first.id.clone(), decisions);
        }
        Ok(result)
    }

    async fn policy_query(
        &self,
        tenant_id: &str,
        request: &AuthRequest,
    ) -> Result<Option<PolicyExpression>, DataError> {
        let data: Option<Value> = self
            .post("/api/v1/policy/query/", tenant_id, request)
            .await?;
        parse_policy(data.unwrap_or(Value::Null))
    }

    async fn get_apply_url(
        &self,
        tenant_id: &str,
        application: &Application,
    ) -> Result<String, DataError> {
        let data: Option<ApplyUrl> = self
            .post("/api/v1/open/application/", tenant_id, application)
            .await?;
        data.map(|d| d.url)
            .ok_or_else(|| DataError::invalid_response(BACKEND, "apply url missing"))
    }

    async fn grant_resource_creator_actions(
        &self,
        tenant_id: &str,
        grant: &CreatorGrant,
    ) -> Result<Value, DataError> {
        let data: Option<Value> = self
            .post(
                "/api/v1/open/authorization/resource_creator_action/",
                tenant_id,
                grant,
            )
            .await?;
        Ok(data.unwrap_or(Value::Null))
    }

    async fn query_system(&self, tenant_id: &str, system_id: &str) -> Result<Value, DataError> {
        let path = format!("/api/v1/model/systems/{}/query", system_id);
        let data: Option<Value> = self
            .send(self.http.get(self.url(&path)), tenant_id)
            .await?;
        Ok(data.unwrap_or(Value::Null))
    }
}

/// Decision cache in front of another [`PolicyClient`].
///
/// Only single-action decisions are cached; everything else passes through.
pub struct CachedPolicyClient {
    inner: Arc<dyn PolicyClient>,
    decisions: Cache<String, bool>,
}

impl CachedPolicyClient {
    pub fn new(inner: Arc<dyn PolicyClient>, ttl: Duration, max_entries: u64) -> Self {
        let decisions = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();
        Self { inner, decisions }
    }

    fn cache_key(tenant_id: &str, request: &AuthRequest) -> Option<String> {
        serde_json::to_string(request)
            .ok()
            .map(|body| format!("{}\u{1f}{}", tenant_id, body))
    }
}

#[async_trait]
impl PolicyClient for CachedPolicyClient {
    async fn is_allowed(&self, tenant_id: &str, request: &AuthRequest) -> Result<bool, DataError> {
        let key = Self::cache_key(tenant_id, request);
        if let Some(ref key) = key
            && let Some(allowed) = self.decisions.get(key).await
        {
            tracing::trace!(action = %request.action.id, "IAM decision cache hit");
            return Ok(allowed);
        }

        let allowed = self.inner.is_allowed(tenant_id, request).await?;
        if let Some(key) = key {
            self.decisions.insert(key, allowed).await;
        }
        Ok(allowed)
    }

    async fn batch_resource_multi_actions_allowed(
        &self,
        tenant_id: &str,
        request: &MultiActionRequest,
        resources: &[Vec<Resource>],
    ) -> Result<BatchDecisions, DataError> {
        self.inner
            .batch_resource_multi_actions_allowed(tenant_id, request, resources)
            .await
    }

    async fn policy_query(
        &self,
        tenant_id: &str,
        request: &AuthRequest,
    ) -> Result<Option<PolicyExpression>, DataError> {
        self.inner.policy_query(tenant_id, request).await
    }

    async fn get_apply_url(
        &self,
        tenant_id: &str,
        application: &Application,
    ) -> Result<String, DataError> {
        self.inner.get_apply_url(tenant_id, application).await
    }

    async fn grant_resource_creator_actions(
        &self,
        tenant_id: &str,
        grant: &CreatorGrant,
    ) -> Result<Value, DataError> {
        self.inner
            .grant_resource_creator_actions(tenant_id, grant)
            .await
    }

    async fn query_system(&self, tenant_id: &str, system_id: &str) -> Result<Value, DataError> {
        self.inner.query_system(tenant_id, system_id).await
    }
}
