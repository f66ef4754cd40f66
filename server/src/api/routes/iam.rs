//! IAM meta endpoints
//!
//! Permission checks and apply payloads for the frontend, plus the list of
//! spaces the caller may act on.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::api::extractors::{ValidatedJson, ValidatedQuery};
use crate::api::types::{ApiError, validate_action_ids};
use crate::domain::iam::actions::VIEW_BUSINESS;
use crate::domain::iam::types::{ApplyData, Resource, Space};
use crate::domain::iam::{IamService, Permission, RequestIdentity};

// ============================================================================
// State
// ============================================================================

#[derive(Clone)]
pub struct IamApiState {
    pub iam: Arc<IamService>,
    pub spaces: Arc<Vec<Space>>,
}

// ============================================================================
// Request/Response DTOs
// ============================================================================

/// A resource named by type and id
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct ResourceRef {
    #[serde(rename = "type")]
    #[validate(length(min = 1, max = 64))]
    pub resource_type: String,
    #[validate(length(min = 1, max = 256))]
    pub id: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PermissionRequest {
    #[validate(custom(function = "validate_action_ids"))]
    pub action_ids: Vec<String>,
    #[serde(default)]
    #[validate(length(max = 200), nested)]
    pub resources: Vec<ResourceRef>,
}

impl PermissionRequest {
    fn action_ids(&self) -> Vec<&str> {
        self.action_ids.iter().map(String::as_str).collect()
    }

    fn resources(&self, permission: &Permission) -> Result<Vec<Resource>, ApiError> {
        Ok(permission.batch_make_resource(
            self.resources
                .iter()
                .map(|r| (r.resource_type.as_str(), r.id.as_str())),
        )?)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ActionDecision {
    pub action_id: String,
    pub is_allowed: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApplyDataResponse {
    pub permission: ApplyData,
    pub apply_url: String,
}

#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SpacesQuery {
    /// Action the spaces are filtered by, `view_business` by default
    #[validate(length(min = 1, max = 64))]
    pub action_id: Option<String>,
}

// ============================================================================
// Routes
// ============================================================================

pub fn routes(iam: Arc<IamService>, spaces: Arc<Vec<Space>>) -> Router<()> {
    let state = IamApiState { iam, spaces };
    Router::new()
        .route("/meta/check_allowed", post(check_allowed))
        .route("/meta/get_apply_data", post(get_apply_data))
        .route("/meta/batch_check", post(batch_check))
        .route("/spaces", get(list_spaces))
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Check each action against the given resources
#[utoipa::path(
    post,
    path = "/api/v1/iam/meta/check_allowed",
    tag = "iam",
    request_body = PermissionRequest,
    responses(
        (status = 200, description = "One decision per action", body = Vec<ActionDecision>),
        (status = 400, description = "Unknown action or resource type")
    )
)]
pub async fn check_allowed(
    State(state): State<IamApiState>,
    identity: RequestIdentity,
    ValidatedJson(req): ValidatedJson<PermissionRequest>,
) -> Result<Json<Vec<ActionDecision>>, ApiError> {
    let permission = state.iam.permission(&identity)?;
    let resources = req.resources(&permission)?;

    let mut decisions = Vec::with_capacity(req.action_ids.len());
    for action_id in &req.action_ids {
        let is_allowed = permission
            .is_allowed(action_id, resources.clone(), false)
            .await?;
        decisions.push(ActionDecision {
            action_id: action_id.clone(),
            is_allowed,
        });
    }
    Ok(Json(decisions))
}

/// Describe the permissions to apply for and where
#[utoipa::path(
    post,
    path = "/api/v1/iam/meta/get_apply_data",
    tag = "iam",
    request_body = PermissionRequest,
    responses(
        (status = 200, description = "Apply payload", body = ApplyDataResponse),
        (status = 400, description = "Unknown action or resource type")
    )
)]
pub async fn get_apply_data(
    State(state): State<IamApiState>,
    identity: RequestIdentity,
    ValidatedJson(req): ValidatedJson<PermissionRequest>,
) -> Result<Json<ApplyDataResponse>, ApiError> {
    let permission = state.iam.permission(&identity)?;
    let resources = req.resources(&permission)?;
    let (data, apply_url) = permission
        .get_apply_data(&req.action_ids(), &resources)
        .await?;
    Ok(Json(ApplyDataResponse {
        permission: data,
        apply_url,
    }))
}

/// Check every action against each resource on its own
#[utoipa::path(
    post,
    path = "/api/v1/iam/meta/batch_check",
    tag = "iam",
    request_body = PermissionRequest,
    responses(
        (status = 200, description = "Decisions keyed by resource id, then action id", body = HashMap<String, HashMap<String, bool>>),
        (status = 400, description = "Unknown action or resource type")
    )
)]
pub async fn batch_check(
    State(state): State<IamApiState>,
    identity: RequestIdentity,
    ValidatedJson(req): ValidatedJson<PermissionRequest>,
) -> Result<Json<HashMap<String, HashMap<String, bool>>>, ApiError> {
    let permission = state.iam.permission(&identity)?;
    let resource_lists: Vec<Vec<Resource>> = req
        .resources(&permission)?
        .into_iter()
        .map(|resource| vec![resource])
        .collect();
    let decisions = permission
        .batch_is_allowed(&req.action_ids(), &resource_lists)
        .await?;
    Ok(Json(decisions))
}

/// Spaces the caller may perform an action in
#[utoipa::path(
    get,
    path = "/api/v1/iam/spaces",
    tag = "iam",
    params(SpacesQuery),
    responses(
        (status = 200, description = "Permitted spaces", body = Vec<Space>),
        (status = 400, description = "Unknown action")
    )
)]
pub async fn list_spaces(
    State(state): State<IamApiState>,
    identity: RequestIdentity,
    ValidatedQuery(query): ValidatedQuery<SpacesQuery>,
) -> Result<Json<Vec<Space>>, ApiError> {
    let action_id = query.action_id.as_deref().unwrap_or(VIEW_BUSINESS.id);
    let permission = state.iam.permission(&identity)?;
    let spaces = permission
        .filter_space_list_by_action(action_id, state.spaces.as_ref().clone())
        .await?;
    Ok(Json(spaces))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{self, FakePolicyClient, FakeQueryApi};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn app(policy: FakePolicyClient) -> Router {
        let services = testing::services(FakeQueryApi::ok(), policy);
        Router::new().nest("/api/v1/iam", routes(services.iam, services.spaces))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-bk-username", "alice")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("x-bk-username", "alice")
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_check_allowed() {
        let response = app(FakePolicyClient::allow(&["search_log"]))
            .oneshot(post_json(
                "/api/v1/iam/meta/check_allowed",
                json!({
                    "action_ids": ["search_log", "manage_indices"],
                    "resources": [{"type": "indices", "id": "11"}]
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!([
                {"action_id": "search_log", "is_allowed": true},
                {"action_id": "manage_indices", "is_allowed": false}
            ])
        );
    }

    #[tokio::test]
    async fn test_check_allowed_unknown_action() {
        let response = app(FakePolicyClient::allow(&[]))
            .oneshot(post_json(
                "/api/v1/iam/meta/check_allowed",
                json!({"action_ids": ["fly"], "resources": []}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "ACTION_NOT_EXIST");
    }

    #[tokio::test]
    async fn test_check_allowed_requires_actions() {
        let response = app(FakePolicyClient::allow(&[]))
            .oneshot(post_json(
                "/api/v1/iam/meta/check_allowed",
                json!({"action_ids": [], "resources": []}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_check_allowed_without_identity_is_401() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/iam/meta/check_allowed")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({"action_ids": ["search_log"], "resources": []}).to_string(),
            ))
            .unwrap();
        let response = app(FakePolicyClient::allow(&[]))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_get_apply_data() {
        let response = app(FakePolicyClient::allow(&[]))
            .oneshot(post_json(
                "/api/v1/iam/meta/get_apply_data",
                json!({
                    "action_ids": ["search_log"],
                    "resources": [{"type": "indices", "id": "11"}]
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["apply_url"], testing::APPLY_URL);
        let action = &body["permission"]["actions"][0];
        assert_eq!(action["id"], "search_log");
        assert_eq!(
            action["related_resource_types"][0]["instances"][0][0]["name"],
            "prod api"
        );
    }

    #[tokio::test]
    async fn test_batch_check_demo_override() {
        let response = app(FakePolicyClient::allow(&[]))
            .oneshot(post_json(
                "/api/v1/iam/meta/batch_check",
                json!({
                    "action_ids": ["search_log"],
                    "resources": [
                        {"type": "indices", "id": "10"},
                        {"type": "indices", "id": "11"}
                    ]
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({
                "10": {"search_log": true},
                "11": {"search_log": false}
            })
        );
    }

    #[tokio::test]
    async fn test_list_spaces_keeps_demo() {
        let response = app(FakePolicyClient::allow(&[]))
            .oneshot(get("/api/v1/iam/spaces"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let ids: Vec<i64> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["bk_biz_id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_list_spaces_unknown_action() {
        let response = app(FakePolicyClient::allow(&[]))
            .oneshot(get("/api/v1/iam/spaces?action_id=fly"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
