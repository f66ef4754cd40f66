//! Log chart endpoints

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::api::extractors::{IndexSetPath, ValidatedJson};
use crate::api::types::{ApiError, validate_conditions};
use crate::domain::chart::{ChartData, ChartParams, ChartService, Condition, FilterSpec};
use crate::domain::iam::actions::{INDICES, SEARCH_LOG};
use crate::domain::iam::{IamService, RequestIdentity};

// ============================================================================
// State
// ============================================================================

#[derive(Clone)]
pub struct ChartApiState {
    pub chart: Arc<ChartService>,
    pub iam: Arc<IamService>,
}

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChartRequest {
    /// `ui` to chart the search filter, `sql` to run the caller's statement
    #[validate(length(min = 1, max = 32))]
    pub query_mode: String,
    #[validate(length(max = 65536))]
    pub sql: Option<String>,
    /// Epoch seconds, required in `ui` mode
    pub start_time: Option<i64>,
    /// Epoch seconds, required in `ui` mode
    pub end_time: Option<i64>,
    #[serde(default)]
    #[validate(custom(function = "validate_conditions"))]
    pub addition: Vec<Condition>,
}

impl From<ChartRequest> for ChartParams {
    fn from(req: ChartRequest) -> Self {
        Self {
            query_mode: req.query_mode,
            sql: req.sql,
            start_time: req.start_time,
            end_time: req.end_time,
            addition: req.addition,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct GenerateSqlRequest {
    pub start_time: i64,
    pub end_time: i64,
    #[serde(default, alias = "conditions")]
    #[validate(custom(function = "validate_conditions"))]
    pub addition: Vec<Condition>,
}

impl From<GenerateSqlRequest> for FilterSpec {
    fn from(req: GenerateSqlRequest) -> Self {
        Self {
            start_time: req.start_time,
            end_time: req.end_time,
            conditions: req.addition,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GenerateSqlResponse {
    pub sql: String,
}

// ============================================================================
// Routes
// ============================================================================

pub fn routes(chart: Arc<ChartService>, iam: Arc<IamService>) -> Router<()> {
    let state = ChartApiState { chart, iam };
    Router::new()
        .route("/{index_set_id}/chart", post(chart_data))
        .route("/{index_set_id}/chart/generate_sql", post(generate_sql))
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Run a chart query against the index set's Doris table
#[utoipa::path(
    post,
    path = "/api/v1/search/index_set/{index_set_id}/chart",
    tag = "chart",
    params(("index_set_id" = u64, Path, description = "Index set ID")),
    request_body = ChartRequest,
    responses(
        (status = 200, description = "Query result", body = ChartData),
        (status = 400, description = "Invalid request or failed query"),
        (status = 403, description = "Missing search_log permission"),
        (status = 404, description = "Index set not found"),
        (status = 501, description = "Unknown query mode")
    )
)]
pub async fn chart_data(
    State(state): State<ChartApiState>,
    path: IndexSetPath,
    identity: RequestIdentity,
    ValidatedJson(req): ValidatedJson<ChartRequest>,
) -> Result<Json<ChartData>, ApiError> {
    let index_set_id = path.index_set_id;
    state.chart.index_set(index_set_id)?;

    let permission = state.iam.permission(&identity)?;
    let resource = permission.make_resource(INDICES.id, &index_set_id.to_string())?;
    permission
        .is_allowed(SEARCH_LOG.id, vec![resource], true)
        .await?;

    let data = state
        .chart
        .chart_data(index_set_id, &ChartParams::from(req))
        .await?;
    Ok(Json(data))
}

/// Generate the SQL statement that seeds the editor for a search filter
#[utoipa::path(
    post,
    path = "/api/v1/search/index_set/{index_set_id}/chart/generate_sql",
    tag = "chart",
    params(("index_set_id" = u64, Path, description = "Index set ID")),
    request_body = GenerateSqlRequest,
    responses(
        (status = 200, description = "Generated SQL", body = GenerateSqlResponse),
        (status = 404, description = "Index set not found")
    )
)]
pub async fn generate_sql(
    State(state): State<ChartApiState>,
    path: IndexSetPath,
    ValidatedJson(req): ValidatedJson<GenerateSqlRequest>,
) -> Result<Json<GenerateSqlResponse>, ApiError> {
    state.chart.index_set(path.index_set_id)?;
    let sql = state.chart.generate_sql(&FilterSpec::from(req));
    Ok(Json(GenerateSqlResponse { sql }))
}
