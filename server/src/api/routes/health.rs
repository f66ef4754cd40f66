//! Health check endpoint

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::data::IndexSetRegistry;

#[derive(Clone)]
pub struct HealthApiState {
    pub index_sets: Arc<IndexSetRegistry>,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Index sets loaded from config
    pub index_sets: usize,
}

pub fn routes(index_sets: Arc<IndexSetRegistry>) -> Router<()> {
    Router::new()
        .route("/api/v1/health", get(health))
        .with_state(HealthApiState { index_sets })
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<HealthApiState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            index_sets: state.index_sets.len(),
        }),
    )
}
