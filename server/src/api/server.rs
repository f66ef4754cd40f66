//! API server initialization

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use super::middleware::{self, AllowedOrigins};
use super::openapi::{openapi_json, swagger_ui_html};
use super::routes::{chart, health, iam};
use crate::app::AppServices;
use crate::core::CoreApp;
use crate::core::constants::{DEFAULT_BODY_LIMIT, SHUTDOWN_TIMEOUT_SECS};

pub struct ApiServer {
    app: CoreApp,
    allowed_origins: AllowedOrigins,
}

impl ApiServer {
    pub fn new(app: CoreApp) -> Self {
        let allowed_origins = AllowedOrigins::new(&app.config.server.host, app.config.server.port);
        Self {
            app,
            allowed_origins,
        }
    }

    /// Serve until shutdown is triggered. Returns CoreApp for cleanup.
    pub async fn start(self) -> Result<CoreApp> {
        let Self {
            app,
            allowed_origins,
        } = self;

        let shutdown = app.shutdown.clone();
        let addr = SocketAddr::new(app.config.server.host.parse()?, app.config.server.port);
        let router = router(&app.services, &allowed_origins);

        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, "API server listening");

        let server = axum::serve(listener, router).with_graceful_shutdown(shutdown.wait());
        let mut handle = tokio::spawn(async move { server.await });

        tokio::select! {
            result = &mut handle => result??,
            _ = shutdown.wait() => {
                // In-flight requests get a bounded grace period
                let grace = Duration::from_secs(SHUTDOWN_TIMEOUT_SECS);
                match tokio::time::timeout(grace, &mut handle).await {
                    Ok(result) => result??,
                    Err(_) => {
                        tracing::warn!(
                            timeout_secs = SHUTDOWN_TIMEOUT_SECS,
                            "Graceful shutdown timed out, dropping open connections"
                        );
                        handle.abort();
                    }
                }
            }
        }

        Ok(app)
    }
}

/// Build the full HTTP router over the application services
pub fn router(services: &AppServices, allowed_origins: &AllowedOrigins) -> Router {
    let chart_routes = chart::routes(services.chart.clone(), services.iam.clone());
    let iam_routes = iam::routes(services.iam.clone(), services.spaces.clone());

    Router::new()
        .merge(health::routes(services.index_sets.clone()))
        .route("/api/openapi.json", get(openapi_json))
        .route("/api/docs", get(swagger_ui_html))
        .route("/api/docs/", get(swagger_ui_html))
        .nest("/api/v1/search/index_set", chart_routes)
        .nest("/api/v1/iam", iam_routes)
        .fallback(middleware::handle_404)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(middleware::cors(allowed_origins))
        .layer(DefaultBodyLimit::max(DEFAULT_BODY_LIMIT))
}
