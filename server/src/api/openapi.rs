//! OpenAPI specification and Swagger UI

use axum::http::header;
use axum::response::{Html, IntoResponse, Json};
use utoipa::OpenApi;

use crate::api::routes::{chart, health, iam};
use crate::domain::chart::{ChartData, Condition, Scalar};
use crate::domain::iam::types::{
    ApplyAction, ApplyData, ApplyInstance, ApplyResourceType, Resource, Space,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "LogQuery API",
        version = env!("CARGO_PKG_VERSION"),
        description = "Log chart queries and IAM permission checks"
    ),
    tags(
        (name = "health", description = "Health check endpoint"),
        (name = "chart", description = "Log chart queries"),
        (name = "iam", description = "Permission checks and apply payloads")
    ),
    paths(
        health::health,
        chart::chart_data,
        chart::generate_sql,
        iam::check_allowed,
        iam::get_apply_data,
        iam::batch_check,
        iam::list_spaces,
    ),
    components(schemas(
        health::HealthResponse,
        chart::ChartRequest,
        chart::GenerateSqlRequest,
        chart::GenerateSqlResponse,
        ChartData,
        Condition,
        Scalar,
        iam::ResourceRef,
        iam::PermissionRequest,
        iam::ActionDecision,
        iam::ApplyDataResponse,
        Resource,
        Space,
        ApplyData,
        ApplyAction,
        ApplyResourceType,
        ApplyInstance,
    ))
)]
pub struct ApiDoc;

/// Serve OpenAPI JSON specification
pub async fn openapi_json() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        Json(ApiDoc::openapi()),
    )
}

/// Serve Swagger UI from CDN
pub async fn swagger_ui_html() -> Html<&'static str> {
    Html(SWAGGER_UI_HTML)
}

const SWAGGER_UI_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>LogQuery API Documentation</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
    <style>
        html { box-sizing: border-box; overflow-y: scroll; }
        *, *:before, *:after { box-sizing: inherit; }
        body { margin: 0; background: #fafafa; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-standalone-preset.js"></script>
    <script>
        window.onload = () => {
            window.ui = SwaggerUIBundle({
                url: "/api/openapi.json",
                dom_id: '#swagger-ui',
                presets: [
                    SwaggerUIBundle.presets.apis,
                    SwaggerUIStandalonePreset
                ],
                layout: "StandaloneLayout",
                deepLinking: true,
                showExtensions: true,
                showCommonExtensions: true
            });
        };
    </script>
</body>
</html>"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_routes() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let paths = doc["paths"].as_object().unwrap();
        assert!(paths.contains_key("/api/v1/search/index_set/{index_set_id}/chart"));
        assert!(paths.contains_key("/api/v1/iam/meta/batch_check"));
        assert!(paths.contains_key("/api/v1/iam/spaces"));
        assert_eq!(doc["info"]["title"], "LogQuery API");
    }
}
