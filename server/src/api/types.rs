//! Shared API types
//!
//! Error responses and the validators shared by request DTOs.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use validator::ValidationError;

use crate::data::DataError;
use crate::domain::chart::{ChartError, Condition};
use crate::domain::iam::IamError;
use crate::utils::sql::is_identifier;

/// Maximum number of actions in one permission request
pub const MAX_ACTIONS: usize = 50;
/// Maximum conditions in one chart filter
pub const MAX_CONDITIONS: usize = 100;

/// Validator function for column names used in generated SQL
pub fn validate_field_name(field: &str) -> Result<(), ValidationError> {
    if !is_identifier(field) {
        return Err(ValidationError::new("field_name").with_message(
            format!(
                "Invalid field name '{}': must match [A-Za-z_][A-Za-z0-9_.]*",
                field
            )
            .into(),
        ));
    }
    Ok(())
}

/// Validator function for filter condition lists
pub fn validate_conditions<T: AsRef<[Condition]>>(conditions: T) -> Result<(), ValidationError> {
    let conditions = conditions.as_ref();
    if conditions.len() > MAX_CONDITIONS {
        return Err(ValidationError::new("conditions_too_many").with_message(
            format!("Cannot filter on more than {} conditions", MAX_CONDITIONS).into(),
        ));
    }
    for condition in conditions {
        validate_field_name(&condition.field)?;
    }
    Ok(())
}

/// Validator function for action id lists
pub fn validate_action_ids<T: AsRef<[String]>>(ids: T) -> Result<(), ValidationError> {
    let ids = ids.as_ref();
    if ids.is_empty() {
        return Err(ValidationError::new("action_ids_empty")
            .with_message("action_ids cannot be empty".into()));
    }
    if ids.len() > MAX_ACTIONS {
        return Err(ValidationError::new("action_ids_too_many").with_message(
            format!("Cannot check more than {} actions at once", MAX_ACTIONS).into(),
        ));
    }
    if ids.iter().any(|id| id.trim().is_empty()) {
        return Err(ValidationError::new("action_id_blank")
            .with_message("action_ids cannot contain blank ids".into()));
    }
    Ok(())
}

/// Standard API error response
#[derive(Debug)]
pub enum ApiError {
    BadRequest { code: String, message: String },
    NotFound { code: String, message: String },
    Unauthorized { code: String, message: String },
    Forbidden {
        code: String,
        message: String,
        data: Option<Value>,
    },
    NotImplemented { message: String },
    ServiceUnavailable { message: String },
    Internal { message: String },
}

impl ApiError {
    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFound {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn unauthorized(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unauthorized {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
        }
    }

    pub fn from_data(e: DataError) -> Self {
        match e {
            DataError::Http(_) | DataError::Timeout { .. } | DataError::BadStatus { .. } => {
                tracing::warn!(error = %e, backend = e.backend(), "Upstream unavailable");
                Self::service_unavailable(format!("{} is unavailable", e.backend()))
            }
            _ => {
                tracing::error!(error = %e, "Data error");
                Self::internal("Upstream service error")
            }
        }
    }

    pub fn from_chart(e: ChartError) -> Self {
        match e {
            ChartError::IndexSetNotFound(_) => Self::not_found("INDEX_SET_NOT_FOUND", e.to_string()),
            ChartError::DorisUnsupported(_) => {
                Self::bad_request("DORIS_UNSUPPORTED", e.to_string())
            }
            ChartError::SqlQuery(message) => Self::bad_request("SQL_QUERY_ERROR", message),
            ChartError::NotImplemented(_) => Self::NotImplemented {
                message: e.to_string(),
            },
            ChartError::InvalidParams(_) => Self::bad_request("INVALID_PARAMS", e.to_string()),
            ChartError::Data(e) => Self::from_data(e),
        }
    }

    pub fn from_iam(e: IamError) -> Self {
        match e {
            IamError::ActionNotExist(_) => Self::bad_request("ACTION_NOT_EXIST", e.to_string()),
            IamError::ResourceTypeNotExist(_) => {
                Self::bad_request("RESOURCE_TYPE_NOT_EXIST", e.to_string())
            }
            IamError::PermissionDenied {
                action_name,
                apply_url,
                permission,
            } => Self::Forbidden {
                code: "PERMISSION_DENIED".to_string(),
                message: format!("You do not have permission to {}", action_name),
                data: Some(serde_json::json!({
                    "apply_url": apply_url,
                    "permission": permission,
                })),
            },
            IamError::GetSystemInfo(_) => {
                tracing::error!(error = %e, "IAM system info unavailable");
                Self::service_unavailable(e.to_string())
            }
            IamError::NoPrincipal => Self::unauthorized("UNAUTHORIZED", e.to_string()),
            IamError::Client(e) => Self::from_data(e),
        }
    }
}

impl From<ChartError> for ApiError {
    fn from(e: ChartError) -> Self {
        Self::from_chart(e)
    }
}

impl From<IamError> for ApiError {
    fn from(e: IamError) -> Self {
        Self::from_iam(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, code, message, data) = match self {
            Self::BadRequest { code, message } => {
                (StatusCode::BAD_REQUEST, "bad_request", code, message, None)
            }
            Self::NotFound { code, message } => {
                (StatusCode::NOT_FOUND, "not_found", code, message, None)
            }
            Self::Unauthorized { code, message } => {
                (StatusCode::UNAUTHORIZED, "unauthorized", code, message, None)
            }
            Self::Forbidden {
                code,
                message,
                data,
            } => (StatusCode::FORBIDDEN, "forbidden", code, message, data),
            Self::NotImplemented { message } => (
                StatusCode::NOT_IMPLEMENTED,
                "not_implemented",
                "NOT_IMPLEMENTED".to_string(),
                message,
                None,
            ),
            Self::ServiceUnavailable { message } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                "SERVICE_UNAVAILABLE".to_string(),
                message,
                None,
            ),
            Self::Internal { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "INTERNAL".to_string(),
                message,
                None,
            ),
        };

        let mut body = serde_json::json!({
            "error": error_type,
            "code": code,
            "message": message
        });
        if let Some(data) = data {
            body["data"] = data;
        }
        (status, Json(body)).into_response()
    }
}
