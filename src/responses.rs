//! Uniform JSON response envelope.
//!
//! Every JSON response is `{success, data?, error?, timestamp}`.

use axum::{http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ApiResponse {
    pub fn ok(data: impl Serialize) -> Self {
        Self {
            success: true,
            data: Some(json!(data)),
            error: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                code: code.to_string(),
                message: message.into(),
            }),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Envelope plus status code, ready to return from a handler.
pub fn respond(status: StatusCode, body: ApiResponse) -> impl IntoResponse {
    (status, Json(body))
}

pub fn ok(data: impl Serialize) -> impl IntoResponse {
    respond(StatusCode::OK, ApiResponse::ok(data))
}

pub fn error(status: StatusCode, code: &str, message: impl Into<String>) -> impl IntoResponse {
    respond(status, ApiResponse::error(code, message))
}

/// Map a hub error onto the wire: unknown groups are 404s, everything else
/// is a 500.
pub fn from_hub_error(err: &hub_core::HubError) -> (StatusCode, Json<ApiResponse>) {
    let status = match err {
        hub_core::HubError::GroupNotFound(_) => StatusCode::NOT_FOUND,
        hub_core::HubError::ToolNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiResponse::error(err.code(), err.to_string())))
}
