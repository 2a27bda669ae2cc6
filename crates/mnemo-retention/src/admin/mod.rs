//! Admin HTTP API for the retention daemon
//!
//! Lets a host (or `mnemo-cli`) register items, report accesses, push
//! classifier signals, manage protection and trigger optimization passes.
//! Errors are returned as `{"error": {"type", "message"}}`.

pub mod handlers;
pub mod server;

pub use server::{AdminServer, AppState, create_router};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::RetentionError;

/// Body of `POST /items`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewItemRequest {
    pub relevance: f64,
    pub emotional_weight: f64,
    pub owner_id: String,
    #[serde(default)]
    pub context_id: String,
}

/// Body of `POST /items/{id}/access`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRequest {
    pub latency_ms: f64,
    #[serde(default = "default_was_hit")]
    pub was_hit: bool,
}

fn default_was_hit() -> bool {
    true
}

/// Body of `POST /items/{id}/protection`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectRequest {
    pub reason: String,
}

/// Body of `POST /optimize`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptimizeRequest {
    #[serde(default)]
    pub owner_id: Option<String>,
}

/// Error returned by admin handlers
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_input", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<RetentionError> for ApiError {
    fn from(e: RetentionError) -> Self {
        let (status, kind) = match &e {
            RetentionError::ItemNotFound(_) => (StatusCode::NOT_FOUND, "item_not_found"),
            RetentionError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            RetentionError::Migration(_) | RetentionError::Store(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "store_error")
            }
            RetentionError::ClassifierUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "classifier_unavailable")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        if status.is_server_error() {
            tracing::error!(error = %e, "Admin request failed");
        }
        Self::new(status, kind, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "type": self.kind,
                "message": self.message,
            }
        });
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_not_found_maps_to_404() {
        let err = ApiError::from(RetentionError::ItemNotFound(Uuid::new_v4()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.kind, "item_not_found");
    }

    #[test]
    fn test_invalid_input_maps_to_400() {
        let err = ApiError::from(RetentionError::InvalidInput("bad".to_string()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Invalid input: bad");
    }

    #[test]
    fn test_access_request_defaults_to_hit() {
        let req: AccessRequest = serde_json::from_str(r#"{"latency_ms": 3.5}"#).unwrap();
        assert!(req.was_hit);
    }
}
