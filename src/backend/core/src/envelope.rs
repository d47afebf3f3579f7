//! Uniform response envelope produced at the edges of every pipeline.
//!
//! Success: `{ "success": true, "data": ..., "message": ... }`
//! Failure: `{ "success": false, "error": "...", "error_code": "..." }`

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::CarehubError;

/// API response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl<T: Serialize> ResponseEnvelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
            error_code: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn error(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: None,
            error: Some(message.into()),
            error_code: Some(code.into()),
        }
    }

    pub fn from_error(err: &CarehubError) -> Self {
        Self::error(err.user_message(), err.kind().as_str())
    }

    /// Render with an explicit status code.
    pub fn into_response_with(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_success_shape() {
        let envelope = ResponseEnvelope::success(json!({"id": "r1"})).with_message("loaded");
        let value: Value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["success"], true);
        assert_eq!(value["data"]["id"], "r1");
        assert_eq!(value["message"], "loaded");
        assert!(value.get("error").is_none());
        assert!(value.get("error_code").is_none());
    }

    #[test]
    fn test_error_shape() {
        let err = CarehubError::forbidden("You do not have permission: patient:read");
        let value: Value = serde_json::to_value(ResponseEnvelope::<()>::from_error(&err)).unwrap();

        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "You do not have permission: patient:read");
        assert_eq!(value["error_code"], "FORBIDDEN");
        assert!(value.get("data").is_none());
    }
}
