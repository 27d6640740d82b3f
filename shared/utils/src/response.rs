//! Uniform response envelope
//!
//! Every JSON body the API returns, success or failure, has the shape
//! `{success, message, data, errors, metadata?, timestamp}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            errors: Vec::new(),
            metadata: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(message: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            errors,
            metadata: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

impl ApiResponse<()> {
    /// Success without a payload, e.g. after a delete.
    pub fn done(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            errors: Vec::new(),
            metadata: None,
            timestamp: Utc::now(),
        }
    }
}

/// An envelope paired with the status code it is sent with.
#[derive(Debug)]
pub struct ApiReply<T> {
    pub status: StatusCode,
    pub body: ApiResponse<T>,
}

impl<T> ApiReply<T> {
    pub fn ok(body: ApiResponse<T>) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    pub fn created(body: ApiResponse<T>) -> Self {
        Self {
            status: StatusCode::CREATED,
            body,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiReply<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_skipped_when_absent() {
        let body = ApiResponse::ok("Mine retrieved successfully", 42);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["data"], 42);
        assert!(json["errors"].as_array().unwrap().is_empty());
        assert!(json.get("metadata").is_none());
        assert!(json.get("timestamp").is_some());
    }

    #[test]
    fn test_failure_carries_errors() {
        let body: ApiResponse<()> =
            ApiResponse::failure("Validation failed", vec!["name is required".into()]);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["success"], false);
        assert!(json["data"].is_null());
        assert_eq!(json["errors"][0], "name is required");
    }
}
