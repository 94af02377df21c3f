//! Error handling module for the CompliCal backend.
//!
//! Provides centralized error types with mapping to HTTP status codes and a JSON envelope.
//! Authorization failures stay opaque and server-side failures only ever expose a generic
//! message; the underlying cause is logged.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const INVALID_TYPE: &str = "INVALID_TYPE";
    pub const INVALID_PAGINATION_TOKEN: &str = "INVALID_PAGINATION_TOKEN";
    pub const USER_EXISTS: &str = "USER_EXISTS";
    pub const KEY_LIMIT_REACHED: &str = "KEY_LIMIT_REACHED";
    pub const INVALID_SIGNATURE: &str = "INVALID_SIGNATURE";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const UPSTREAM_ERROR: &str = "UPSTREAM_ERROR";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    /// One or more request fields failed validation
    Validation(Vec<FieldError>),
    /// Deadline type is not part of the jurisdiction's vocabulary
    InvalidType {
        jurisdiction: String,
        valid: Vec<&'static str>,
    },
    /// Pagination token could not be decoded back into a continuation key
    InvalidToken,
    /// Webhook signature missing, malformed or not matching
    InvalidSignature,
    /// Bad request
    BadRequest(String),
    /// Account with this email already exists
    UserExists,
    /// Too many active API keys for the owner
    KeyLimitReached(usize),
    /// Authentication required or failed
    Unauthorized,
    /// Resource not found
    NotFound(String),
    /// Database error
    Database(String),
    /// Payments provider call failed
    Upstream(String),
    /// Internal server error
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::InvalidType { .. }
            | AppError::InvalidToken
            | AppError::InvalidSignature
            | AppError::BadRequest(_)
            | AppError::UserExists
            | AppError::KeyLimitReached(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => codes::VALIDATION_ERROR,
            AppError::InvalidType { .. } => codes::INVALID_TYPE,
            AppError::InvalidToken => codes::INVALID_PAGINATION_TOKEN,
            AppError::InvalidSignature => codes::INVALID_SIGNATURE,
            AppError::BadRequest(_) => codes::BAD_REQUEST,
            AppError::UserExists => codes::USER_EXISTS,
            AppError::KeyLimitReached(_) => codes::KEY_LIMIT_REACHED,
            AppError::Unauthorized => codes::UNAUTHORIZED,
            AppError::NotFound(_) => codes::NOT_FOUND,
            AppError::Upstream(_) => codes::UPSTREAM_ERROR,
            AppError::Database(_) | AppError::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Get the client-facing error message.
    pub fn message(&self) -> String {
        match self {
            AppError::Validation(_) => "Invalid request parameters".to_string(),
            AppError::InvalidType {
                jurisdiction,
                valid,
            } => format!(
                "Invalid type for {}. Valid types are: {}",
                jurisdiction,
                valid.join(", ")
            ),
            AppError::InvalidToken => {
                "The provided nextToken is invalid or corrupted".to_string()
            }
            AppError::InvalidSignature => "Webhook signature verification failed".to_string(),
            AppError::BadRequest(msg) => msg.clone(),
            AppError::UserExists => "An account with this email already exists".to_string(),
            AppError::KeyLimitReached(max) => format!(
                "You can have a maximum of {} active API keys. Please revoke an existing key first.",
                max
            ),
            AppError::Unauthorized => "Unauthorized".to_string(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::Upstream(_) => "Payment provider request failed".to_string(),
            AppError::Database(_) | AppError::Internal(_) => {
                "An unexpected error occurred while processing your request".to_string()
            }
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::Validation(errors) => serde_json::to_value(errors).ok(),
            AppError::InvalidType { valid, .. } => {
                Some(serde_json::json!({ "validTypes": valid }))
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Database(cause) | AppError::Upstream(cause) | AppError::Internal(cause) => {
                write!(f, "{}: {}", self.error_code(), cause)
            }
            _ => write!(f, "{}: {}", self.error_code(), self.message()),
        }
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Upstream(err.to_string())
    }
}

/// Error details in the response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Error response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetails,
}

impl ErrorResponse {
    pub fn new(error: &AppError) -> Self {
        Self {
            success: false,
            error: ErrorDetails {
                code: error.error_code().to_string(),
                message: error.message(),
                details: error.details(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(ErrorResponse::new(&self))).into_response()
    }
}
