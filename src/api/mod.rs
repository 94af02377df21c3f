//! REST API module.
//!
//! Contains all routes' handlers; routing and layers live in `create_router`.

mod api_keys;
mod auth;
mod billing;
mod deadlines;
mod health;

pub use api_keys::*;
pub use auth::*;
pub use billing::*;
pub use deadlines::*;
pub use health::*;

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::errors::AppError;

/// Request id assigned by the request-id layer, if any.
#[derive(Debug, Clone)]
pub struct RequestId(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for RequestId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RequestId(
            parts
                .headers
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        ))
    }
}

/// Fallback for unknown routes.
pub async fn not_found() -> AppError {
    AppError::NotFound("Route not found".to_string())
}
