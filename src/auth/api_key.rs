//! API key issuance and the request authorizer.

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::errors::AppError;
use crate::AppState;

/// Header name for the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Deprecated query parameter still accepted in place of the header.
pub const API_KEY_QUERY_PARAM: &str = "api_key";

/// Notice attached to responses authenticated through the query parameter.
pub const QUERY_KEY_WARNING: &str =
    "Using API key in URL is deprecated. Please use X-API-Key header instead.";

/// Number of leading characters of a key kept in clear for identification.
pub const KEY_PREFIX_LEN: usize = 8;

/// Key identity attached to authenticated requests.
#[derive(Debug, Clone)]
pub struct ApiKeyContext {
    pub key_id: String,
    pub user_email: String,
    pub key_name: String,
}

/// SHA-256 of the key, hex-encoded.
pub fn hash_api_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Generate a fresh 40-character key.
pub fn generate_api_key() -> String {
    hex::encode(rand::random::<[u8; 20]>())
}

pub fn key_prefix(key: &str) -> String {
    key.chars().take(KEY_PREFIX_LEN).collect()
}

fn key_from_query(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(name, _)| name == API_KEY_QUERY_PARAM)
        .map(|(_, value)| value.into_owned())
}

/// Authorize a request by API key, counting the use against the key.
pub async fn api_key_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let from_header = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let (key, from_query) = match from_header {
        Some(key) => (key, false),
        None => match key_from_query(request.uri().query()) {
            Some(key) if !key.is_empty() => (key, true),
            _ => return Err(AppError::Unauthorized),
        },
    };

    let Some(authorized) = state
        .repo
        .authorize_api_key(&hash_api_key(&key), Utc::now())
        .await?
    else {
        tracing::debug!(prefix = %key_prefix(&key), "api key rejected");
        return Err(AppError::Unauthorized);
    };

    request.extensions_mut().insert(ApiKeyContext {
        key_id: authorized.key_id,
        user_email: authorized.user_email,
        key_name: authorized.key_name,
    });

    let mut response = next.run(request).await;
    if from_query {
        response
            .headers_mut()
            .insert("x-warning", HeaderValue::from_static(QUERY_KEY_WARNING));
    }
    Ok(response)
}
