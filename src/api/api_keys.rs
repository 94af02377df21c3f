//! API key lifecycle endpoints for signed-in users.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{Duration, Utc};

use crate::auth::api_key::{generate_api_key, hash_api_key, key_prefix};
use crate::auth::AuthUser;
use crate::errors::{AppError, FieldError};
use crate::models::{ApiKey, ApiKeyList, CreateApiKeyRequest, CreatedApiKey, KeyStatus};
use crate::AppState;

/// Maximum number of active keys per user.
pub const MAX_ACTIVE_KEYS: usize = 5;

const DEFAULT_EXPIRY_DAYS: i64 = 90;
const MAX_EXPIRY_DAYS: i64 = 365;
const MAX_NAME_LENGTH: usize = 100;

fn validate_create(request: &CreateApiKeyRequest) -> Result<i64, AppError> {
    let mut errors = Vec::new();
    let name_len = request.name.trim().chars().count();
    if name_len == 0 || name_len > MAX_NAME_LENGTH {
        errors.push(FieldError::new(
            "name",
            format!("must be between 1 and {} characters", MAX_NAME_LENGTH),
        ));
    }
    let expires_in = request.expires_in.unwrap_or(DEFAULT_EXPIRY_DAYS);
    if !(1..=MAX_EXPIRY_DAYS).contains(&expires_in) {
        errors.push(FieldError::new(
            "expiresIn",
            format!("must be between 1 and {} days", MAX_EXPIRY_DAYS),
        ));
    }
    if errors.is_empty() {
        Ok(expires_in)
    } else {
        Err(AppError::Validation(errors))
    }
}

/// POST /v1/auth/api-keys - Issue a key; the plaintext is returned only here.
pub async fn create_api_key(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<CreateApiKeyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedApiKey>), AppError> {
    let Json(request) = payload?;
    let expires_in = validate_create(&request)?;

    let plaintext = generate_api_key();
    let now = Utc::now();
    let key = ApiKey {
        id: uuid::Uuid::new_v4().to_string(),
        user_email: user.email.clone(),
        name: request.name.trim().to_string(),
        description: request.description.filter(|d| !d.trim().is_empty()),
        hashed_key: hash_api_key(&plaintext),
        key_prefix: key_prefix(&plaintext),
        usage_plan_id: state.config.usage_plan.id.clone(),
        created_at: now,
        expires_at: now + Duration::days(expires_in),
        last_used: None,
        status: KeyStatus::Active,
        usage_count: 0,
        revoked_at: None,
    };

    if !state.repo.insert_api_key(&key, MAX_ACTIVE_KEYS).await? {
        return Err(AppError::KeyLimitReached(MAX_ACTIVE_KEYS));
    }

    tracing::info!(
        target: "audit",
        action = "api_key.create",
        user_id = %user.user_id,
        key_id = %key.id,
        key_prefix = %key.key_prefix,
        "api key created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreatedApiKey {
            id: key.id,
            name: key.name,
            description: key.description,
            api_key: plaintext,
            key_prefix: key.key_prefix,
            usage_plan_id: key.usage_plan_id,
            created_at: key.created_at,
            expires_at: key.expires_at,
            message: "Store this API key securely. It will not be shown again.",
        }),
    ))
}

/// GET /v1/auth/api-keys - The caller's unexpired keys, without secrets.
pub async fn list_api_keys(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ApiKeyList>, AppError> {
    let keys = state.repo.list_api_keys(&user.email, Utc::now()).await?;
    Ok(Json(ApiKeyList {
        api_keys: keys.into_iter().map(Into::into).collect(),
    }))
}

/// DELETE /v1/auth/api-keys/{id} - Revoke one of the caller's keys.
pub async fn revoke_api_key(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if !state.repo.revoke_api_key(&id, &user.email, Utc::now()).await? {
        return Err(AppError::NotFound(format!("API key {} not found", id)));
    }

    tracing::info!(
        target: "audit",
        action = "api_key.revoke",
        user_id = %user.user_id,
        key_id = %id,
        "api key revoked"
    );
    Ok(StatusCode::NO_CONTENT)
}
