//! Account endpoints: registration, login and token rotation.

use axum::{extract::rejection::JsonRejection, extract::State, Extension, Json};
use chrono::Utc;
use validator::ValidateEmail;

use crate::auth::jwt::{issue_token_pair, verify_token, TokenUse};
use crate::auth::password::{
    hash_password, verify_password, verify_unknown_account, MIN_PASSWORD_LENGTH,
};
use crate::auth::AuthUser;
use crate::errors::{AppError, FieldError};
use crate::models::{
    LoginRequest, LoginResponse, MessageResponse, RefreshRequest, RegisterRequest, Tier,
    TokenPair, User,
};
use crate::AppState;

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// RFC 5322 address syntax, with a dotted domain.
fn is_valid_email(email: &str) -> bool {
    email.validate_email()
        && email
            .rsplit_once('@')
            .is_some_and(|(_, domain)| domain.contains('.') && !domain.ends_with('.'))
}

/// POST /v1/auth/register - Create an account on the developer tier.
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(request) = payload?;
    let email = normalize_email(&request.email);

    let mut errors = Vec::new();
    if !is_valid_email(&email) {
        errors.push(FieldError::new("email", "must be a valid email address"));
    }
    if request.password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.push(FieldError::new(
            "password",
            format!("must be at least {} characters", MIN_PASSWORD_LENGTH),
        ));
    }
    if request.company_name.trim().is_empty() {
        errors.push(FieldError::new("companyName", "is required"));
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let user = User {
        password_hash: hash_password(&request.password, &id)?,
        id,
        email,
        company_name: request.company_name.trim().to_string(),
        tier: Tier::Developer,
        token_version: 0,
        created_at: Utc::now(),
    };
    state.repo.create_user(&user).await?;

    tracing::info!(user_id = %user.id, "account registered");
    Ok(Json(MessageResponse::new("User registered successfully")))
}

/// POST /v1/auth/login - Exchange credentials for a token pair.
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let Json(request) = payload?;
    let email = normalize_email(&request.email);

    let Some(user) = state.repo.get_user_by_email(&email).await? else {
        verify_unknown_account(&request.password)?;
        return Err(AppError::Unauthorized);
    };
    if !verify_password(&request.password, &user.id, &user.password_hash)? {
        tracing::debug!(user_id = %user.id, "login rejected");
        return Err(AppError::Unauthorized);
    }

    let tokens = issue_token_pair(&user, &state.config)?;
    Ok(Json(LoginResponse {
        token: tokens.token,
        refresh_token: tokens.refresh_token,
        email: user.email,
        company_name: user.company_name,
    }))
}

/// POST /v1/auth/refresh - Rotate a token pair.
///
/// Tokens issued before the last logout carry a stale version and fail.
pub async fn refresh(
    State(state): State<AppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<TokenPair>, AppError> {
    let Json(request) = payload?;
    let claims = verify_token(
        &request.refresh_token,
        &state.config.jwt_secret,
        TokenUse::Refresh,
    )?;

    let user = state
        .repo
        .get_user_by_email(&claims.email)
        .await?
        .filter(|u| u.id == claims.sub && u.token_version == claims.ver)
        .ok_or(AppError::Unauthorized)?;

    Ok(Json(issue_token_pair(&user, &state.config)?))
}

/// POST /v1/auth/logout - Invalidate outstanding refresh tokens.
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MessageResponse>, AppError> {
    state.repo.bump_token_version(&user.email).await?;
    Ok(Json(MessageResponse::new("Logged out")))
}
