//! Locally issued JWTs for account endpoints.
//!
//! Access tokens are short-lived; refresh tokens carry the account's token
//! version, which logout increments.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::errors::AppError;
use crate::models::{Tier, TokenPair, User};
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account id
    pub sub: String,
    pub email: String,
    pub company: String,
    pub tier: Tier,
    pub token_use: TokenUse,
    pub ver: i64,
    pub iat: i64,
    pub exp: i64,
}

/// Authenticated account context extracted from an access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: String,
    pub company_name: String,
    pub tier: Tier,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
            company_name: claims.company,
            tier: claims.tier,
        }
    }
}

fn issue_token(user: &User, token_use: TokenUse, ttl: Duration, secret: &str) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id.clone(),
        email: user.email.clone(),
        company: user.company_name.clone(),
        tier: user.tier,
        token_use,
        ver: user.token_version,
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("jwt encode: {}", e)))
}

/// Issue an access token and a refresh token for a user.
pub fn issue_token_pair(user: &User, config: &Config) -> Result<TokenPair, AppError> {
    Ok(TokenPair {
        token: issue_token(
            user,
            TokenUse::Access,
            Duration::minutes(config.jwt_ttl_minutes),
            &config.jwt_secret,
        )?,
        refresh_token: issue_token(
            user,
            TokenUse::Refresh,
            Duration::days(config.refresh_ttl_days),
            &config.jwt_secret,
        )?,
    })
}

/// Validate a token's signature, expiry and intended use.
pub fn verify_token(token: &str, secret: &str, expected: TokenUse) -> Result<Claims, AppError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "jwt rejected");
        AppError::Unauthorized
    })?;

    if data.claims.token_use != expected {
        return Err(AppError::Unauthorized);
    }
    Ok(data.claims)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// JWT authentication middleware injecting [`AuthUser`].
pub async fn jwt_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers()).ok_or(AppError::Unauthorized)?;
    let claims = verify_token(token, &state.config.jwt_secret, TokenUse::Access)?;

    request.extensions_mut().insert(AuthUser::from(claims));
    Ok(next.run(request).await)
}
