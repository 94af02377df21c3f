//! Billing endpoints.

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Extension, Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::auth::AuthUser;
use crate::billing::webhook::{process_event, verify_signature, WebhookEvent, SIGNATURE_HEADER};
use crate::billing::{plans, price_for_tier, CheckoutSessionRequest};
use crate::errors::{AppError, FieldError};
use crate::models::{
    CheckoutRequest, CheckoutResponse, PlanList, PortalResponse, SubscriptionResponse, Tier,
};
use crate::AppState;

/// GET /v1/billing/plans - Published plans.
pub async fn list_plans() -> Json<PlanList> {
    Json(PlanList { plans: plans() })
}

fn redirect_url(field: &str, raw: &str, default: String) -> Result<String, FieldError> {
    if raw.trim().is_empty() {
        return Ok(default);
    }
    match url::Url::parse(raw.trim()) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(url.to_string()),
        _ => Err(FieldError::new(field, "must be an http(s) URL")),
    }
}

/// POST /v1/billing/checkout - Start a hosted checkout for a paid tier.
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let Json(request) = payload?;
    let app_url = state.config.billing.app_url.trim_end_matches('/');

    let mut errors = Vec::new();
    let tier = match Tier::parse(&request.tier) {
        Some(Tier::Developer) => {
            errors.push(FieldError::new("tier", "developer tier is free"));
            None
        }
        Some(tier) => Some(tier),
        None => {
            errors.push(FieldError::new(
                "tier",
                "must be one of professional, enterprise",
            ));
            None
        }
    };
    let success_url = redirect_url(
        "successUrl",
        &request.success_url,
        format!("{}/dashboard?checkout=success", app_url),
    )
    .map_err(|e| errors.push(e))
    .ok();
    let cancel_url = redirect_url(
        "cancelUrl",
        &request.cancel_url,
        format!("{}/pricing?checkout=cancelled", app_url),
    )
    .map_err(|e| errors.push(e))
    .ok();

    let (Some(tier), Some(success_url), Some(cancel_url), true) =
        (tier, success_url, cancel_url, errors.is_empty())
    else {
        return Err(AppError::Validation(errors));
    };

    let session = state
        .payments
        .create_checkout_session(&CheckoutSessionRequest {
            customer_email: user.email.clone(),
            tier,
            price_id: price_for_tier(&state.config.billing.prices, tier).to_string(),
            success_url,
            cancel_url,
        })
        .await?;

    tracing::info!(user_id = %user.user_id, tier = tier.as_str(), session_id = %session.id, "checkout started");
    Ok(Json(CheckoutResponse {
        session_id: session.id,
        url: session.url,
    }))
}

/// POST /v1/billing/portal - Self-service portal for an existing customer.
pub async fn create_portal(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<PortalResponse>, AppError> {
    let subscription = state
        .repo
        .get_subscription(&user.email)
        .await?
        .ok_or_else(|| AppError::NotFound("No billing account found".to_string()))?;

    let return_url = format!(
        "{}/dashboard",
        state.config.billing.app_url.trim_end_matches('/')
    );
    let url = state
        .payments
        .create_portal_session(&subscription.customer_id, &return_url)
        .await?;
    Ok(Json(PortalResponse { url }))
}

/// POST /v1/billing/webhooks - Signed events from the payments provider.
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let secret = state.config.billing.webhook_secret.as_deref().ok_or_else(|| {
        tracing::warn!("webhook received but STRIPE_WEBHOOK_SECRET is not configured");
        AppError::InvalidSignature
    })?;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::InvalidSignature)?;

    let now = Utc::now();
    verify_signature(&body, signature, secret, now.timestamp())?;

    let event: WebhookEvent = serde_json::from_slice(&body)?;
    let (event_id, event_type) = (event.id.clone(), event.event_type.clone());
    let outcome = process_event(&state.repo, &state.config.billing.prices, event, now).await?;
    tracing::info!(%event_id, %event_type, ?outcome, "webhook processed");

    Ok(Json(json!({ "received": true })))
}

/// GET /v1/billing/subscription - Current tier and status.
pub async fn get_subscription(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SubscriptionResponse>, AppError> {
    let response = match state.repo.get_subscription(&user.email).await? {
        Some(sub) => SubscriptionResponse {
            tier: sub.tier,
            status: sub.status,
            customer_id: Some(sub.customer_id),
            subscription_id: sub.subscription_id,
            updated_at: Some(sub.updated_at),
        },
        None => SubscriptionResponse {
            tier: Tier::Developer,
            status: "active".to_string(),
            customer_id: None,
            subscription_id: None,
            updated_at: None,
        },
    };
    Ok(Json(response))
}
