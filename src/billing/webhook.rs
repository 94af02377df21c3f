//! Signed payment webhooks.
//!
//! The `Stripe-Signature` header has the form `t=<unix ts>,v1=<hex>[,v1=...]`.
//! The signature is HMAC-SHA256 of `"<ts>.<raw body>"` under the endpoint
//! secret; events older than the tolerance are rejected.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use super::tier_for_price;
use crate::auth::constant_time_compare;
use crate::config::StripePrices;
use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{Subscription, Tier};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum age of a signed timestamp, in seconds.
pub const TOLERANCE_SECS: i64 = 300;

/// Compute the hex signature of a payload for a timestamp.
pub fn sign(payload: &[u8], timestamp: i64, secret: &str) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("hmac key: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a signature header against the raw request body.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), AppError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(AppError::InvalidSignature)?;
    if signatures.is_empty() || now.abs_diff(timestamp) > TOLERANCE_SECS.unsigned_abs() {
        return Err(AppError::InvalidSignature);
    }

    let expected = sign(payload, timestamp, secret)?;
    if signatures
        .iter()
        .any(|candidate| constant_time_compare(candidate, &expected))
    {
        Ok(())
    } else {
        Err(AppError::InvalidSignature)
    }
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct CustomerDetails {
    email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionMetadata {
    tier: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionObject {
    customer: Option<String>,
    customer_email: Option<String>,
    #[serde(default)]
    customer_details: Option<CustomerDetails>,
    #[serde(default)]
    metadata: Option<SessionMetadata>,
    subscription: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PriceRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SubscriptionItem {
    price: PriceRef,
}

#[derive(Debug, Default, Deserialize)]
struct SubscriptionItems {
    #[serde(default)]
    data: Vec<SubscriptionItem>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionObject {
    id: String,
    customer: String,
    status: String,
    #[serde(default)]
    items: SubscriptionItems,
}

/// What processing an event changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    TierChanged { email: String, tier: Tier },
    /// Event was valid but refers to nothing this service tracks
    Skipped(&'static str),
    Ignored,
}

/// Apply a verified event to stored subscription state.
pub async fn process_event(
    repo: &Repository,
    prices: &StripePrices,
    event: WebhookEvent,
    now: DateTime<Utc>,
) -> Result<WebhookOutcome, AppError> {
    match event.event_type.as_str() {
        "checkout.session.completed" => {
            let session: CheckoutSessionObject = serde_json::from_value(event.data.object)?;
            let email = session
                .customer_email
                .or_else(|| session.customer_details.and_then(|d| d.email));
            let tier = session
                .metadata
                .and_then(|m| m.tier)
                .as_deref()
                .and_then(Tier::parse);
            let (Some(email), Some(tier), Some(customer_id)) = (email, tier, session.customer)
            else {
                tracing::warn!(event_id = %event.id, "checkout session missing email, tier or customer");
                return Ok(WebhookOutcome::Skipped("incomplete checkout session"));
            };

            repo.upsert_subscription(&Subscription {
                email: email.clone(),
                customer_id,
                subscription_id: session.subscription,
                tier,
                status: "active".to_string(),
                updated_at: now,
            })
            .await?;
            if !repo.set_user_tier(&email, tier).await? {
                tracing::warn!(%email, "checkout completed for unknown account");
            }
            Ok(WebhookOutcome::TierChanged { email, tier })
        }
        "customer.subscription.updated" | "customer.subscription.deleted" => {
            let sub: SubscriptionObject = serde_json::from_value(event.data.object)?;
            let status = if event.event_type.ends_with("deleted") {
                "canceled".to_string()
            } else {
                sub.status
            };
            let tier = if status == "active" {
                sub.items
                    .data
                    .iter()
                    .find_map(|item| tier_for_price(prices, &item.price.id))
                    .unwrap_or(Tier::Developer)
            } else {
                Tier::Developer
            };

            let Some(email) = repo
                .update_subscription_by_customer(&sub.customer, &sub.id, tier, &status, now)
                .await?
            else {
                tracing::warn!(customer = %sub.customer, "subscription event for unknown customer");
                return Ok(WebhookOutcome::Skipped("unknown customer"));
            };
            repo.set_user_tier(&email, tier).await?;
            Ok(WebhookOutcome::TierChanged { email, tier })
        }
        _ => Ok(WebhookOutcome::Ignored),
    }
}
