//! Subscription tiers, plans and billing request/response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscription tier of an account.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Developer,
    Professional,
    Enterprise,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Developer, Tier::Professional, Tier::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Developer => "developer",
            Tier::Professional => "professional",
            Tier::Enterprise => "enterprise",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "developer" => Some(Tier::Developer),
            "professional" => Some(Tier::Professional),
            "enterprise" => Some(Tier::Enterprise),
            _ => None,
        }
    }
}

/// Published limits of a plan. `-1` requests means unlimited.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanLimits {
    /// API calls per month
    pub requests: i64,
    /// Requests per minute
    pub rate_limit: u32,
}

/// A purchasable plan as listed on `GET /v1/billing/plans`.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub id: Tier,
    pub name: &'static str,
    /// Monthly price in USD
    pub price: u32,
    pub limits: PlanLimits,
    pub features: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanList {
    pub plans: Vec<Plan>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(default)]
    pub tier: String,
    #[serde(default)]
    pub success_url: String,
    #[serde(default)]
    pub cancel_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortalResponse {
    pub url: String,
}

/// Stored subscription state, keyed by account email.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub email: String,
    pub customer_id: String,
    pub subscription_id: Option<String>,
    pub tier: Tier,
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub tier: Tier,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}
