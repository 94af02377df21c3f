//! Billing: published plans, the payments provider seam and webhook handling.

mod stripe;
pub mod webhook;

pub use stripe::StripeClient;

use async_trait::async_trait;

use crate::config::StripePrices;
use crate::errors::AppError;
use crate::models::{Plan, PlanLimits, Tier};

const BASE_FEATURES: &[&str] = &[
    "Access to AU and NZ compliance deadlines",
    "RESTful API access",
    "Email support",
];

fn tier_features(tier: Tier) -> &'static [&'static str] {
    match tier {
        Tier::Developer => &[
            "1,000 API calls/month",
            "100 requests/minute rate limit",
            "Community support",
        ],
        Tier::Professional => &[
            "50,000 API calls/month",
            "1,000 requests/minute rate limit",
            "Priority email support",
            "Webhook notifications",
            "Custom integrations",
        ],
        Tier::Enterprise => &[
            "Unlimited API calls",
            "10,000 requests/minute rate limit",
            "24/7 phone support",
            "Custom SLA",
            "Dedicated account manager",
            "Multi-region access",
        ],
    }
}

/// The plan offered for a tier.
pub fn plan(tier: Tier) -> Plan {
    let (name, price, requests, rate_limit) = match tier {
        Tier::Developer => ("Developer", 0, 1_000, 100),
        Tier::Professional => ("Professional", 49, 50_000, 1_000),
        Tier::Enterprise => ("Enterprise", 299, -1, 10_000),
    };
    Plan {
        id: tier,
        name,
        price,
        limits: PlanLimits {
            requests,
            rate_limit,
        },
        features: BASE_FEATURES
            .iter()
            .chain(tier_features(tier))
            .copied()
            .collect(),
    }
}

pub fn plans() -> Vec<Plan> {
    Tier::ALL.into_iter().map(plan).collect()
}

pub fn price_for_tier(prices: &StripePrices, tier: Tier) -> &str {
    match tier {
        Tier::Developer => &prices.developer,
        Tier::Professional => &prices.professional,
        Tier::Enterprise => &prices.enterprise,
    }
}

pub fn tier_for_price(prices: &StripePrices, price_id: &str) -> Option<Tier> {
    Tier::ALL
        .into_iter()
        .find(|t| price_for_tier(prices, *t) == price_id)
}

/// Parameters of a hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    pub customer_email: String,
    pub tier: Tier,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Hosted payments provider.
#[async_trait]
pub trait PaymentsProvider: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, AppError>;

    /// Returns the URL of a self-service billing portal session.
    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<String, AppError>;
}
