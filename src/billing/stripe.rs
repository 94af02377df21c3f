//! Stripe implementation of [`PaymentsProvider`] over its form-encoded REST API.

use async_trait::async_trait;
use serde::Deserialize;

use super::{CheckoutSession, CheckoutSessionRequest, PaymentsProvider};
use crate::errors::AppError;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

pub struct StripeClient {
    http: reqwest::Client,
    secret_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionBody {
    id: String,
    url: Option<String>,
}

impl StripeClient {
    /// Without a secret key every call fails as an upstream error.
    pub fn new(secret_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key,
        }
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<SessionBody, AppError> {
        let secret = self
            .secret_key
            .as_deref()
            .ok_or_else(|| AppError::Upstream("STRIPE_SECRET_KEY is not configured".to_string()))?;

        let response = self
            .http
            .post(format!("{}{}", STRIPE_API_BASE, path))
            .bearer_auth(secret)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!("stripe {} {}: {}", path, status, body)));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PaymentsProvider for StripeClient {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, AppError> {
        let form = [
            ("mode", "subscription"),
            ("payment_method_types[0]", "card"),
            ("line_items[0][price]", request.price_id.as_str()),
            ("line_items[0][quantity]", "1"),
            ("success_url", request.success_url.as_str()),
            ("cancel_url", request.cancel_url.as_str()),
            ("customer_email", request.customer_email.as_str()),
            ("metadata[tier]", request.tier.as_str()),
            ("allow_promotion_codes", "true"),
            ("billing_address_collection", "required"),
        ];
        let body = self.post_form("/checkout/sessions", &form).await?;
        let url = body
            .url
            .ok_or_else(|| AppError::Upstream("checkout session without url".to_string()))?;
        Ok(CheckoutSession { id: body.id, url })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<String, AppError> {
        let form = [("customer", customer_id), ("return_url", return_url)];
        let body = self.post_form("/billing_portal/sessions", &form).await?;
        body.url
            .ok_or_else(|| AppError::Upstream("portal session without url".to_string()))
    }
}
