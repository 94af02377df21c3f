//! Subscription state recorded from payment webhooks.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::repository::{format_ts, parse_ts, Repository};
use crate::errors::AppError;
use crate::models::{Subscription, Tier};

impl Repository {
    /// Insert or replace the subscription of an account.
    pub async fn upsert_subscription(&self, sub: &Subscription) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (email, customer_id, subscription_id, tier, status, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(email) DO UPDATE SET
                customer_id = excluded.customer_id,
                subscription_id = excluded.subscription_id,
                tier = excluded.tier,
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&sub.email)
        .bind(&sub.customer_id)
        .bind(&sub.subscription_id)
        .bind(sub.tier.as_str())
        .bind(&sub.status)
        .bind(format_ts(&sub.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_subscription(&self, email: &str) -> Result<Option<Subscription>, AppError> {
        let row = sqlx::query(
            "SELECT email, customer_id, subscription_id, tier, status, updated_at FROM subscriptions WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(subscription_from_row).transpose()
    }

    /// Update the subscription belonging to a payments customer.
    ///
    /// Returns the account email, or `None` when the customer is unknown.
    pub async fn update_subscription_by_customer(
        &self,
        customer_id: &str,
        subscription_id: &str,
        tier: Tier,
        status: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, AppError> {
        let row = sqlx::query(
            r#"
            UPDATE subscriptions
            SET subscription_id = ?, tier = ?, status = ?, updated_at = ?
            WHERE customer_id = ?
            RETURNING email
            "#,
        )
        .bind(subscription_id)
        .bind(tier.as_str())
        .bind(status)
        .bind(format_ts(&now))
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row.get("email")))
    }
}

fn subscription_from_row(row: &SqliteRow) -> Result<Subscription, AppError> {
    let tier: String = row.get("tier");
    let updated_at: String = row.get("updated_at");

    Ok(Subscription {
        email: row.get("email"),
        customer_id: row.get("customer_id"),
        subscription_id: row.get("subscription_id"),
        tier: Tier::parse(&tier)
            .ok_or_else(|| AppError::Internal(format!("stored tier {:?}", tier)))?,
        status: row.get("status"),
        updated_at: parse_ts(&updated_at)?,
    })
}
