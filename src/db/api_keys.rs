//! API key storage.
//!
//! Expiry is enforced on every read, so a key past `expires_at` is invisible
//! even before the background sweep deletes it.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::repository::{format_ts, parse_opt_ts, parse_ts, Repository};
use crate::errors::AppError;
use crate::models::{ApiKey, KeyStatus};

/// Identity attached to a request authenticated by API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedKey {
    pub key_id: String,
    pub user_email: String,
    pub key_name: String,
}

const KEY_COLUMNS: &str = "id, user_email, name, description, hashed_key, key_prefix, \
     usage_plan_id, created_at, expires_at, last_used, status, usage_count, revoked_at";

impl Repository {
    /// Store a new key unless its owner already holds `max_active` live keys.
    ///
    /// The count and the insert run as one statement. Returns `false` when the
    /// limit was reached.
    pub async fn insert_api_key(&self, key: &ApiKey, max_active: usize) -> Result<bool, AppError> {
        let now = format_ts(&key.created_at);
        let result = sqlx::query(
            r#"
            INSERT INTO api_keys (
                id, user_email, name, description, hashed_key, key_prefix, usage_plan_id,
                created_at, expires_at, last_used, status, usage_count, revoked_at
            )
            SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, 0, NULL
            WHERE (
                SELECT COUNT(*) FROM api_keys
                WHERE user_email = ? AND status = 'active' AND expires_at > ?
            ) < ?
            "#,
        )
        .bind(&key.id)
        .bind(&key.user_email)
        .bind(&key.name)
        .bind(&key.description)
        .bind(&key.hashed_key)
        .bind(&key.key_prefix)
        .bind(&key.usage_plan_id)
        .bind(&now)
        .bind(format_ts(&key.expires_at))
        .bind(key.status.as_str())
        .bind(&key.user_email)
        .bind(&now)
        .bind(max_active as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Unexpired keys of an owner, newest first.
    pub async fn list_api_keys(
        &self,
        user_email: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<ApiKey>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM api_keys WHERE user_email = ? AND expires_at > ? ORDER BY created_at DESC, id",
            KEY_COLUMNS
        ))
        .bind(user_email)
        .bind(format_ts(&now))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(api_key_from_row).collect()
    }

    /// Soft-revoke a key owned by `user_email`.
    ///
    /// Returns `false` when no such unexpired key exists for that owner.
    pub async fn revoke_api_key(
        &self,
        id: &str,
        user_email: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let now = format_ts(&now);
        let result = sqlx::query(
            r#"
            UPDATE api_keys
            SET status = 'revoked', revoked_at = COALESCE(revoked_at, ?)
            WHERE id = ? AND user_email = ? AND expires_at > ?
            "#,
        )
        .bind(&now)
        .bind(id)
        .bind(user_email)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Match a hashed key against active, unexpired keys and record the use.
    ///
    /// The usage counter and last-used timestamp change in the same statement
    /// that performs the lookup.
    pub async fn authorize_api_key(
        &self,
        hashed_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthorizedKey>, AppError> {
        let now = format_ts(&now);
        let row = sqlx::query(
            r#"
            UPDATE api_keys
            SET usage_count = usage_count + 1, last_used = ?
            WHERE hashed_key = ? AND status = 'active' AND expires_at > ?
            RETURNING id, user_email, name
            "#,
        )
        .bind(&now)
        .bind(hashed_key)
        .bind(&now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| AuthorizedKey {
            key_id: row.get("id"),
            user_email: row.get("user_email"),
            key_name: row.get("name"),
        }))
    }

    /// Delete keys whose expiry has passed. Returns how many were removed.
    pub async fn purge_expired_keys(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM api_keys WHERE expires_at <= ?")
            .bind(format_ts(&now))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn api_key_from_row(row: &SqliteRow) -> Result<ApiKey, AppError> {
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    let expires_at: String = row.get("expires_at");

    Ok(ApiKey {
        id: row.get("id"),
        user_email: row.get("user_email"),
        name: row.get("name"),
        description: row.get("description"),
        hashed_key: row.get("hashed_key"),
        key_prefix: row.get("key_prefix"),
        usage_plan_id: row.get("usage_plan_id"),
        created_at: parse_ts(&created_at)?,
        expires_at: parse_ts(&expires_at)?,
        last_used: parse_opt_ts(row.get("last_used"))?,
        status: KeyStatus::parse(&status)
            .ok_or_else(|| AppError::Internal(format!("stored key status {:?}", status)))?,
        usage_count: row.get("usage_count"),
        revoked_at: parse_opt_ts(row.get("revoked_at"))?,
    })
}
