//! User account storage.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::repository::{format_ts, parse_ts, Repository};
use crate::errors::AppError;
use crate::models::{Tier, User};

impl Repository {
    /// Create an account. A duplicate email yields `AppError::UserExists`.
    pub async fn create_user(&self, user: &User) -> Result<(), AppError> {
        let result = sqlx::query(
            "INSERT INTO users (id, email, password_hash, company_name, tier, token_version, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.company_name)
        .bind(user.tier.as_str())
        .bind(user.token_version)
        .bind(format_ts(&user.created_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AppError::UserExists),
            Err(e) => Err(e.into()),
        }
    }

    /// Get a user by email.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, company_name, tier, token_version, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    /// Invalidate outstanding refresh tokens of a user.
    pub async fn bump_token_version(&self, email: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET token_version = token_version + 1 WHERE email = ?")
            .bind(email)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record the subscription tier of a user. Returns `false` if no such user.
    pub async fn set_user_tier(&self, email: &str, tier: Tier) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE users SET tier = ? WHERE email = ?")
            .bind(tier.as_str())
            .bind(email)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

fn user_from_row(row: &SqliteRow) -> Result<User, AppError> {
    let tier: String = row.get("tier");
    let created_at: String = row.get("created_at");

    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        company_name: row.get("company_name"),
        tier: Tier::parse(&tier)
            .ok_or_else(|| AppError::Internal(format!("stored tier {:?}", tier)))?,
        token_version: row.get("token_version"),
        created_at: parse_ts(&created_at)?,
    })
}
