//! Database module for SQLite persistence.
//!
//! Deadlines live in a single table carrying precomputed index keys; API keys,
//! users and subscriptions each get a plain table.

mod api_keys;
mod deadlines;
mod repository;
mod subscriptions;
mod users;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deadlines (
            id TEXT PRIMARY KEY,
            pk TEXT NOT NULL,
            sk TEXT NOT NULL,
            gsi1pk TEXT NOT NULL,
            gsi1sk TEXT NOT NULL,
            gsi2pk TEXT NOT NULL,
            gsi2sk TEXT NOT NULL,
            type TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL,
            jurisdiction TEXT NOT NULL,
            agency TEXT NOT NULL,
            due_date TEXT NOT NULL,
            period TEXT NOT NULL,
            applicable_to TEXT NOT NULL,
            source_url TEXT NOT NULL,
            source_verified_at TEXT NOT NULL,
            last_updated TEXT NOT NULL,
            notes TEXT,
            UNIQUE (pk, sk)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_keys (
            id TEXT PRIMARY KEY,
            user_email TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            hashed_key TEXT NOT NULL UNIQUE,
            key_prefix TEXT NOT NULL,
            usage_plan_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            last_used TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            usage_count INTEGER NOT NULL DEFAULT 0,
            revoked_at TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            company_name TEXT NOT NULL,
            tier TEXT NOT NULL DEFAULT 'developer',
            token_version INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subscriptions (
            email TEXT PRIMARY KEY,
            customer_id TEXT NOT NULL,
            subscription_id TEXT,
            tier TEXT NOT NULL,
            status TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Secondary indexes mirror the key layout of the deadline items
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_deadlines_gsi1 ON deadlines(gsi1pk, gsi1sk, pk, sk);
        CREATE INDEX IF NOT EXISTS idx_deadlines_gsi2 ON deadlines(gsi2pk, gsi2sk);
        CREATE INDEX IF NOT EXISTS idx_api_keys_user_email ON api_keys(user_email);
        CREATE INDEX IF NOT EXISTS idx_api_keys_expires_at ON api_keys(expires_at);
        CREATE INDEX IF NOT EXISTS idx_subscriptions_customer ON subscriptions(customer_id);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
