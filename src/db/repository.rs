//! Database repository shared by all tables.
//!
//! Timestamps are stored as RFC 3339 strings with millisecond precision and a
//! `Z` suffix, so string comparison in SQL matches chronological order.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;

use crate::errors::AppError;

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pub(super) pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

pub(super) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(super) fn parse_ts(raw: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AppError::Internal(format!("stored timestamp {:?}: {}", raw, e)))
}

pub(super) fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>, AppError> {
    raw.as_deref().map(parse_ts).transpose()
}
