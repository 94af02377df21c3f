//! API key records and the request/response bodies of the key lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an API key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Revoked,
}

impl KeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStatus::Active => "active",
            KeyStatus::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(KeyStatus::Active),
            "revoked" => Some(KeyStatus::Revoked),
            _ => None,
        }
    }
}

/// Stored API key. Only the SHA-256 hash of the secret is kept.
#[derive(Debug, Clone)]
pub struct ApiKey {
    pub id: String,
    pub user_email: String,
    pub name: String,
    pub description: Option<String>,
    pub hashed_key: String,
    pub key_prefix: String,
    pub usage_plan_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub status: KeyStatus,
    pub usage_count: i64,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Request body for creating a new API key.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiKeyRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Lifetime in days
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Response returned once, at creation, carrying the plaintext key.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedApiKey {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub api_key: String,
    pub key_prefix: String,
    pub usage_plan_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub message: &'static str,
}

/// API key as listed to its owner, without secret material.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeySummary {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub key_prefix: String,
    pub usage_plan_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub status: KeyStatus,
    pub usage_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl From<ApiKey> for ApiKeySummary {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            name: key.name,
            description: key.description,
            key_prefix: key.key_prefix,
            usage_plan_id: key.usage_plan_id,
            created_at: key.created_at,
            expires_at: key.expires_at,
            last_used: key.last_used,
            status: key.status,
            usage_count: key.usage_count,
            revoked_at: key.revoked_at,
        }
    }
}

/// Body of `GET /v1/auth/api-keys`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyList {
    pub api_keys: Vec<ApiKeySummary>,
}
