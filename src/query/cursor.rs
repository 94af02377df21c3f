//! Opaque pagination tokens.
//!
//! A token is the base64 encoding of the JSON continuation key of the last
//! item returned. Anything that does not decode back into a key belonging to
//! the queried partition is rejected as corrupted.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use super::keys::{Index, KeyCondition};
use crate::errors::AppError;

/// Position in the GSI1 ordering of the last returned item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationKey {
    #[serde(rename = "PK")]
    pub pk: String,
    #[serde(rename = "SK")]
    pub sk: String,
    #[serde(rename = "GSI1PK")]
    pub gsi1pk: String,
    #[serde(rename = "GSI1SK")]
    pub gsi1sk: String,
}

impl ContinuationKey {
    /// Encode as an opaque token.
    pub fn encode(&self) -> String {
        // Serializing four strings cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        STANDARD.encode(json)
    }

    /// Decode a token produced by [`ContinuationKey::encode`].
    pub fn decode(token: &str) -> Result<Self, AppError> {
        let bytes = STANDARD
            .decode(token.trim())
            .map_err(|_| AppError::InvalidToken)?;
        serde_json::from_slice(&bytes).map_err(|_| AppError::InvalidToken)
    }

    /// Whether this key can resume the given query.
    pub fn belongs_to(&self, condition: &KeyCondition) -> bool {
        condition.index == Index::Gsi1 && self.gsi1pk == condition.partition
    }
}
