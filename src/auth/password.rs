//! Password hashing with Argon2, salted by the account id.

use argon2::Argon2;

use super::constant_time_compare;
use crate::errors::AppError;

const HASH_LENGTH: usize = 32;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Hash a password, returning the hex-encoded output.
pub fn hash_password(password: &str, user_id: &str) -> Result<String, AppError> {
    let mut hash = [0u8; HASH_LENGTH];
    Argon2::default()
        .hash_password_into(password.as_bytes(), user_id.as_bytes(), &mut hash)
        .map_err(|e| AppError::Internal(format!("argon2: {}", e)))?;
    Ok(hex::encode(hash))
}

pub fn verify_password(password: &str, user_id: &str, stored: &str) -> Result<bool, AppError> {
    let computed = hash_password(password, user_id)?;
    Ok(constant_time_compare(&computed, stored))
}

/// Salt used when no account matches a login.
const UNKNOWN_ACCOUNT_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Spend the same hashing work as a real verification and fail.
///
/// Login calls this for unknown emails so response timing does not reveal
/// which addresses are registered.
pub fn verify_unknown_account(password: &str) -> Result<bool, AppError> {
    let computed = hash_password(password, UNKNOWN_ACCOUNT_ID)?;
    let _ = constant_time_compare(&computed, &"0".repeat(HASH_LENGTH * 2));
    Ok(false)
}
