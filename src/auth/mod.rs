//! Authentication for the two client populations.
//!
//! Data endpoints are called with API keys, account endpoints with JWT access
//! tokens issued at login. Both middlewares fail with an opaque 401.

pub mod api_key;
pub mod jwt;
pub mod password;

pub use api_key::{api_key_auth, ApiKeyContext, API_KEY_HEADER};
pub use jwt::{jwt_auth, AuthUser};

use subtle::ConstantTimeEq;

/// Perform constant-time string comparison.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    a_bytes.ct_eq(b_bytes).into()
}
