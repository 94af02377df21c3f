//! Data models for the CompliCal service.
//!
//! Public bodies serialize in camelCase to match the published API.

mod api_key;
mod billing;
mod deadline;
mod user;

pub use api_key::*;
pub use billing::*;
pub use deadline::*;
pub use user::*;
