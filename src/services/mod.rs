//! Business logic services.
//!
//! Services contain core logic separated from HTTP handlers: credential
//! lookup, usage accounting, the authorization decision, retention and the
//! external media conversion.

pub mod converter;
pub mod credential_store;
pub mod quota_guard;
pub mod retention;
pub mod usage_ledger;
