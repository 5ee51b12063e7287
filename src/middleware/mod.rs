//! HTTP middleware components.
//!
//! Middleware are functions that run before route handlers.
//! They can:
//! - Authenticate requests
//! - Enforce daily quotas
//! - Short-circuit requests (reject unauthorized or over-quota callers)

/// API key authentication and quota middleware
pub mod auth;
