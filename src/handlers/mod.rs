//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (multipart body, JSON body, URL params)
//! 2. Calls into the services
//! 3. Returns HTTP response (JSON, file bytes, status code)

/// Key provisioning endpoints
pub mod admin;
/// Media conversion endpoint
pub mod convert;
/// Liveness and health endpoints
pub mod health;
/// Usage reporting
pub mod usage;
