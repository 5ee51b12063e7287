//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables.

/// API key credential model
pub mod api_key;
/// Per-day usage counters
pub mod usage;
