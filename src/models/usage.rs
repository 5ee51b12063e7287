//! Daily usage counter model.

use chrono::NaiveDate;
use serde::Serialize;

/// One row of the `api_key_usage` table: requests consumed by a key on a calendar day.
///
/// `(hashed_key, usage_date)` is the primary key. Rows reference
/// `api_keys.hashed_key` without a foreign key, so they survive revocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct UsageCounter {
    pub hashed_key: String,
    pub usage_date: NaiveDate,
    pub usage_count: i64,
}

/// Response for `GET /api/v1/usage`.
#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub date: NaiveDate,
    pub usage_count: i64,
    /// `None` for unlimited keys.
    pub rate_limit: Option<i64>,
    pub usage_remaining: Option<i64>,
}
