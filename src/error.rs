//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Local};
use serde_json::json;

use crate::services::quota_guard::Rejection;

pub const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Application-wide error type.
///
/// Each variant maps to a specific HTTP status code and error message.
///
/// # Error Categories
///
/// - **Storage Errors**: Any sqlx::Error reaching the credential or usage tables
/// - **Authentication Errors**: Invalid or revoked API keys
/// - **Quota Errors**: Daily request ceiling reached
/// - **Authorization Errors**: Key lacks a required permission tag
/// - **Conversion Errors**: The external transcoder failed
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Storage is unreachable or a query failed.
    ///
    /// Kept distinct from `InvalidApiKey` so an outage never looks like a bad key.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// API key is missing or unknown.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// API key exists but has been revoked.
    ///
    /// Returns HTTP 401 Unauthorized. With `unified` set the message matches
    /// `InvalidApiKey`, so probing cannot tell revoked keys from unknown ones.
    #[error("API key revoked")]
    RevokedApiKey { unified: bool },

    /// Daily quota reached.
    ///
    /// Returns HTTP 429 Too Many Requests with a reset hint.
    #[error("Daily rate limit reached")]
    QuotaExceeded {
        usage_count: i64,
        rate_limit: i64,
        resets_at: DateTime<Local>,
    },

    /// Authenticated key lacks a permission tag.
    ///
    /// Returns HTTP 403 Forbidden.
    #[error("API key lacks the '{0}' permission")]
    Forbidden(&'static str),

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("Invalid request")]
    InvalidRequest(String),

    /// Requested API key does not exist.
    #[error("API key not found")]
    KeyNotFound,

    /// External transcoder exited unsuccessfully or could not be spawned.
    #[error("Conversion failed")]
    ConversionFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Boundary mapping for a rejected authorization decision.
    pub fn from_rejection(rejection: Rejection, unify_auth_errors: bool) -> Self {
        match rejection {
            Rejection::InvalidKey => AppError::InvalidApiKey,
            Rejection::Revoked => AppError::RevokedApiKey {
                unified: unify_auth_errors,
            },
            Rejection::QuotaExceeded {
                usage_count,
                rate_limit,
                resets_at,
            } => AppError::QuotaExceeded {
                usage_count,
                rate_limit,
                resets_at,
            },
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// # Status Code Mapping
///
/// - `InvalidApiKey` / `RevokedApiKey` → 401 Unauthorized
/// - `QuotaExceeded` → 429 Too Many Requests (+ `Retry-After`)
/// - `Forbidden` → 403 Forbidden
/// - `InvalidRequest` → 400 Bad Request
/// - `KeyNotFound` → 404 Not Found
/// - `Database` / `ConversionFailed` / `Io` → 500 Internal Server Error (details hidden)
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_key",
                self.to_string(),
            ),
            AppError::RevokedApiKey { unified: true } => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_key",
                AppError::InvalidApiKey.to_string(),
            ),
            AppError::RevokedApiKey { unified: false } => (
                StatusCode::UNAUTHORIZED,
                "revoked_api_key",
                self.to_string(),
            ),
            AppError::QuotaExceeded {
                rate_limit,
                resets_at,
                ..
            } => return quota_exceeded_response(rate_limit, resets_at),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden", self.to_string()),
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::KeyNotFound => (StatusCode::NOT_FOUND, "key_not_found", self.to_string()),
            AppError::ConversionFailed(ref detail) => {
                tracing::error!(detail = %detail, "Conversion failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "conversion_failed",
                    self.to_string(),
                )
            }
            AppError::Database(ref e) => {
                tracing::error!(error = %e, "Storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Io(ref e) => {
                tracing::error!(error = %e, "I/O failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

/// 429 response carrying the limit and when the counter resets (next local midnight).
fn quota_exceeded_response(rate_limit: i64, resets_at: DateTime<Local>) -> Response {
    let retry_after = (resets_at - Local::now()).num_seconds().max(1);

    let body = Json(json!({
        "error": {
            "code": "quota_exceeded",
            "message": "Daily rate limit reached",
            "limit": rate_limit,
            "reset_at": resets_at.to_rfc3339(),
            "retry_after_seconds": retry_after
        }
    }));

    let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static(RATE_LIMIT_LIMIT),
        HeaderValue::from(rate_limit),
    );
    headers.insert(
        HeaderName::from_static(RATE_LIMIT_REMAINING),
        HeaderValue::from(0),
    );
    headers.insert(
        HeaderName::from_static(RATE_LIMIT_RESET),
        HeaderValue::from(resets_at.timestamp()),
    );
    headers.insert(axum::http::header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}
