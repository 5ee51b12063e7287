//! API key authentication and quota middleware.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the API key from the `X-Api-Key` or `Authorization` header
//! 2. Ask the quota guard for a decision (hash, lookup, revocation, daily quota)
//! 3. Inject authentication context into the request
//! 4. Reject with 401 / 429, or 500 when storage is unavailable

use crate::{
    error::{AppError, RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING},
    models::api_key::{Permissions, key_prefix},
    services::quota_guard::Decision,
    state::AppState,
};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Authentication context attached to authenticated requests.
///
/// This struct is inserted into the request's extension map and can be
/// extracted by route handlers to know who made the request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// SHA-256 hex digest of the presented key
    pub hashed_key: String,

    /// Capability tags granted to the key
    pub permissions: Permissions,

    /// Daily ceiling (`None` = unlimited)
    pub rate_limit: Option<i64>,

    /// Requests left today after this one (`None` = unlimited)
    pub usage_remaining: Option<i64>,
}

impl AuthContext {
    /// Fail with 403 unless the key carries `tag`.
    pub fn require(&self, tag: &'static str) -> Result<(), AppError> {
        if self.permissions.contains(tag) {
            Ok(())
        } else {
            tracing::warn!(key_prefix = %key_prefix(&self.hashed_key), permission = tag, "Missing permission");
            Err(AppError::Forbidden(tag))
        }
    }
}

/// Pull the raw key from `X-Api-Key`, falling back to `Authorization: Bearer <key>`.
pub fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers.get(API_KEY_HEADER).and_then(|h| h.to_str().ok()) {
        return Some(key);
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// API key authentication middleware function.
///
/// # Flow
///
/// 1. Extract the raw key from the request headers (missing → 401)
/// 2. `QuotaGuard::authorize` decides; each admitted request consumes one unit of quota
/// 3. Rejections become `AppError`s (401 / 429); storage faults become 500
/// 4. If allowed: inject `AuthContext`, call next handler, add rate limit headers
///
/// # Headers
///
/// ```text
/// X-Api-Key: sk_abc123
/// Authorization: Bearer sk_abc123
/// ```
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let api_key = extract_api_key(request.headers()).ok_or(AppError::InvalidApiKey)?;

    let grant = match state.guard.authorize(api_key).await? {
        Decision::Allowed(grant) => grant,
        Decision::Rejected(rejection) => {
            return Err(AppError::from_rejection(rejection, state.unify_auth_errors));
        }
    };

    let auth_context = AuthContext {
        hashed_key: grant.hashed_key,
        permissions: grant.permissions,
        rate_limit: grant.rate_limit,
        usage_remaining: grant.usage_remaining,
    };
    let quota = auth_context.rate_limit.zip(auth_context.usage_remaining);

    // Route handlers can now extract this using Extension<AuthContext>
    request.extensions_mut().insert(auth_context);

    let mut response = next.run(request).await;

    if let Some((limit, remaining)) = quota {
        let headers = response.headers_mut();
        headers.insert(HeaderName::from_static(RATE_LIMIT_LIMIT), HeaderValue::from(limit));
        headers.insert(
            HeaderName::from_static(RATE_LIMIT_REMAINING),
            HeaderValue::from(remaining),
        );
    }

    Ok(response)
}
