//! Usage reporting for the calling key.

use axum::{Extension, Json, extract::State};
use chrono::Local;

use crate::{
    error::AppError, middleware::auth::AuthContext, models::usage::UsageResponse,
    state::AppState,
};

/// Today's usage for the presented key.
///
/// # Endpoint
///
/// `GET /api/v1/usage`
///
/// This call is itself counted, so `usage_count` includes it.
///
/// ```json
/// {
///   "date": "2025-06-10",
///   "usage_count": 4,
///   "rate_limit": 100,
///   "usage_remaining": 96
/// }
/// ```
pub async fn get_usage(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<UsageResponse>, AppError> {
    let today = Local::now().date_naive();
    let usage_count = state.guard.usage_on(&auth.hashed_key, today).await?;

    Ok(Json(UsageResponse {
        date: today,
        usage_count,
        rate_limit: auth.rate_limit,
        usage_remaining: auth.usage_remaining,
    }))
}
