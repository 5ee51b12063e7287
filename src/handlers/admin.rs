//! Key provisioning endpoints (require the `admin` permission).
//!
//! - GET  /api/v1/admin/keys - list keys (hashes only)
//! - POST /api/v1/admin/keys - create a key; the raw key is returned once
//! - POST /api/v1/admin/keys/{hashed_key}/revoke - revoke a key permanently
//! - GET  /api/v1/admin/keys/{hashed_key}/usage - retained daily counters for a key

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::api_key::{ApiKeyResponse, CreateApiKeyRequest, NewApiKey, Permissions},
    models::usage::UsageCounter,
    services::credential_store::{generate_api_key, hash_api_key},
    state::AppState,
};

pub async fn list_keys(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<ApiKeyResponse>>, AppError> {
    auth.require(Permissions::ADMIN)?;

    let keys = state.credentials.list().await?;
    Ok(Json(keys.into_iter().map(ApiKeyResponse::from).collect()))
}

/// Create a new API key.
///
/// # Request Body
///
/// ```json
/// {
///   "permissions": ["convert"],
///   "rate_limit": 100
/// }
/// ```
///
/// # Response
///
/// 201 Created with the key record. `api_key` holds the raw secret and is
/// never retrievable again.
pub async fn create_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateApiKeyRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require(Permissions::ADMIN)?;

    if let Some(limit) = request.rate_limit {
        if limit <= 0 {
            return Err(AppError::InvalidRequest(
                "rate_limit must be positive".to_string(),
            ));
        }
    }

    let permissions: Permissions = request.permissions.iter().collect();
    if permissions.is_empty() {
        return Err(AppError::InvalidRequest(
            "At least one permission is required".to_string(),
        ));
    }

    let api_key = generate_api_key();
    let record = state
        .credentials
        .insert(&NewApiKey {
            hashed_key: hash_api_key(&api_key),
            user_id: request.user_id,
            permissions,
            rate_limit: request.rate_limit,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiKeyResponse::from(record).with_api_key(api_key)),
    ))
}

pub async fn revoke_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(hashed_key): Path<String>,
) -> Result<StatusCode, AppError> {
    auth.require(Permissions::ADMIN)?;

    if state.credentials.revoke(&hashed_key).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::KeyNotFound)
    }
}

/// Daily counters still inside the retention window, newest first.
///
/// Works for revoked keys too; usage rows outlive revocation.
pub async fn key_usage(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(hashed_key): Path<String>,
) -> Result<Json<Vec<UsageCounter>>, AppError> {
    auth.require(Permissions::ADMIN)?;

    if state.credentials.lookup(&hashed_key).await?.is_none() {
        return Err(AppError::KeyNotFound);
    }

    Ok(Json(state.ledger.history(&hashed_key).await?))
}
