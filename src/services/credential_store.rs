//! Credential store: hashed API keys, their revocation state and daily limits.
//!
//! The request path only ever calls [`CredentialStore::lookup`]. Insertion and
//! revocation belong to provisioning (startup bootstrap and the admin routes).

use sha2::{Digest, Sha256};

use crate::db::DbPool;
use crate::models::api_key::{ApiKeyRecord, NewApiKey, key_prefix};

const RECORD_COLUMNS: &str =
    "id, user_id, hashed_key, permissions, revoked, created_at, has_rate_limit, rate_limit";

/// Hash a raw API key with SHA-256 and hex-encode the digest.
///
/// This is the only form in which a key is stored or compared.
pub fn hash_api_key(raw_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a fresh raw API key.
///
/// # Output
///
/// `sk_` followed by 48 hex characters (24 random bytes)
pub fn generate_api_key() -> String {
    let bytes: [u8; 24] = rand::random();
    format!("sk_{}", hex::encode(bytes))
}

/// Read access to `api_keys`, plus the provisioning writes.
#[derive(Clone)]
pub struct CredentialStore {
    pool: DbPool,
}

impl CredentialStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Find the record for a hashed key. Pure read.
    pub async fn lookup(&self, hashed_key: &str) -> Result<Option<ApiKeyRecord>, sqlx::Error> {
        sqlx::query_as::<_, ApiKeyRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM api_keys WHERE hashed_key = ?1"
        ))
        .bind(hashed_key)
        .fetch_optional(&self.pool)
        .await
    }

    /// Provision a new key.
    ///
    /// # Errors
    ///
    /// - `Database`: the hash already exists (unique violation) or a
    ///   limited key was given a non-positive ceiling (check violation)
    pub async fn insert(&self, new_key: &NewApiKey) -> Result<ApiKeyRecord, sqlx::Error> {
        let record = sqlx::query_as::<_, ApiKeyRecord>(&format!(
            r#"
            INSERT INTO api_keys (hashed_key, user_id, permissions, has_rate_limit, rate_limit)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(&new_key.hashed_key)
        .bind(new_key.user_id)
        .bind(new_key.permissions.to_string())
        .bind(new_key.rate_limit.is_some())
        .bind(new_key.rate_limit)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            key_prefix = %record.key_prefix(),
            permissions = %record.permissions,
            rate_limit = ?record.daily_limit(),
            "API key provisioned"
        );

        Ok(record)
    }

    /// Provision a key unless its hash is already present. Returns whether a row was added.
    pub async fn insert_if_absent(&self, new_key: &NewApiKey) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO api_keys (hashed_key, user_id, permissions, has_rate_limit, rate_limit)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (hashed_key) DO NOTHING
            "#,
        )
        .bind(&new_key.hashed_key)
        .bind(new_key.user_id)
        .bind(new_key.permissions.to_string())
        .bind(new_key.rate_limit.is_some())
        .bind(new_key.rate_limit)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Revoke a key. Revocation is permanent; revoking twice is a no-op.
    ///
    /// Returns `false` if no key has this hash.
    pub async fn revoke(&self, hashed_key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE api_keys SET revoked = TRUE WHERE hashed_key = ?1")
            .bind(hashed_key)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            tracing::warn!(key_prefix = %key_prefix(hashed_key), "API key revoked");
        }

        Ok(result.rows_affected() > 0)
    }

    /// All provisioned keys, oldest first.
    pub async fn list(&self) -> Result<Vec<ApiKeyRecord>, sqlx::Error> {
        sqlx::query_as::<_, ApiKeyRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM api_keys ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
    }
}
