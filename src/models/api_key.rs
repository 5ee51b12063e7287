//! API Key model for authentication.
//!
//! API keys are stored in the database as SHA-256 hashes; the raw secret is never persisted.

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Represents an API key record from the database.
///
/// # Database Table
///
/// Maps to the `api_keys` table with columns:
/// - `id`: Row identifier
/// - `user_id`: Optional owner reference set by provisioning
/// - `hashed_key`: SHA-256 hex digest of the raw key (64 characters, unique)
/// - `permissions`: Comma-separated capability tags (e.g. `convert,admin`)
/// - `revoked`: Once true, the key is permanently rejected
/// - `created_at`: When the key was provisioned
/// - `has_rate_limit`: Whether a daily ceiling applies
/// - `rate_limit`: Requests per calendar day, meaningful only when `has_rate_limit`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKeyRecord {
    pub id: i64,

    pub user_id: Option<i64>,

    /// SHA-256 hash of the actual API key (64 hex characters)
    ///
    /// When a request comes in with "X-Api-Key: abc123", we:
    /// 1. Hash "abc123" with SHA-256
    /// 2. Look up this hash in the database
    /// 3. If found and not revoked, authorize the request
    pub hashed_key: String,

    /// Delimited capability tags; see [`ApiKeyRecord::permissions`].
    pub permissions: String,

    pub revoked: bool,

    pub created_at: NaiveDateTime,

    pub has_rate_limit: bool,

    pub rate_limit: Option<i64>,
}

impl ApiKeyRecord {
    /// Parsed capability set.
    pub fn permissions(&self) -> Permissions {
        Permissions::parse(&self.permissions)
    }

    /// Daily ceiling, or `None` when the key is unlimited.
    ///
    /// A limited key without a positive ceiling yields `Some(0)`, which
    /// rejects every request instead of silently granting unlimited use.
    pub fn daily_limit(&self) -> Option<i64> {
        self.has_rate_limit
            .then(|| self.rate_limit.filter(|limit| *limit > 0).unwrap_or(0))
    }

    /// First eight hex characters of the hash, safe to log.
    pub fn key_prefix(&self) -> &str {
        key_prefix(&self.hashed_key)
    }
}

/// Shortened hash for audit logs. Never call this with a raw key.
pub fn key_prefix(hashed_key: &str) -> &str {
    hashed_key.get(..8).unwrap_or(hashed_key)
}

/// Unordered set of capability tags attached to a key.
///
/// Stored as a comma-separated string; whitespace and empty entries are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(BTreeSet<String>);

impl Permissions {
    pub const CONVERT: &'static str = "convert";
    pub const ADMIN: &'static str = "admin";

    pub fn parse(raw: &str) -> Self {
        Self(
            raw.split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for Permissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|tag| tag.as_ref().trim().to_string())
                .filter(|tag| !tag.is_empty())
                .collect(),
        )
    }
}

/// Serialized form used in the `permissions` column.
impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.0.iter().map(String::as_str).collect();
        f.write_str(&joined.join(","))
    }
}

/// Provisioning input for a new key.
#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub hashed_key: String,
    pub user_id: Option<i64>,
    pub permissions: Permissions,
    /// `None` provisions an unlimited key.
    pub rate_limit: Option<i64>,
}

/// Request body for `POST /api/v1/admin/keys`.
///
/// # Example
///
/// ```json
/// {
///   "permissions": ["convert"],
///   "rate_limit": 100
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    #[serde(default)]
    pub user_id: Option<i64>,

    #[serde(default = "default_permissions")]
    pub permissions: Vec<String>,

    /// Omit (or send null) for an unlimited key.
    #[serde(default)]
    pub rate_limit: Option<i64>,
}

fn default_permissions() -> Vec<String> {
    vec![Permissions::CONVERT.to_string()]
}

/// API key as exposed to administrators. The raw key appears only in the
/// creation response.
#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    pub id: i64,
    pub hashed_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub user_id: Option<i64>,
    pub permissions: Permissions,
    pub revoked: bool,
    pub rate_limit: Option<i64>,
    pub created_at: NaiveDateTime,
}

impl From<ApiKeyRecord> for ApiKeyResponse {
    fn from(record: ApiKeyRecord) -> Self {
        let permissions = record.permissions();
        let rate_limit = record.daily_limit();
        Self {
            id: record.id,
            hashed_key: record.hashed_key,
            api_key: None,
            user_id: record.user_id,
            permissions,
            revoked: record.revoked,
            rate_limit,
            created_at: record.created_at,
        }
    }
}

impl ApiKeyResponse {
    /// Attach the raw key (only on creation).
    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.api_key = Some(api_key);
        self
    }
}
