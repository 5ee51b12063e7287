//! Quota guard - the authorization decision for every protected request.
//!
//! This service handles:
//! - Credential verification (hash, lookup, revocation)
//! - Daily quota enforcement
//! - Usage accounting for admitted requests
//!
//! # Order of Checks
//!
//! 1. Hash the raw key
//! 2. Unknown hash → `InvalidKey` (no ledger access)
//! 3. Revoked → `Revoked` (no ledger access)
//! 4. Unlimited → `Allowed` (no ledger write)
//! 5. Limited → one conditional consume; exhausted → `QuotaExceeded` (nothing written)
//!
//! Rejections are returned as values. Only storage failures are `Err`.

use chrono::{DateTime, Duration, Local, NaiveDate};

use crate::models::api_key::{Permissions, key_prefix};
use crate::services::credential_store::{CredentialStore, hash_api_key};
use crate::services::usage_ledger::{Consumption, UsageLedger};

/// Outcome of [`QuotaGuard::authorize`].
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Allowed(Grant),
    Rejected(Rejection),
}

/// Context of an admitted request.
#[derive(Debug, Clone, PartialEq)]
pub struct Grant {
    pub hashed_key: String,
    pub permissions: Permissions,
    /// Daily ceiling; `None` for unlimited keys.
    pub rate_limit: Option<i64>,
    /// `rate_limit - count` after this request; `None` for unlimited keys.
    pub usage_remaining: Option<i64>,
}

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    InvalidKey,
    Revoked,
    QuotaExceeded {
        usage_count: i64,
        rate_limit: i64,
        /// Next local midnight, when a fresh counter starts.
        resets_at: DateTime<Local>,
    },
}

#[derive(Clone)]
pub struct QuotaGuard {
    credentials: CredentialStore,
    ledger: UsageLedger,
}

impl QuotaGuard {
    pub fn new(credentials: CredentialStore, ledger: UsageLedger) -> Self {
        Self {
            credentials,
            ledger,
        }
    }

    /// Authorize a request against today's (local) quota.
    pub async fn authorize(&self, raw_key: &str) -> Result<Decision, sqlx::Error> {
        self.authorize_at(raw_key, Local::now()).await
    }

    /// Authorize a request as if it arrived at `now`.
    pub async fn authorize_at(
        &self,
        raw_key: &str,
        now: DateTime<Local>,
    ) -> Result<Decision, sqlx::Error> {
        let hashed_key = hash_api_key(raw_key);

        let Some(record) = self.credentials.lookup(&hashed_key).await? else {
            tracing::warn!(key_prefix = %key_prefix(&hashed_key), "Rejected unknown API key");
            return Ok(Decision::Rejected(Rejection::InvalidKey));
        };

        if record.revoked {
            tracing::warn!(key_prefix = %record.key_prefix(), "Rejected revoked API key");
            return Ok(Decision::Rejected(Rejection::Revoked));
        }

        let permissions = record.permissions();

        let Some(rate_limit) = record.daily_limit() else {
            return Ok(Decision::Allowed(Grant {
                hashed_key,
                permissions,
                rate_limit: None,
                usage_remaining: None,
            }));
        };

        let today = now.date_naive();
        match self.ledger.try_consume(&hashed_key, today, rate_limit).await? {
            Consumption::Consumed(count) => Ok(Decision::Allowed(Grant {
                hashed_key,
                permissions,
                rate_limit: Some(rate_limit),
                usage_remaining: Some((rate_limit - count).max(0)),
            })),
            Consumption::Exhausted(usage_count) => {
                tracing::warn!(
                    key_prefix = %record.key_prefix(),
                    usage_count,
                    rate_limit,
                    "Rate limit exceeded"
                );
                Ok(Decision::Rejected(Rejection::QuotaExceeded {
                    usage_count,
                    rate_limit,
                    resets_at: next_local_midnight(now),
                }))
            }
        }
    }

    /// Today's count for a key, without consuming anything.
    pub async fn usage_on(&self, hashed_key: &str, date: NaiveDate) -> Result<i64, sqlx::Error> {
        self.ledger.get_count(hashed_key, date).await
    }
}

/// Start of the next local calendar day after `now`.
///
/// Falls back to 24 hours from `now` if local midnight does not exist (DST gap).
pub fn next_local_midnight(now: DateTime<Local>) -> DateTime<Local> {
    now.date_naive()
        .succ_opt()
        .and_then(|tomorrow| tomorrow.and_hms_opt(0, 0, 0))
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .unwrap_or(now + Duration::hours(24))
}
