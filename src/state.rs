//! Shared application state injected into handlers and middleware.

use crate::config::Config;
use crate::db::DbPool;
use crate::services::converter::Converter;
use crate::services::credential_store::CredentialStore;
use crate::services::quota_guard::QuotaGuard;
use crate::services::usage_ledger::UsageLedger;

/// Everything a request needs, cloned cheaply into each handler.
///
/// All storage-backed components share one pool opened at startup.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub credentials: CredentialStore,
    pub ledger: UsageLedger,
    pub guard: QuotaGuard,
    pub converter: Converter,
    pub unify_auth_errors: bool,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(pool: DbPool, config: &Config) -> Self {
        let credentials = CredentialStore::new(pool.clone());
        let ledger = UsageLedger::new(pool.clone());
        Self {
            guard: QuotaGuard::new(credentials.clone(), ledger.clone()),
            ledger,
            credentials,
            converter: Converter::new(
                &config.ffmpeg_path,
                &config.upload_dir,
                &config.output_dir,
            ),
            unify_auth_errors: config.unify_auth_errors,
            max_upload_bytes: config.max_upload_bytes,
            pool,
        }
    }
}
