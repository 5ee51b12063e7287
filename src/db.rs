//! Database connection pool and migration management.
//!
//! This module provides utilities for:
//! - Creating and managing a SQLite connection pool
//! - Running database migrations automatically

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};

/// Type alias for the SQLite connection pool.
///
/// The pool is opened once at startup and shared by every component that touches storage.
pub type DbPool = Pool<Sqlite>;

/// Create a new SQLite connection pool.
///
/// # Arguments
///
/// * `database_url` - SQLite connection string (e.g. `sqlite://database.db`)
/// * `max_connections` - Upper bound on pooled connections
///
/// # Configuration
///
/// - WAL journal so readers never block the single writer
/// - 5 second busy timeout so concurrent writers queue instead of failing
/// - Database file is created if missing
///
/// # Errors
///
/// Returns an error if the connection string is invalid or the file cannot be opened.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await
}

/// Run database migrations from the `migrations/` directory.
///
/// Migrations are tracked in the `_sqlx_migrations` table, so each one runs only once.
///
/// # Errors
///
/// Returns an error if a migration fails to apply.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    // The macro reads migrations at compile time from ./migrations directory
    sqlx::migrate!("./migrations").run(pool).await
}

/// Fresh in-memory database with the schema applied.
///
/// A single connection that never expires, since every new SQLite
/// in-memory connection would otherwise see an empty database.
#[cfg(test)]
pub async fn test_pool() -> DbPool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:").expect("memory url");
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None::<Duration>)
        .max_lifetime(None::<Duration>)
        .connect_with(options)
        .await
        .expect("open in-memory database");
    run_migrations(&pool).await.expect("apply migrations");
    pool
}

/// File-backed database with several connections, for tests that need
/// real concurrent writers. The file is removed by [`TempDb`]'s drop.
#[cfg(test)]
pub struct TempDb {
    pub pool: DbPool,
    path: std::path::PathBuf,
}

#[cfg(test)]
impl TempDb {
    pub async fn new(max_connections: u32) -> Self {
        let path = std::env::temp_dir().join(format!("mcg-test-{}.db", uuid::Uuid::new_v4()));
        let url = format!("sqlite://{}", path.display());
        let pool = create_pool(&url, max_connections).await.expect("open temp database");
        run_migrations(&pool).await.expect("apply migrations");
        Self { pool, path }
    }
}

#[cfg(test)]
impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", self.path.display(), suffix));
        }
    }
}
