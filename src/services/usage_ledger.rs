//! Usage ledger: per-key, per-day request counters.
//!
//! # Atomicity Guarantees
//!
//! Every mutation is a single SQL statement. Increments are upserts that
//! create the row at 1 or add 1 in place, so concurrent callers for the same
//! (key, date) never lose an update. No application-level lock is held.

use chrono::NaiveDate;

use crate::db::DbPool;
use crate::models::usage::UsageCounter;

/// Outcome of a conditional consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumption {
    /// One unit was consumed; carries the count after the increment.
    Consumed(i64),
    /// The counter was already at or above the ceiling; nothing was written.
    Exhausted(i64),
}

#[derive(Clone)]
pub struct UsageLedger {
    pool: DbPool,
}

impl UsageLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Count for (key, date), or 0 if no row exists. Never creates a row.
    pub async fn get_count(&self, hashed_key: &str, date: NaiveDate) -> Result<i64, sqlx::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT usage_count FROM api_key_usage WHERE hashed_key = ?1 AND usage_date = ?2",
        )
        .bind(hashed_key)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(count.unwrap_or(0))
    }

    /// Atomically create the row at 1 or increment it, returning the new count.
    pub async fn increment_and_get(
        &self,
        hashed_key: &str,
        date: NaiveDate,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO api_key_usage (hashed_key, usage_date, usage_count)
            VALUES (?1, ?2, 1)
            ON CONFLICT (hashed_key, usage_date)
            DO UPDATE SET usage_count = usage_count + 1
            RETURNING usage_count
            "#,
        )
        .bind(hashed_key)
        .bind(date)
        .fetch_one(&self.pool)
        .await
    }

    /// Increment only while the count is below `limit`, as one statement.
    ///
    /// The admission check and the increment cannot be split by another
    /// writer, so the stored count never exceeds `limit`. When the ceiling is
    /// already reached no row is touched and the current count is reported.
    pub async fn try_consume(
        &self,
        hashed_key: &str,
        date: NaiveDate,
        limit: i64,
    ) -> Result<Consumption, sqlx::Error> {
        if limit <= 0 {
            return Ok(Consumption::Exhausted(self.get_count(hashed_key, date).await?));
        }

        // The conflict branch's WHERE suppresses the update (and the RETURNING row)
        // once the ceiling is reached.
        let consumed = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO api_key_usage (hashed_key, usage_date, usage_count)
            VALUES (?1, ?2, 1)
            ON CONFLICT (hashed_key, usage_date)
            DO UPDATE SET usage_count = usage_count + 1
            WHERE api_key_usage.usage_count < ?3
            RETURNING usage_count
            "#,
        )
        .bind(hashed_key)
        .bind(date)
        .bind(limit)
        .fetch_optional(&self.pool)
        .await?;

        match consumed {
            Some(count) => Ok(Consumption::Consumed(count)),
            None => Ok(Consumption::Exhausted(self.get_count(hashed_key, date).await?)),
        }
    }

    /// Delete every row dated strictly before `cutoff`. Returns the number of rows removed.
    pub async fn purge_older_than(&self, cutoff: NaiveDate) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM api_key_usage WHERE usage_date < ?1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Rows for one key, newest first.
    pub async fn history(&self, hashed_key: &str) -> Result<Vec<UsageCounter>, sqlx::Error> {
        sqlx::query_as::<_, UsageCounter>(
            r#"
            SELECT hashed_key, usage_date, usage_count
            FROM api_key_usage
            WHERE hashed_key = ?1
            ORDER BY usage_date DESC
            "#,
        )
        .bind(hashed_key)
        .fetch_all(&self.pool)
        .await
    }

    /// Number of rows across all keys.
    #[cfg(test)]
    pub async fn row_count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM api_key_usage")
            .fetch_one(&self.pool)
            .await
    }
}
