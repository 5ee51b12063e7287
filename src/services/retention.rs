//! Retention sweeper - daily purge of old usage rows.
//!
//! Runs as a background task that sleeps until the next configured local time
//! of day, purges rows older than the retention window, then re-arms. A failed
//! purge is logged and retried on the next tick; it never stops the loop.

use chrono::{DateTime, Days, Duration, Local, NaiveDate, NaiveTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::services::usage_ledger::UsageLedger;

#[derive(Clone)]
pub struct RetentionSweeper {
    ledger: UsageLedger,
    retention_days: u32,
    run_at: NaiveTime,
}

impl RetentionSweeper {
    pub fn new(ledger: UsageLedger, retention_days: u32, run_at: NaiveTime) -> Self {
        Self {
            ledger,
            retention_days,
            run_at,
        }
    }

    /// Oldest date that is kept when sweeping on `today`.
    pub fn cutoff_for(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_days(Days::new(u64::from(self.retention_days)))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Purge rows dated before `today - retention_days`.
    pub async fn sweep(&self, today: NaiveDate) -> Result<u64, sqlx::Error> {
        self.ledger.purge_older_than(self.cutoff_for(today)).await
    }

    /// One scheduled run. Failures are logged, not returned.
    pub async fn tick(&self, today: NaiveDate) -> Option<u64> {
        let cutoff = self.cutoff_for(today);
        match self.sweep(today).await {
            Ok(purged) => {
                tracing::info!(%cutoff, purged, "Usage retention sweep complete");
                Some(purged)
            }
            Err(e) => {
                tracing::error!(%cutoff, error = %e, "Usage retention sweep failed; retrying next run");
                None
            }
        }
    }

    /// First scheduled instant strictly after `now`.
    pub fn next_run_after(&self, now: DateTime<Local>) -> DateTime<Local> {
        let today = now.date_naive();
        [Some(today), today.succ_opt()]
            .into_iter()
            .flatten()
            .filter_map(|date| date.and_time(self.run_at).and_local_timezone(Local).earliest())
            .find(|candidate| *candidate > now)
            .unwrap_or(now + Duration::hours(24))
    }

    /// Start the sweep loop. Sending `true` on (or dropping) the shutdown
    /// channel stops it without waiting for the pending timer.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let now = Local::now();
            let next = self.next_run_after(now);
            let wait = (next - now).to_std().unwrap_or_default();
            tracing::debug!(next_run = %next, "Usage retention sweep scheduled");

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            self.tick(Local::now().date_naive()).await;
        }

        tracing::info!("Usage retention sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use chrono::TimeZone;

    const KEY: &str = "2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae";

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn two_am() -> NaiveTime {
        NaiveTime::from_hms_opt(2, 0, 0).unwrap()
    }

    fn local(d: u32, hour: u32, minute: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2025, 1, d, hour, minute, 0)
            .earliest()
            .unwrap()
    }

    async fn seeded() -> (RetentionSweeper, UsageLedger) {
        let ledger = UsageLedger::new(test_pool().await);
        for d in 1..=10 {
            ledger.increment_and_get(KEY, day(d)).await.unwrap();
        }
        (RetentionSweeper::new(ledger.clone(), 7, two_am()), ledger)
    }

    #[tokio::test]
    async fn sweep_on_day_ten_keeps_days_three_through_ten() {
        let (sweeper, ledger) = seeded().await;
        assert_eq!(sweeper.cutoff_for(day(10)), day(3));

        assert_eq!(sweeper.sweep(day(10)).await.unwrap(), 2);

        let mut dates: Vec<_> = ledger
            .history(KEY)
            .await
            .unwrap()
            .into_iter()
            .map(|row| row.usage_date)
            .collect();
        dates.sort();
        assert_eq!(dates, (3..=10).map(day).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn sweeping_twice_on_the_same_day_changes_nothing_more() {
        let (sweeper, ledger) = seeded().await;
        assert_eq!(sweeper.tick(day(10)).await, Some(2));
        let once = ledger.history(KEY).await.unwrap();

        assert_eq!(sweeper.tick(day(10)).await, Some(0));
        assert_eq!(ledger.history(KEY).await.unwrap(), once);
    }

    #[tokio::test]
    async fn failed_sweep_is_swallowed() {
        let pool = test_pool().await;
        let sweeper = RetentionSweeper::new(UsageLedger::new(pool.clone()), 7, two_am());
        pool.close().await;

        assert!(sweeper.sweep(day(10)).await.is_err());
        assert_eq!(sweeper.tick(day(10)).await, None);
    }

    #[tokio::test]
    async fn next_run_is_today_before_the_hour_and_tomorrow_after() {
        let sweeper = RetentionSweeper::new(UsageLedger::new(test_pool().await), 7, two_am());

        assert_eq!(sweeper.next_run_after(local(5, 1, 30)), local(5, 2, 0));
        assert_eq!(sweeper.next_run_after(local(5, 2, 0)), local(6, 2, 0));
        assert_eq!(sweeper.next_run_after(local(5, 23, 59)), local(6, 2, 0));
    }

    #[tokio::test]
    async fn shutdown_signal_stops_the_loop_promptly() {
        let sweeper = RetentionSweeper::new(UsageLedger::new(test_pool().await), 7, two_am());
        let (tx, rx) = watch::channel(false);
        let handle = sweeper.spawn(rx);

        tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("sweeper stops before its timer fires")
            .unwrap();
    }

    #[tokio::test]
    async fn dropping_the_sender_also_stops_the_loop() {
        let sweeper = RetentionSweeper::new(UsageLedger::new(test_pool().await), 7, two_am());
        let (tx, rx) = watch::channel(false);
        let handle = sweeper.spawn(rx);

        drop(tx);
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("sweeper stops when the sender is gone")
            .unwrap();
    }
}
