//! Cron-driven rollover for the VIP ledger.
//!
//! A rate-limit window starts at each occurrence of the rollover cron and is
//! named by that occurrence's local RFC 3339 timestamp. Every scheduled firing
//! therefore starts a new window, whatever hour the cron names.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat};
use chrono_tz::Tz;
use cron::Schedule;
use nudge_core::{current_unix_timestamp_ms, local_datetime_for_unix_ms, parse_timezone};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::reciprocation_config::LedgerRolloverConfig;
use crate::vip_rate_ledger::VipRateLedger;

#[derive(Debug, Clone)]
/// Parsed rollover schedule.
pub struct LedgerRolloverSchedule {
    schedule: Schedule,
    timezone: Tz,
}

impl LedgerRolloverSchedule {
    pub fn from_config(config: &LedgerRolloverConfig) -> Result<Self> {
        let schedule = Schedule::from_str(&config.cron)
            .with_context(|| format!("invalid cron expression '{}'", config.cron))?;
        let timezone = parse_timezone(&config.timezone)?;
        Ok(Self { schedule, timezone })
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Key of the window containing `unix_ms`: the latest cron occurrence at or before it.
    pub fn window_key_at(&self, unix_ms: u64) -> Result<String> {
        Ok(match self.window_start_at(unix_ms)? {
            Some(start) => start.to_rfc3339_opts(SecondsFormat::Secs, false),
            None => PRE_SCHEDULE_WINDOW_KEY.to_string(),
        })
    }

    fn window_start_at(&self, unix_ms: u64) -> Result<Option<DateTime<Tz>>> {
        // Occurrences fall on whole seconds; searching back from the next second
        // includes an occurrence at exactly `unix_ms`.
        let probe_ms = (unix_ms / 1_000).saturating_add(1).saturating_mul(1_000);
        let probe = local_datetime_for_unix_ms(probe_ms, self.timezone)?;
        Ok(self.schedule.after(&probe).next_back())
    }

    pub fn next_rollover_unix_ms(&self, from_unix_ms: u64) -> Result<u64> {
        let from = local_datetime_for_unix_ms(from_unix_ms, self.timezone)?;
        let next = self
            .schedule
            .after(&from)
            .next()
            .ok_or_else(|| anyhow!("ledger rollover schedule has no future occurrence"))?;
        Ok(u64::try_from(next.timestamp_millis()).unwrap_or(u64::MAX))
    }
}

/// Window key used before the first cron occurrence of a schedule.
pub const PRE_SCHEDULE_WINDOW_KEY: &str = "pre-schedule";

/// Moves `ledger` to the window containing `now_unix_ms`. Returns true when counts were cleared.
pub fn apply_ledger_rollover(
    ledger: &VipRateLedger,
    schedule: &LedgerRolloverSchedule,
    now_unix_ms: u64,
) -> Result<bool> {
    let window_key = schedule.window_key_at(now_unix_ms)?;
    let rolled = ledger.rollover_to(&window_key);
    if rolled {
        tracing::info!(window_key = %window_key, "vip ledger rolled over to a new window");
    }
    Ok(rolled)
}

#[derive(Debug)]
/// Handle to a running rollover task.
pub struct LedgerRolloverHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl LedgerRolloverHandle {
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub async fn shutdown(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Spawns the rollover loop on the current tokio runtime.
pub fn start_ledger_rollover_scheduler(
    schedule: LedgerRolloverSchedule,
    ledger: Arc<VipRateLedger>,
) -> Result<LedgerRolloverHandle> {
    let handle = tokio::runtime::Handle::try_current()
        .context("ledger rollover scheduler requires an active tokio runtime")?;
    apply_ledger_rollover(&ledger, &schedule, current_unix_timestamp_ms())?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = handle.spawn(async move {
        run_ledger_rollover_loop(schedule, ledger, shutdown_rx).await;
    });
    Ok(LedgerRolloverHandle {
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}

async fn run_ledger_rollover_loop(
    schedule: LedgerRolloverSchedule,
    ledger: Arc<VipRateLedger>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        let now = current_unix_timestamp_ms();
        let next = match schedule.next_rollover_unix_ms(now) {
            Ok(next) => next,
            Err(error) => {
                tracing::error!(error = %error, "ledger rollover scheduler stopped");
                return;
            }
        };
        let wait = Duration::from_millis(next.saturating_sub(now).max(1));
        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                // Sleep may wake early by clock skew; never evaluate before the boundary.
                let at = current_unix_timestamp_ms().max(next);
                if let Err(error) = apply_ledger_rollover(&ledger, &schedule, at) {
                    tracing::warn!(error = %error, "ledger rollover failed");
                }
            }
            _ = &mut shutdown_rx => {
                tracing::debug!("ledger rollover scheduler shut down");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{apply_ledger_rollover, start_ledger_rollover_scheduler, LedgerRolloverSchedule};
    use crate::identity::UserId;
    use crate::reciprocation_config::LedgerRolloverConfig;
    use crate::vip_rate_ledger::VipRateLedger;

    fn schedule(cron: &str, timezone: &str) -> LedgerRolloverSchedule {
        LedgerRolloverSchedule::from_config(&LedgerRolloverConfig {
            cron: cron.to_string(),
            timezone: timezone.to_string(),
        })
        .expect("schedule")
    }

    fn midnight_schedule(timezone: &str) -> LedgerRolloverSchedule {
        schedule("0 0 0 * * *", timezone)
    }

    #[test]
    fn unit_next_rollover_is_next_local_midnight() {
        // 2023-11-14T16:30:00Z
        let now = 1_699_979_400_000_u64;
        let utc = midnight_schedule("UTC");
        // 2023-11-15T00:00:00Z
        assert_eq!(utc.next_rollover_unix_ms(now).expect("next"), 1_700_006_400_000);
        let shanghai = midnight_schedule("Asia/Shanghai");
        // 2023-11-16T00:00:00+08:00 == 2023-11-15T16:00:00Z
        assert_eq!(
            shanghai.next_rollover_unix_ms(now).expect("next"),
            1_700_064_000_000
        );
    }

    #[test]
    fn unit_window_key_names_latest_occurrence_at_or_before_now() {
        // 2023-11-14T16:30:00Z
        let now = 1_699_979_400_000_u64;
        assert_eq!(
            midnight_schedule("UTC").window_key_at(now).expect("utc key"),
            "2023-11-14T00:00:00+00:00"
        );
        assert_eq!(
            midnight_schedule("Asia/Shanghai")
                .window_key_at(now)
                .expect("shanghai key"),
            "2023-11-15T00:00:00+08:00"
        );
        // Exactly on the boundary belongs to the new window.
        assert_eq!(
            midnight_schedule("UTC")
                .window_key_at(1_700_006_400_000)
                .expect("boundary key"),
            "2023-11-15T00:00:00+00:00"
        );
    }

    #[test]
    fn functional_rollover_clears_counts_once_per_window() {
        let schedule = midnight_schedule("UTC");
        let ledger = VipRateLedger::for_window("2023-11-14T00:00:00+00:00");
        ledger.increment(UserId::new(77));

        let same_day = 1_699_979_400_000_u64;
        assert!(!apply_ledger_rollover(&ledger, &schedule, same_day).expect("same day"));
        assert_eq!(ledger.count(UserId::new(77)), 1);

        let next_day = 1_700_006_400_000_u64;
        assert!(apply_ledger_rollover(&ledger, &schedule, next_day).expect("next day"));
        assert_eq!(ledger.count(UserId::new(77)), 0);
        assert_eq!(
            ledger.window_key().as_deref(),
            Some("2023-11-15T00:00:00+00:00")
        );
    }

    #[test]
    fn regression_non_midnight_cron_boundary_resets_ledger() {
        let schedule = schedule("0 0 4 * * *", "UTC");
        // 2023-11-15T02:00:00Z, inside the window opened at 2023-11-14T04:00:00Z.
        let started = 1_700_013_600_000_u64;
        let ledger = VipRateLedger::for_window(schedule.window_key_at(started).expect("key"));
        assert_eq!(
            ledger.window_key().as_deref(),
            Some("2023-11-14T04:00:00+00:00")
        );
        for _ in 0..10 {
            ledger.increment(UserId::new(77));
        }

        let boundary = schedule.next_rollover_unix_ms(started).expect("next");
        // 2023-11-15T04:00:00Z
        assert_eq!(boundary, 1_700_020_800_000);
        assert!(apply_ledger_rollover(&ledger, &schedule, boundary).expect("rollover"));
        assert_eq!(ledger.count(UserId::new(77)), 0);
        assert_eq!(
            ledger.window_key().as_deref(),
            Some("2023-11-15T04:00:00+00:00")
        );
    }

    #[test]
    fn regression_schedule_rejects_invalid_cron() {
        let error = LedgerRolloverSchedule::from_config(&LedgerRolloverConfig {
            cron: "every midnight".to_string(),
            timezone: "UTC".to_string(),
        })
        .expect_err("invalid cron");
        assert!(error.to_string().contains("invalid cron expression"));
    }

    #[tokio::test]
    async fn integration_scheduler_starts_and_shuts_down() {
        let ledger = Arc::new(VipRateLedger::new());
        let mut handle =
            start_ledger_rollover_scheduler(midnight_schedule("UTC"), Arc::clone(&ledger))
                .expect("start");
        assert!(handle.is_running());
        assert!(ledger.window_key().is_some());
        handle.shutdown().await;
        assert!(!handle.is_running());
    }
}
