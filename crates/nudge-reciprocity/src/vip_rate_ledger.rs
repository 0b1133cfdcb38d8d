//! Per-actor reciprocation counter for the current rate-limit window.
//!
//! The ledger only counts. Window boundaries are injected from outside through
//! [`VipRateLedger::reset`] / [`VipRateLedger::rollover_to`], either by the
//! rollover scheduler or by loading a persisted snapshot from another window.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::identity::UserId;
use nudge_core::write_text_atomic;

pub const VIP_LEDGER_STATE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct VipLedgerStateFile {
    schema_version: u32,
    #[serde(default)]
    window_key: Option<String>,
    #[serde(default)]
    counts: BTreeMap<u64, u32>,
}

#[derive(Debug, Default)]
struct LedgerInner {
    window_key: Option<String>,
    counts: HashMap<UserId, u32>,
}

#[derive(Debug, Default)]
/// Shared counter of reciprocations granted per actor.
pub struct VipRateLedger {
    inner: Mutex<LedgerInner>,
}

impl VipRateLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_window(window_key: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(LedgerInner {
                window_key: Some(window_key.into()),
                counts: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn count(&self, user_id: UserId) -> u32 {
        self.lock().counts.get(&user_id).copied().unwrap_or(0)
    }

    /// Adds one reciprocation for `user_id` and returns the new count.
    pub fn increment(&self, user_id: UserId) -> u32 {
        let mut inner = self.lock();
        let count = inner.counts.entry(user_id).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    pub fn window_key(&self) -> Option<String> {
        self.lock().window_key.clone()
    }

    /// Clears every counter and starts the window named by `window_key`.
    pub fn reset(&self, window_key: Option<String>) {
        let mut inner = self.lock();
        inner.counts.clear();
        inner.window_key = window_key;
    }

    /// Adds one reciprocation for `user_id` only while `window_key` is still the
    /// current window. Returns the actor's count in the current window either way.
    pub fn increment_in_window(&self, user_id: UserId, window_key: Option<&str>) -> u32 {
        let mut inner = self.lock();
        if inner.window_key.as_deref() != window_key {
            return inner.counts.get(&user_id).copied().unwrap_or(0);
        }
        let count = inner.counts.entry(user_id).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Resets only when `window_key` differs from the current window. Returns true on reset.
    pub fn rollover_to(&self, window_key: &str) -> bool {
        let mut inner = self.lock();
        if inner.window_key.as_deref() == Some(window_key) {
            return false;
        }
        inner.counts.clear();
        inner.window_key = Some(window_key.to_string());
        true
    }

    pub fn snapshot(&self) -> BTreeMap<UserId, u32> {
        self.lock()
            .counts
            .iter()
            .map(|(user_id, count)| (*user_id, *count))
            .collect()
    }

    /// Loads a persisted ledger, discarding counts recorded for a different window.
    pub fn load_for_window(path: &Path, window_key: &str) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::for_window(window_key));
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read ledger state {}", path.display()))?;
        let state = serde_json::from_str::<VipLedgerStateFile>(&raw)
            .with_context(|| format!("failed to parse ledger state {}", path.display()))?;
        if state.schema_version != VIP_LEDGER_STATE_SCHEMA_VERSION {
            bail!(
                "unsupported ledger state schema: expected {}, found {}",
                VIP_LEDGER_STATE_SCHEMA_VERSION,
                state.schema_version
            );
        }
        if state.window_key.as_deref() != Some(window_key) {
            tracing::info!(
                ledger_state = %path.display(),
                persisted_window = state.window_key.as_deref().unwrap_or("none"),
                current_window = window_key,
                "discarding vip ledger counts from a previous window"
            );
            return Ok(Self::for_window(window_key));
        }
        let counts = state
            .counts
            .into_iter()
            .filter(|(user_id, _)| *user_id > 0)
            .map(|(user_id, count)| (UserId::new(user_id), count))
            .collect();
        Ok(Self {
            inner: Mutex::new(LedgerInner {
                window_key: Some(window_key.to_string()),
                counts,
            }),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let state = {
            let inner = self.lock();
            VipLedgerStateFile {
                schema_version: VIP_LEDGER_STATE_SCHEMA_VERSION,
                window_key: inner.window_key.clone(),
                counts: inner
                    .counts
                    .iter()
                    .map(|(user_id, count)| (user_id.get(), *count))
                    .collect(),
            }
        };
        let mut payload =
            serde_json::to_string_pretty(&state).context("failed to serialize ledger state")?;
        payload.push('\n');
        write_text_atomic(path, &payload)
            .with_context(|| format!("failed to write ledger state {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::VipRateLedger;
    use crate::identity::UserId;

    #[test]
    fn unit_counts_start_at_zero_and_increment_by_one() {
        let ledger = VipRateLedger::new();
        let actor = UserId::new(77);
        assert_eq!(ledger.count(actor), 0);
        assert_eq!(ledger.increment(actor), 1);
        assert_eq!(ledger.increment(actor), 2);
        assert_eq!(ledger.count(actor), 2);
        assert_eq!(ledger.count(UserId::new(78)), 0);
    }

    #[test]
    fn unit_rollover_resets_only_on_new_window() {
        let ledger = VipRateLedger::for_window("2024-05-01");
        ledger.increment(UserId::new(1));
        assert!(!ledger.rollover_to("2024-05-01"));
        assert_eq!(ledger.count(UserId::new(1)), 1);
        assert!(ledger.rollover_to("2024-05-02"));
        assert_eq!(ledger.count(UserId::new(1)), 0);
        assert_eq!(ledger.window_key().as_deref(), Some("2024-05-02"));
    }

    #[test]
    fn unit_reset_clears_all_counts() {
        let ledger = VipRateLedger::new();
        ledger.increment(UserId::new(1));
        ledger.increment(UserId::new(2));
        ledger.reset(Some("2024-05-03".to_string()));
        assert!(ledger.snapshot().is_empty());
    }

    #[test]
    fn functional_ledger_state_survives_restart_within_the_same_window() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("state/vip-ledger.json");
        let ledger = VipRateLedger::for_window("2024-05-01");
        ledger.increment(UserId::new(77));
        ledger.increment(UserId::new(77));
        ledger.increment(UserId::new(55));
        ledger.save(&path).expect("save");

        let reloaded = VipRateLedger::load_for_window(&path, "2024-05-01").expect("reload");
        assert_eq!(reloaded.count(UserId::new(77)), 2);
        assert_eq!(reloaded.count(UserId::new(55)), 1);

        let next_window = VipRateLedger::load_for_window(&path, "2024-05-02").expect("next window");
        assert!(next_window.snapshot().is_empty());
        assert_eq!(next_window.window_key().as_deref(), Some("2024-05-02"));
    }

    #[test]
    fn regression_increment_is_dropped_after_window_changed() {
        let ledger = VipRateLedger::for_window("2024-05-01");
        let actor = UserId::new(77);
        assert_eq!(ledger.increment_in_window(actor, Some("2024-05-01")), 1);
        let opened = ledger.window_key();
        assert!(ledger.rollover_to("2024-05-02"));
        assert_eq!(ledger.increment_in_window(actor, opened.as_deref()), 0);
        assert_eq!(ledger.count(actor), 0);
        assert_eq!(ledger.increment_in_window(actor, Some("2024-05-02")), 1);
    }

    #[test]
    fn regression_ledger_state_rejects_unknown_schema() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("vip-ledger.json");
        std::fs::write(&path, r#"{"schema_version": 2, "counts": {}}"#).expect("write");
        let error = VipRateLedger::load_for_window(&path, "2024-05-01").expect_err("schema");
        assert!(error.to_string().contains("unsupported ledger state schema"));
    }
}
