use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use cron::Schedule;
use serde::{Deserialize, Serialize};

use crate::identity::UserId;

pub const RECIPROCATION_CONFIG_SCHEMA_VERSION: u32 = 1;
pub const RECIPROCATION_CONFIG_FILE_NAME: &str = "reciprocation.json";
pub const DEFAULT_DAILY_VIP_LIMIT: u32 = 10;
pub const DEFAULT_LEDGER_ROLLOVER_CRON: &str = "0 0 0 * * *";
pub const DEFAULT_LEDGER_ROLLOVER_TIMEZONE: &str = "Asia/Shanghai";

fn reciprocation_config_schema_version() -> u32 {
    RECIPROCATION_CONFIG_SCHEMA_VERSION
}

fn default_enabled() -> bool {
    true
}

fn default_daily_vip_limit() -> u32 {
    DEFAULT_DAILY_VIP_LIMIT
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
/// How likes are answered. Pokes are always answered with a poke.
pub enum ReciprocationStrategy {
    #[default]
    PokeOnly,
    SendLike,
}

impl ReciprocationStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PokeOnly => "poke_only",
            Self::SendLike => "send_like",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Day-boundary schedule for resetting the VIP ledger.
pub struct LedgerRolloverConfig {
    /// Six-field cron expression (seconds first).
    pub cron: String,
    pub timezone: String,
}

impl Default for LedgerRolloverConfig {
    fn default() -> Self {
        Self {
            cron: DEFAULT_LEDGER_ROLLOVER_CRON.to_string(),
            timezone: DEFAULT_LEDGER_ROLLOVER_TIMEZONE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Operator-facing reciprocation settings.
pub struct ReciprocationConfig {
    #[serde(default = "reciprocation_config_schema_version")]
    pub schema_version: u32,
    #[serde(
        default = "default_enabled",
        rename = "autoReplyEnabled",
        alias = "autoLikeEnabled"
    )]
    pub auto_reply_enabled: bool,
    #[serde(default)]
    pub blacklist: BTreeSet<UserId>,
    #[serde(
        default = "default_daily_vip_limit",
        rename = "dailyVipLimit",
        alias = "vipLikeLimit"
    )]
    pub daily_vip_limit: u32,
    #[serde(default)]
    pub strategy: ReciprocationStrategy,
    #[serde(default, rename = "ledgerRollover")]
    pub ledger_rollover: LedgerRolloverConfig,
}

impl Default for ReciprocationConfig {
    fn default() -> Self {
        Self {
            schema_version: RECIPROCATION_CONFIG_SCHEMA_VERSION,
            auto_reply_enabled: true,
            blacklist: BTreeSet::new(),
            daily_vip_limit: DEFAULT_DAILY_VIP_LIMIT,
            strategy: ReciprocationStrategy::default(),
            ledger_rollover: LedgerRolloverConfig::default(),
        }
    }
}

impl ReciprocationConfig {
    pub fn is_blacklisted(&self, user_id: UserId) -> bool {
        self.blacklist.contains(&user_id)
    }
}

pub fn load_reciprocation_config_file(path: &Path) -> Result<ReciprocationConfig> {
    if !path.exists() {
        return Ok(ReciprocationConfig::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read reciprocation config {}", path.display()))?;
    let parsed = serde_json::from_str::<ReciprocationConfig>(&raw)
        .with_context(|| format!("failed to parse reciprocation config {}", path.display()))?;
    validate_reciprocation_config(&parsed)
        .with_context(|| format!("invalid reciprocation config {}", path.display()))?;
    Ok(parsed)
}

pub fn validate_reciprocation_config(config: &ReciprocationConfig) -> Result<()> {
    if config.schema_version != RECIPROCATION_CONFIG_SCHEMA_VERSION {
        bail!(
            "unsupported reciprocation config schema_version {} (expected {})",
            config.schema_version,
            RECIPROCATION_CONFIG_SCHEMA_VERSION
        );
    }
    Schedule::from_str(&config.ledger_rollover.cron).with_context(|| {
        format!(
            "invalid ledgerRollover.cron expression '{}'",
            config.ledger_rollover.cron
        )
    })?;
    nudge_core::parse_timezone(&config.ledger_rollover.timezone)?;
    Ok(())
}
