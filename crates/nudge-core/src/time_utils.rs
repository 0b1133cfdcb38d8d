use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, TimeZone};
use chrono_tz::Tz;

/// Returns the current Unix timestamp in milliseconds.
pub fn current_unix_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Parses an IANA timezone name such as `Asia/Shanghai`.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .with_context(|| format!("invalid timezone '{}'", name))
}

/// Local time in `tz` for a Unix millisecond timestamp.
pub fn local_datetime_for_unix_ms(unix_ms: u64, tz: Tz) -> Result<DateTime<Tz>> {
    tz.timestamp_millis_opt(i64::try_from(unix_ms).unwrap_or(i64::MAX))
        .single()
        .ok_or_else(|| anyhow!("timestamp {} is out of range", unix_ms))
}
