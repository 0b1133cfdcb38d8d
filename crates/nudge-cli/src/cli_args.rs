use std::path::PathBuf;

use clap::Parser;
use nudge_reciprocity::UserId;

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "nudge-rs",
    about = "Reciprocates likes and pokes received by a OneBot account",
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "NUDGE_CONFIG",
        default_value = "reciprocation.json",
        help = "Reciprocation config JSON file. A missing file means defaults."
    )]
    pub config: PathBuf,

    #[arg(
        long = "onebot-api-base",
        env = "NUDGE_ONEBOT_API_BASE",
        default_value = "http://127.0.0.1:3000",
        help = "Base URL of the OneBot HTTP API."
    )]
    pub onebot_api_base: String,

    #[arg(
        long = "onebot-access-token",
        env = "NUDGE_ONEBOT_ACCESS_TOKEN",
        hide_env_values = true,
        help = "Bearer access token for the OneBot HTTP API."
    )]
    pub onebot_access_token: Option<String>,

    #[arg(
        long = "request-timeout-ms",
        env = "NUDGE_REQUEST_TIMEOUT_MS",
        default_value_t = 10_000,
        value_parser = parse_positive_u64,
        help = "Per-request timeout for OneBot actions."
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long = "self-id",
        env = "NUDGE_SELF_ID",
        help = "Bot account id. Resolved through get_login_info when omitted."
    )]
    pub self_id: Option<UserId>,

    #[arg(
        long,
        default_value = "-",
        help = "JSONL file of notice events to process, or '-' for stdin."
    )]
    pub events: String,

    #[arg(
        long = "ledger-state",
        env = "NUDGE_LEDGER_STATE",
        help = "Optional VIP ledger state file, loaded at start and saved on exit."
    )]
    pub ledger_state: Option<PathBuf>,

    #[arg(
        long = "max-in-flight",
        default_value_t = 16,
        value_parser = parse_positive_usize,
        help = "Maximum number of events processed concurrently."
    )]
    pub max_in_flight: usize,

    #[arg(
        long = "log-filter",
        env = "NUDGE_LOG",
        default_value = "info",
        help = "Default tracing filter directive; RUST_LOG overrides it."
    )]
    pub log_filter: String,
}
