mod bootstrap_helpers;
mod cli_args;
mod replay_runtime;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use crate::bootstrap_helpers::init_tracing;
use crate::cli_args::Cli;
use crate::replay_runtime::{run_replay, ReplayConfig};
use nudge_onebot::OneBotHttpClient;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_filter);

    let api = OneBotHttpClient::new(
        &cli.onebot_api_base,
        cli.onebot_access_token.clone(),
        cli.request_timeout_ms,
    )?;
    tracing::debug!(api_base = api.api_base(), "onebot client ready");

    let config = ReplayConfig {
        config_path: cli.config.clone(),
        self_id: cli.self_id,
        ledger_state: cli.ledger_state.clone(),
        max_in_flight: cli.max_in_flight,
    };
    let shutdown = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    let stdout = std::io::stdout();
    run_replay(config, Arc::new(api), &cli.events, shutdown, |record| {
        let line = serde_json::to_string(&record).context("failed to encode outcome")?;
        let mut handle = stdout.lock();
        writeln!(handle, "{line}").context("failed to write outcome")?;
        Ok(())
    })
    .await?;
    Ok(())
}
