//! Feeds JSONL notice events through the reciprocation pipeline.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::{JoinError, JoinSet};

use nudge_core::current_unix_timestamp_ms;
use nudge_reciprocity::{
    load_reciprocation_config_file, resolve_self_identity, start_ledger_rollover_scheduler,
    AppreciationRuntime, LedgerRolloverSchedule, OneBotApi, ReciprocationOutcome,
    ReciprocationState, UserId, VipRateLedger,
};

#[derive(Debug, Clone)]
pub(crate) struct ReplayConfig {
    pub(crate) config_path: PathBuf,
    pub(crate) self_id: Option<UserId>,
    pub(crate) ledger_state: Option<PathBuf>,
    pub(crate) max_in_flight: usize,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ReplayRecord {
    pub(crate) line: usize,
    #[serde(flatten)]
    pub(crate) outcome: ReciprocationOutcome,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct ReplaySummary {
    pub(crate) processed: usize,
    pub(crate) reciprocated: usize,
    pub(crate) invalid_lines: usize,
    pub(crate) interrupted: bool,
}

/// Processes every line of `reader`, at most `max_in_flight` at a time.
///
/// Reading stops at end of input, when `shutdown` resolves, or on the first
/// read or emit failure. Events already spawned always run to completion.
pub(crate) async fn replay_events<R, F, S>(
    runtime: &AppreciationRuntime,
    reader: R,
    max_in_flight: usize,
    shutdown: S,
    mut emit: F,
) -> Result<ReplaySummary>
where
    R: AsyncBufRead + Unpin,
    F: FnMut(ReplayRecord) -> Result<()>,
    S: Future<Output = ()>,
{
    let max_in_flight = max_in_flight.max(1);
    let mut summary = ReplaySummary::default();
    let mut failure: Option<anyhow::Error> = None;
    let mut in_flight = JoinSet::new();
    let mut lines = reader.lines();
    let mut line_number = 0_usize;
    tokio::pin!(shutdown);

    loop {
        let next = tokio::select! {
            _ = &mut shutdown => {
                tracing::info!(in_flight = in_flight.len(), "shutdown requested, draining in-flight events");
                summary.interrupted = true;
                break;
            }
            next = lines.next_line() => next,
        };
        let line = match next.context("failed to read event line") {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                failure = Some(error);
                break;
            }
        };
        line_number = line_number.saturating_add(1);
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let raw = match serde_json::from_str::<Value>(trimmed) {
            Ok(raw) => raw,
            Err(error) => {
                tracing::warn!(line = line_number, error = %error, "skipping unparsable event line");
                summary.invalid_lines = summary.invalid_lines.saturating_add(1);
                continue;
            }
        };

        if in_flight.len() >= max_in_flight {
            if let Some(joined) = in_flight.join_next().await {
                if let Err(error) = record(&mut summary, joined, &mut emit) {
                    failure = Some(error);
                    break;
                }
            }
        }
        let runtime = runtime.clone();
        let line = line_number;
        in_flight.spawn(async move {
            let outcome = runtime.handle_event(&raw).await;
            ReplayRecord { line, outcome }
        });
    }

    while let Some(joined) = in_flight.join_next().await {
        if failure.is_some() {
            // Let spawned calls finish so ledger counts match what was sent.
            if let Ok(finished) = joined {
                tally(&mut summary, &finished);
            }
            continue;
        }
        if let Err(error) = record(&mut summary, joined, &mut emit) {
            failure = Some(error);
        }
    }
    match failure {
        Some(error) => Err(error),
        None => Ok(summary),
    }
}

fn tally(summary: &mut ReplaySummary, record: &ReplayRecord) {
    summary.processed = summary.processed.saturating_add(1);
    if record.outcome.is_reciprocated() {
        summary.reciprocated = summary.reciprocated.saturating_add(1);
    }
}

fn record<F>(
    summary: &mut ReplaySummary,
    joined: Result<ReplayRecord, JoinError>,
    emit: &mut F,
) -> Result<()>
where
    F: FnMut(ReplayRecord) -> Result<()>,
{
    let record = joined.context("event task panicked")?;
    tally(summary, &record);
    emit(record)
}

async fn open_events_reader(events: &str) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    if events.trim() == "-" {
        return Ok(Box::new(BufReader::new(tokio::io::stdin())));
    }
    let path = Path::new(events);
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open events file {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

fn checkpoint_ledger(ledger: &VipRateLedger, path: &Path) {
    if let Err(error) = ledger.save(path) {
        tracing::warn!(
            ledger_state = %path.display(),
            error = %error,
            "failed to checkpoint vip ledger"
        );
    }
}

/// Builds shared state, resolves the bot identity and replays `events` until
/// end of input or `shutdown`.
pub(crate) async fn run_replay<F, S>(
    config: ReplayConfig,
    api: Arc<dyn OneBotApi>,
    events: &str,
    shutdown: S,
    mut emit: F,
) -> Result<ReplaySummary>
where
    F: FnMut(ReplayRecord) -> Result<()>,
    S: Future<Output = ()>,
{
    let reciprocation_config = load_reciprocation_config_file(&config.config_path)?;
    let schedule = LedgerRolloverSchedule::from_config(&reciprocation_config.ledger_rollover)?;
    let window_key = schedule.window_key_at(current_unix_timestamp_ms())?;
    let ledger = match &config.ledger_state {
        Some(path) => VipRateLedger::load_for_window(path, &window_key)?,
        None => VipRateLedger::for_window(window_key),
    };
    let ledger = Arc::new(ledger);
    tracing::info!(
        config = %config.config_path.display(),
        enabled = reciprocation_config.auto_reply_enabled,
        strategy = reciprocation_config.strategy.as_str(),
        daily_vip_limit = reciprocation_config.daily_vip_limit,
        blacklist_entries = reciprocation_config.blacklist.len(),
        "loaded reciprocation config"
    );

    let state = Arc::new(ReciprocationState::new(
        reciprocation_config,
        Arc::clone(&ledger),
    ));
    let self_id = match config.self_id {
        Some(self_id) => Some(self_id),
        None => match resolve_self_identity(api.as_ref()).await {
            Ok(self_id) => Some(self_id),
            Err(error) => {
                tracing::warn!(error = %error, "failed to resolve bot self identity");
                None
            }
        },
    };
    state.set_self_id(self_id);

    let mut rollover = start_ledger_rollover_scheduler(schedule, Arc::clone(&ledger))?;
    let runtime = AppreciationRuntime::new(state, api);
    let ledger_state = config.ledger_state.clone();
    // Persist every counted reciprocation so a killed process keeps its limits.
    let emit_and_checkpoint = |record: ReplayRecord| -> Result<()> {
        let reciprocated = record.outcome.is_reciprocated();
        emit(record)?;
        if let (true, Some(path)) = (reciprocated, ledger_state.as_deref()) {
            checkpoint_ledger(&ledger, path);
        }
        Ok(())
    };
    let summary = match open_events_reader(events).await {
        Ok(reader) => {
            replay_events(
                &runtime,
                reader,
                config.max_in_flight,
                shutdown,
                emit_and_checkpoint,
            )
            .await
        }
        Err(error) => Err(error),
    };
    rollover.shutdown().await;

    if let Some(path) = &config.ledger_state {
        ledger.save(path)?;
    }
    let summary = summary?;
    tracing::info!(
        processed = summary.processed,
        reciprocated = summary.reciprocated,
        invalid_lines = summary.invalid_lines,
        interrupted = summary.interrupted,
        "event replay finished"
    );
    Ok(summary)
}
