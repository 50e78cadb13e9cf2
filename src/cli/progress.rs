use std::{fmt::Display, io::Write, time::Duration};

use anyhow::Result;
use chrono::{DateTime, TimeZone};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    storage::target_storage::TargetStorage,
    targets::{
        aggregator::CategoryAggregator,
        progress::{EvaluationError, ProgressEvaluator},
    },
    utils::{clock::Clock, shutdown::detect_shutdown},
};

use super::{
    dates::{parse_moment, DATE_EXAMPLES},
    output::write_progress,
    AppContext,
};

#[derive(Debug, clap::Args)]
pub struct ProgressCommand {
    #[arg(long, help = format!("Evaluate as if it was this moment. {DATE_EXAMPLES}"))]
    now: Option<String>,
    #[arg(long, help = "Print the progress record as json")]
    json: bool,
}

#[derive(Debug, clap::Args)]
pub struct WatchCommand {
    #[arg(
        long,
        help = "Seconds between evaluations. Defaults to watch_interval_secs from the configuration"
    )]
    every: Option<u64>,
}

const NO_TARGET: &str = "No active target";

/// Shows progress of the currently highlighted target.
pub async fn process_progress_command<Tz: TimeZone>(
    ProgressCommand { now: at, json }: ProgressCommand,
    context: &AppContext,
    now: DateTime<Tz>,
) -> Result<()>
where
    Tz::Offset: Copy + Display,
{
    let now = parse_moment("now", at.as_deref(), &now, context.date_style)?;
    let targets = context.targets().load_targets().await?;
    let evaluator = context.evaluator()?;

    let record = evaluator.evaluate(&targets, &now).await?;

    let mut out = std::io::stdout().lock();
    match record {
        Some(record) if json => writeln!(out, "{}", serde_json::to_string_pretty(&record)?)?,
        Some(record) => write_progress(&mut out, &record, &now.timezone())?,
        None => writeln!(out, "{NO_TARGET}")?,
    }
    Ok(())
}

/// Re-evaluates progress every interval until Ctrl-C.
pub async fn process_watch_command<Tz: TimeZone>(
    WatchCommand { every }: WatchCommand,
    context: &AppContext,
    clock: &dyn Clock,
    tz: Tz,
) -> Result<()>
where
    Tz::Offset: Display,
{
    let interval = every
        .map(Duration::from_secs)
        .unwrap_or_else(|| context.config.watch_interval());
    let shutdown = CancellationToken::new();
    tokio::spawn(detect_shutdown(shutdown.clone()));

    watch_progress(
        &context.evaluator()?,
        &context.targets(),
        clock,
        &tz,
        interval,
        &shutdown,
        &mut std::io::stdout(),
    )
    .await
}

/// Event loop of the `watch` command. Targets are reloaded on every iteration, so edits show up
/// without a restart.
pub async fn watch_progress<A: CategoryAggregator, Tz: TimeZone>(
    evaluator: &ProgressEvaluator<A>,
    targets: &impl TargetStorage,
    clock: &dyn Clock,
    tz: &Tz,
    interval: Duration,
    shutdown: &CancellationToken,
    out: &mut impl Write,
) -> Result<()>
where
    Tz::Offset: Display,
{
    loop {
        let now = clock.time().with_timezone(tz);
        let loaded = targets.load_targets().await?;

        match evaluator
            .evaluate_until_cancelled(&loaded, &now, shutdown)
            .await
        {
            Ok(Some(record)) => write_progress(out, &record, tz)?,
            Ok(None) => writeln!(out, "{NO_TARGET}")?,
            Err(EvaluationError::Cancelled) => break,
            Err(e) => {
                error!("Failed to evaluate progress {e:?}");
                writeln!(out, "Progress unavailable: {e}")?;
            }
        }
        out.flush()?;

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = clock.sleep(interval) => (),
        }
    }
    info!("Stopped watching progress");
    Ok(())
}
