use std::{fmt::Display, io::Write};

use anyhow::Result;
use chrono::{DateTime, TimeZone};
use clap::CommandFactory;

use crate::targets::{
    stats::{custom_window, summarize, StatsRange},
    window::EvaluationWindow,
};

use super::{
    dates::{parse_moment, DateStyle, DATE_EXAMPLES},
    output::write_stats,
    AppContext, Args,
};

#[derive(Debug, clap::Args)]
pub struct StatsCommand {
    #[arg(
        long,
        conflicts_with_all = ["start", "end"],
        help = "Preset range. Defaults to today when no range is given"
    )]
    range: Option<StatsRange>,
    #[arg(long, short, requires = "end", help = format!("Start of a custom range. {DATE_EXAMPLES}"))]
    start: Option<String>,
    #[arg(long, short, requires = "start", help = "End of a custom range, included")]
    end: Option<String>,
    #[arg(long, help = "Print the summary as json")]
    json: bool,
}

/// Summarizes tracked time per category.
pub async fn process_stats_command<Tz: TimeZone>(
    command: StatsCommand,
    context: &AppContext,
    now: DateTime<Tz>,
) -> Result<()>
where
    Tz::Offset: Copy + Display,
{
    let window = stats_window(&command, &now, context.date_style)?;
    let summary = summarize(&context.evaluator()?, window).await?;

    let mut out = std::io::stdout().lock();
    if command.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&summary)?)?;
    } else {
        write_stats(&mut out, &summary, &now.timezone())?;
    }
    Ok(())
}

fn stats_window<Tz: TimeZone>(
    command: &StatsCommand,
    now: &DateTime<Tz>,
    style: DateStyle,
) -> Result<EvaluationWindow>
where
    Tz::Offset: Copy,
{
    let (Some(start), Some(end)) = (&command.start, &command.end) else {
        return Ok(command.range.unwrap_or(StatsRange::Today).window(now));
    };
    let start = parse_moment("start", Some(start), now, style)?;
    let end = parse_moment("end", Some(end), now, style)?;
    custom_window(start.to_utc(), end.to_utc()).ok_or_else(|| {
        Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                "Range start must be before its end",
            )
            .into()
    })
}
