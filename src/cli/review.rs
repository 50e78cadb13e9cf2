use std::{fmt::Display, io::Write};

use anyhow::Result;
use chrono::{DateTime, TimeZone};

use crate::{storage::target_storage::TargetStorage, targets::review::review_day};

use super::{
    dates::{parse_moment, DATE_EXAMPLES},
    output::write_reviews,
    AppContext,
};

#[derive(Debug, clap::Args)]
pub struct ReviewCommand {
    #[arg(long, help = format!("Day to review, today by default. {DATE_EXAMPLES}"))]
    date: Option<String>,
    #[arg(long, help = "Print the reviews as json")]
    json: bool,
}

/// Reports which daily targets were met on a given day.
pub async fn process_review_command<Tz: TimeZone>(
    ReviewCommand { date, json }: ReviewCommand,
    context: &AppContext,
    now: DateTime<Tz>,
) -> Result<()>
where
    Tz::Offset: Copy + Display,
{
    let date = parse_moment("date", date.as_deref(), &now, context.date_style)?.date_naive();
    let targets = context.targets().load_targets().await?;
    let evaluator = context.evaluator()?;

    let reviews = review_day(&targets, date, &now.timezone(), &evaluator).await?;

    let mut out = std::io::stdout().lock();
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&reviews)?)?;
    } else if reviews.is_empty() {
        writeln!(out, "No daily targets apply to {date}")?;
    } else {
        write_reviews(&mut out, &reviews, &now.timezone())?;
    }
    Ok(())
}
