use std::{fmt::Display, io::Write};

use ansi_term::Colour;
use anyhow::Result;
use chrono::{Duration, TimeZone};

use crate::{
    targets::{
        progress::ProgressRecord,
        review::{ReviewStatus, TargetReview},
        stats::StatsSummary,
        window::EvaluationWindow,
        Target,
    },
    utils::percentage::seconds_percentage,
};

const WINDOW_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_duration(v: Duration) -> String {
    if v.num_hours() > 0 {
        format!(
            "{}h{}m{}s",
            v.num_hours(),
            v.num_minutes() % 60,
            v.num_seconds() % 60
        )
    } else if v.num_minutes() > 0 {
        format!("{}m{}s", v.num_minutes() % 60, v.num_seconds() % 60)
    } else {
        format!("{}s", v.num_seconds() % 60)
    }
}

fn format_seconds(seconds: u64) -> String {
    format_duration(Duration::seconds(i64::try_from(seconds).unwrap_or(i64::MAX)))
}

pub fn format_window<Tz: TimeZone>(window: &EvaluationWindow, tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    let (start, end) = window.in_timezone(tz);
    format!(
        "{} - {}",
        start.format(WINDOW_FORMAT),
        end.format(WINDOW_FORMAT)
    )
}

pub fn write_progress<Tz: TimeZone>(
    out: &mut impl Write,
    record: &ProgressRecord,
    tz: &Tz,
) -> Result<()>
where
    Tz::Offset: Display,
{
    let status = if record.passed {
        Colour::Green.paint("met")
    } else {
        Colour::Yellow.paint("in progress")
    };
    writeln!(
        out,
        "Target {} ({})\t{}",
        record.target_id,
        record.period,
        format_window(&record.window, tz)
    )?;
    writeln!(
        out,
        "{} / {}\t{}\tremaining {}\t{status}",
        format_seconds(record.actual_seconds),
        format_seconds(record.target_seconds),
        record.completion(),
        format_seconds(record.remaining_seconds()),
    )?;
    Ok(())
}

pub fn write_reviews<Tz: TimeZone>(
    out: &mut impl Write,
    reviews: &[TargetReview],
    tz: &Tz,
) -> Result<()>
where
    Tz::Offset: Display,
{
    for review in reviews {
        let status = match review.status {
            ReviewStatus::Met => Colour::Green.paint(review.status.to_string()),
            ReviewStatus::Missed => Colour::Red.paint(review.status.to_string()),
        };
        writeln!(
            out,
            "Target {}\t{}\t{} / {}\tdeficit {}\t{status}",
            review.target_id,
            format_window(&review.window, tz),
            format_seconds(review.actual_seconds),
            format_seconds(review.target_seconds),
            format_seconds(review.deficit_seconds),
        )?;
    }
    Ok(())
}

pub fn write_targets<Tz: TimeZone>(out: &mut impl Write, targets: &[Target], tz: &Tz) -> Result<()>
where
    Tz::Offset: Display,
{
    for target in targets {
        let effective_from = target
            .effective_from
            .map(|v| v.with_timezone(tz).format(WINDOW_FORMAT).to_string())
            .unwrap_or_else(|| "-".into());
        let categories = if target.include_category_ids.is_empty() {
            "all".to_string()
        } else {
            target
                .include_category_ids
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        writeln!(
            out,
            "{}\t{}\t{}\tfrom {effective_from}\tcategories {categories}{}",
            target.id,
            target.period,
            format_seconds(target.target_seconds),
            if target.is_active { "" } else { "\tinactive" },
        )?;
    }
    Ok(())
}

pub fn write_stats<Tz: TimeZone>(out: &mut impl Write, summary: &StatsSummary, tz: &Tz) -> Result<()>
where
    Tz::Offset: Display,
{
    writeln!(
        out,
        "{}\ttotal {}",
        format_window(&summary.window, tz),
        Colour::Cyan.paint(format_seconds(summary.total_seconds))
    )?;
    for category in &summary.by_category {
        let name = match category.category_id {
            Some(id) => format!("category {id}"),
            None => "uncategorized".to_string(),
        };
        writeln!(
            out,
            "{name}\t{}\t{}",
            format_seconds(category.seconds),
            seconds_percentage(category.seconds, summary.total_seconds),
        )?;
    }
    Ok(())
}
