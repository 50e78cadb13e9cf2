use std::fmt::Display;

use anyhow::Result;
use chrono::{DateTime, TimeZone};
use chrono_english::parse_date_string;
use clap::{CommandFactory, ValueEnum};

use super::Args;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

pub const DATE_EXAMPLES: &str =
    "Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\", \"12:00 16/03/2025\", \"next monday\"";

/// Parses a human date expression relative to `now`. `None` stands for `now` itself.
pub fn parse_moment<Tz: TimeZone>(
    name: &str,
    expression: Option<&str>,
    now: &DateTime<Tz>,
    style: DateStyle,
) -> Result<DateTime<Tz>>
where
    Tz::Offset: Copy,
{
    let Some(expression) = expression else {
        return Ok(now.clone());
    };
    parse_date_string(expression, now.clone(), style.into()).map_err(|e| {
        Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Failed to validate {name} '{expression}': {e}"),
            )
            .into()
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, FixedOffset, TimeZone};

    use super::{parse_moment, DateStyle};

    #[test]
    fn missing_expression_is_now() -> anyhow::Result<()> {
        let now = FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2025, 3, 14, 9, 30, 0)
            .unwrap();
        assert_eq!(parse_moment("now", None, &now, DateStyle::Uk)?, now);
        Ok(())
    }

    #[test]
    fn dialect_changes_day_month_order() -> anyhow::Result<()> {
        let now = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2025, 3, 14, 9, 30, 0)
            .unwrap();
        let uk = parse_moment("date", Some("03/04/2025"), &now, DateStyle::Uk)?;
        let us = parse_moment("date", Some("03/04/2025"), &now, DateStyle::Us)?;
        assert_eq!((uk.day(), uk.month()), (3, 4));
        assert_eq!((us.day(), us.month()), (4, 3));
        Ok(())
    }

    #[test]
    fn garbage_is_rejected() {
        let now = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2025, 3, 14, 9, 30, 0)
            .unwrap();
        assert!(parse_moment("date", Some("the day after never"), &now, DateStyle::Uk).is_err());
    }
}
