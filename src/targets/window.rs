use std::fmt::Display;

use chrono::{DateTime, Datelike, Days, Duration, Months, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::time::{end_of_day, start_of_day};

use super::Period;

/// Interval a target is measured against. Both ends are inclusive at second granularity, so a
/// daily window ends at 23:59:59 rather than the next midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvaluationWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl EvaluationWindow {
    fn from_days<Tz: TimeZone>(first: NaiveDate, last: NaiveDate, tz: &Tz) -> Self {
        Self {
            start: start_of_day(first, tz).to_utc(),
            end: end_of_day(last, tz).to_utc(),
        }
    }

    /// Exclusive upper bound, one second after [EvaluationWindow::end]. Used for clipping
    /// sessions so the final second is counted.
    pub fn end_exclusive(&self) -> DateTime<Utc> {
        self.end + Duration::seconds(1)
    }

    pub fn in_timezone<Tz: TimeZone>(&self, tz: &Tz) -> (DateTime<Tz>, DateTime<Tz>) {
        (self.start.with_timezone(tz), self.end.with_timezone(tz))
    }
}

impl Display for EvaluationWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} .. {}]", self.start, self.end)
    }
}

/// Resolves the window of a target with the given `period` and `effective_from` relative to
/// `now`. Calendar days are taken in the time zone of `now`.
///
/// A missing `effective_from` is the same as `now`, which makes every period fall back to the
/// current one (and `tomorrow` to the next day).
pub fn resolve_window<Tz: TimeZone>(
    period: Period,
    effective_from: Option<DateTime<Utc>>,
    now: &DateTime<Tz>,
) -> EvaluationWindow {
    let tz = now.timezone();
    let today = now.date_naive();
    // Only an effective date strictly in the future moves the window.
    let upcoming = effective_from
        .filter(|v| *v > now.to_utc())
        .map(|v| v.with_timezone(&tz).date_naive());
    let reference = upcoming.unwrap_or(today);

    match period {
        Period::Tomorrow => {
            let tomorrow = today.succ_opt().unwrap_or(today);
            let effective_day = effective_from
                .map(|v| v.with_timezone(&tz).date_naive())
                .unwrap_or(today);
            let anchor = effective_day.max(tomorrow);
            EvaluationWindow::from_days(anchor, anchor, &tz)
        }
        Period::Daily => EvaluationWindow::from_days(reference, reference, &tz),
        Period::Weekly => {
            let (monday, sunday) = week_bounds(reference);
            EvaluationWindow::from_days(monday, sunday, &tz)
        }
        Period::Monthly => {
            let (first, last) = month_bounds(reference);
            EvaluationWindow::from_days(first, last, &tz)
        }
    }
}

/// Window covering a single calendar day. Used when reviewing past days.
pub fn day_window<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> EvaluationWindow {
    EvaluationWindow::from_days(date, date, tz)
}

/// Monday on or before `date` and the Sunday after it.
pub fn week_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let since_monday = u64::from(date.weekday().num_days_from_monday());
    let monday = date.checked_sub_days(Days::new(since_monday)).unwrap_or(date);
    let sunday = monday.checked_add_days(Days::new(6)).unwrap_or(monday);
    (monday, sunday)
}

/// First and last calendar day of the month containing `date`.
pub fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = date.with_day(1).unwrap_or(date);
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|v| v.pred_opt())
        .unwrap_or(date);
    (first, last)
}
