
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};

/// This is the standard way of converting a date to a string in worktarget.
pub fn date_to_record_name(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Offset of 23:59:59 from the start of a wall-clock day.
const LAST_SECOND_OF_DAY: Duration = Duration::seconds(86_399);

/// Upper bound for walking over a DST gap. Real gaps are an hour at most.
const MAX_GAP_STEPS: u32 = 48 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolve {
    Earliest,
    Latest,
}

/// Converts local wall-clock time into an instant. Skipped wall times move forward (for
/// [Resolve::Earliest]) or backward (for [Resolve::Latest]) a minute at a time until a valid
/// instant is found.
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime, resolve: Resolve) -> DateTime<Tz> {
    let step = match resolve {
        Resolve::Earliest => Duration::minutes(1),
        Resolve::Latest => -Duration::minutes(1),
    };
    let mut current = naive;
    for _ in 0..MAX_GAP_STEPS {
        match tz.from_local_datetime(&current) {
            LocalResult::Single(v) => return v,
            LocalResult::Ambiguous(earliest, latest) => {
                return match resolve {
                    Resolve::Earliest => earliest,
                    Resolve::Latest => latest,
                };
            }
            LocalResult::None => current += step,
        }
    }
    tz.from_utc_datetime(&naive)
}

/// First instant of a calendar day in `tz`.
pub fn start_of_day<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Tz> {
    resolve_local(tz, date.and_time(NaiveTime::MIN), Resolve::Earliest)
}

/// 23:59:59 of a calendar day in `tz`. Arithmetic happens on wall-clock time, so DST
/// transitions inside the day don't shift the result.
pub fn end_of_day<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Tz> {
    resolve_local(
        tz,
        date.and_time(NaiveTime::MIN) + LAST_SECOND_OF_DAY,
        Resolve::Latest,
    )
}
