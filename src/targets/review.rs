use std::fmt::Display;

use chrono::{NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{
    aggregator::CategoryAggregator,
    progress::{EvaluationError, ProgressEvaluator},
    window::{day_window, EvaluationWindow},
    Period, Target, TargetId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Met,
    Missed,
}

impl Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReviewStatus::Met => write!(f, "met"),
            ReviewStatus::Missed => write!(f, "missed"),
        }
    }
}

/// Outcome of a daily target for one finished (or ongoing) day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetReview {
    pub target_id: TargetId,
    pub window: EvaluationWindow,
    pub actual_seconds: u64,
    pub target_seconds: u64,
    pub status: ReviewStatus,
    /// How much was missing. Zero when the target was met.
    pub deficit_seconds: u64,
}

impl TargetReview {
    fn new(target: &Target, window: EvaluationWindow, actual_seconds: u64) -> Self {
        let deficit_seconds = target.target_seconds.saturating_sub(actual_seconds);
        Self {
            target_id: target.id,
            window,
            actual_seconds,
            target_seconds: target.target_seconds,
            status: if deficit_seconds == 0 {
                ReviewStatus::Met
            } else {
                ReviewStatus::Missed
            },
            deficit_seconds,
        }
    }
}

/// Whether a daily target applies to `date`. Targets without an effective date apply to every
/// day.
fn applies_on<Tz: TimeZone>(target: &Target, date: NaiveDate, tz: &Tz) -> bool {
    target.is_active
        && target.period == Period::Daily
        && target
            .effective_from
            .map_or(true, |v| v.with_timezone(tz).date_naive() <= date)
}

/// Reviews every active daily target that was already effective on `date` against that date's
/// window. Results are ordered by target id. The first aggregator failure aborts the review.
#[instrument(skip(targets, tz, evaluator))]
pub async fn review_day<Tz: TimeZone, A: CategoryAggregator>(
    targets: &[Target],
    date: NaiveDate,
    tz: &Tz,
    evaluator: &ProgressEvaluator<A>,
) -> Result<Vec<TargetReview>, EvaluationError> {
    let window = day_window(date, tz);
    let mut applicable = targets
        .iter()
        .filter(|v| applies_on(v, date, tz))
        .collect::<Vec<_>>();
    applicable.sort_by_key(|v| v.id);

    let mut reviews = Vec::with_capacity(applicable.len());
    for target in applicable {
        let aggregation = evaluator
            .aggregate(window, target.category_filter())
            .await?;
        let review = TargetReview::new(target, window, aggregation.total_seconds);
        debug!("Reviewed {} on {date}: {}", target.id, review.status);
        reviews.push(review);
    }
    Ok(reviews)
}
