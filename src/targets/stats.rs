use std::cmp::Reverse;

use chrono::{DateTime, TimeZone, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    aggregator::{CategoryAggregator, CategorySeconds},
    progress::{EvaluationError, ProgressEvaluator},
    window::{resolve_window, EvaluationWindow},
    Period,
};

/// Preset ranges of the stats summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StatsRange {
    Today,
    Week,
    Month,
}

impl StatsRange {
    fn period(self) -> Period {
        match self {
            StatsRange::Today => Period::Daily,
            StatsRange::Week => Period::Weekly,
            StatsRange::Month => Period::Monthly,
        }
    }

    /// Current calendar day, week or month in the time zone of `now`.
    pub fn window<Tz: TimeZone>(self, now: &DateTime<Tz>) -> EvaluationWindow {
        resolve_window(self.period(), None, now)
    }
}

/// Window between two explicit instants, both included. `None` unless `start` is before `end`.
pub fn custom_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<EvaluationWindow> {
    (start < end).then_some(EvaluationWindow { start, end })
}

/// Tracked time inside a window, split by category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub window: EvaluationWindow,
    pub total_seconds: u64,
    /// Largest first. Ties are ordered by category, uncategorized time first.
    pub by_category: Vec<CategorySeconds>,
}

/// Summarizes all tracked time inside `window`, without any category filter.
pub async fn summarize<A: CategoryAggregator>(
    evaluator: &ProgressEvaluator<A>,
    window: EvaluationWindow,
) -> Result<StatsSummary, EvaluationError> {
    let aggregation = evaluator.aggregate(window, None).await?;
    let mut by_category = aggregation.per_category;
    by_category.sort_by_key(|v| (Reverse(v.seconds), v.category_id));
    debug!(
        "Summarized {}s over {} categories in {window}",
        aggregation.total_seconds,
        by_category.len()
    );
    Ok(StatsSummary {
        window,
        total_seconds: aggregation.total_seconds,
        by_category,
    })
}
