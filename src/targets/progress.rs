use std::{collections::BTreeSet, time::Duration};

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::utils::percentage::{seconds_percentage, Percentage};

use super::{
    aggregator::{Aggregation, AggregationError, CategoryAggregator},
    selector::select_current_target,
    window::{resolve_window, EvaluationWindow},
    CategoryId, Period, Target, TargetId,
};

#[derive(Debug, Error)]
pub enum EvaluationError {
    /// The aggregator failed. Progress is unknown, which is different from zero progress.
    #[error("tracked time is unavailable: {0}")]
    AggregationUnavailable(#[from] AggregationError),
    #[error("evaluation was cancelled")]
    Cancelled,
}

/// Actual vs. target time of one target inside its current window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub target_id: TargetId,
    pub period: Period,
    pub window: EvaluationWindow,
    pub actual_seconds: u64,
    pub target_seconds: u64,
    pub passed: bool,
}

impl ProgressRecord {
    pub fn new(target: &Target, window: EvaluationWindow, actual_seconds: u64) -> Self {
        Self {
            target_id: target.id,
            period: target.period,
            window,
            actual_seconds,
            target_seconds: target.target_seconds,
            passed: actual_seconds >= target.target_seconds,
        }
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.target_seconds.saturating_sub(self.actual_seconds)
    }

    /// Completion for display purposes, never above 100%.
    pub fn completion(&self) -> Percentage {
        seconds_percentage(self.actual_seconds, self.target_seconds).capped()
    }
}

/// Combines target selection, window resolution and aggregation. Holds no state between calls.
pub struct ProgressEvaluator<A> {
    aggregator: A,
    timeout: Option<Duration>,
}

impl<A: CategoryAggregator> ProgressEvaluator<A> {
    pub fn new(aggregator: A) -> Self {
        Self {
            aggregator,
            timeout: None,
        }
    }

    /// Bounds every aggregator request. Expired requests fail with [AggregationError::TimedOut].
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..self
        }
    }

    /// Selects the current target and evaluates its progress. `Ok(None)` means there is no
    /// active target.
    #[instrument(skip_all)]
    pub async fn evaluate<Tz: TimeZone>(
        &self,
        targets: &[Target],
        now: &DateTime<Tz>,
    ) -> Result<Option<ProgressRecord>, EvaluationError> {
        let Some(target) = select_current_target(targets, now.to_utc()) else {
            debug!("No active target among {} targets", targets.len());
            return Ok(None);
        };
        self.progress_for(target, now).await.map(Some)
    }

    /// Same as [ProgressEvaluator::evaluate], but gives up as soon as `cancellation` fires. The
    /// pending aggregator request is dropped.
    pub async fn evaluate_until_cancelled<Tz: TimeZone>(
        &self,
        targets: &[Target],
        now: &DateTime<Tz>,
        cancellation: &CancellationToken,
    ) -> Result<Option<ProgressRecord>, EvaluationError> {
        tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                debug!("Evaluation cancelled");
                Err(EvaluationError::Cancelled)
            }
            result = self.evaluate(targets, now) => result,
        }
    }

    /// Evaluates a specific target regardless of selection.
    pub async fn progress_for<Tz: TimeZone>(
        &self,
        target: &Target,
        now: &DateTime<Tz>,
    ) -> Result<ProgressRecord, EvaluationError> {
        let window = resolve_window(target.period, target.effective_from, now);
        debug!("Evaluating target {} in {window}", target.id);

        let aggregation = self
            .aggregate(window, target.category_filter())
            .await
            .inspect_err(|e| warn!("Aggregation for target {} failed: {e}", target.id))?;

        let record = ProgressRecord::new(target, window, aggregation.total_seconds);
        info!(
            "Target {} progress {}/{}s",
            record.target_id, record.actual_seconds, record.target_seconds
        );
        Ok(record)
    }

    pub(crate) async fn aggregate(
        &self,
        window: EvaluationWindow,
        categories: Option<BTreeSet<CategoryId>>,
    ) -> Result<Aggregation, AggregationError> {
        let request = self.aggregator.aggregate(window, categories);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .map_err(|_| AggregationError::TimedOut(limit))?,
            None => request.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeSet, time::Duration};

    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
    use tokio_util::sync::CancellationToken;

    use super::{EvaluationError, ProgressEvaluator, ProgressRecord};
    use crate::{
        targets::{
            aggregator::{
                Aggregation, AggregationError, CategoryAggregator, CategorySeconds,
                MockCategoryAggregator,
            },
            window::{resolve_window, EvaluationWindow},
            CategoryId, Period, Target,
        },
        utils::{logging::TEST_LOGGING, percentage::Percentage},
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 5, 12, 0, 0).unwrap()
    }

    fn total(seconds: u64) -> Aggregation {
        Aggregation {
            total_seconds: seconds,
            per_category: vec![CategorySeconds {
                category_id: None,
                seconds,
            }],
        }
    }

    fn returning_total(seconds: u64) -> MockCategoryAggregator {
        let mut aggregator = MockCategoryAggregator::new();
        aggregator
            .expect_aggregate()
            .times(1)
            .returning(move |_, _| Ok(total(seconds)));
        aggregator
    }

    #[tokio::test]
    async fn target_met_exactly_passes() -> Result<()> {
        *TEST_LOGGING;
        let targets = [Target::new(1, Period::Daily, 3600)];

        let evaluator = ProgressEvaluator::new(returning_total(3600));
        let record = evaluator.evaluate(&targets, &now()).await?.unwrap();
        assert!(record.passed);
        assert_eq!(record.actual_seconds, 3600);
        assert_eq!(record.remaining_seconds(), 0);

        let evaluator = ProgressEvaluator::new(returning_total(3599));
        let record = evaluator.evaluate(&targets, &now()).await?.unwrap();
        assert!(!record.passed);
        assert_eq!(record.remaining_seconds(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn category_filter_is_passed_through() -> Result<()> {
        let targets = [Target::new(1, Period::Weekly, 3600).with_categories([5])];

        let mut aggregator = MockCategoryAggregator::new();
        aggregator
            .expect_aggregate()
            .withf(|_, categories| {
                categories.as_ref() == Some(&BTreeSet::from([CategoryId(5)]))
            })
            .times(1)
            .returning(|_, _| Ok(total(10)));

        let record = ProgressEvaluator::new(aggregator)
            .evaluate(&targets, &now())
            .await?
            .unwrap();
        assert_eq!(record.actual_seconds, 10);
        Ok(())
    }

    #[tokio::test]
    async fn empty_category_set_requests_all_categories() -> Result<()> {
        let targets = [Target::new(1, Period::Monthly, 3600)];
        let expected_window = resolve_window(Period::Monthly, None, &now());

        let mut aggregator = MockCategoryAggregator::new();
        aggregator
            .expect_aggregate()
            .withf(move |window, categories| *window == expected_window && categories.is_none())
            .times(1)
            .returning(|_, _| Ok(total(0)));

        let record = ProgressEvaluator::new(aggregator)
            .evaluate(&targets, &now())
            .await?
            .unwrap();
        assert_eq!(record.window, expected_window);
        assert!(!record.passed);
        Ok(())
    }

    #[tokio::test]
    async fn aggregator_failure_is_not_zero_progress() {
        let targets = [Target::new(1, Period::Daily, 3600)];
        let mut aggregator = MockCategoryAggregator::new();
        aggregator.expect_aggregate().returning(|_, _| {
            Err(AggregationError::Unavailable {
                reason: "connection refused".into(),
            })
        });

        let result = ProgressEvaluator::new(aggregator)
            .evaluate(&targets, &now())
            .await;
        assert!(matches!(
            result,
            Err(EvaluationError::AggregationUnavailable(
                AggregationError::Unavailable { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn no_active_target_skips_aggregation() -> Result<()> {
        let targets = [Target::new(1, Period::Daily, 3600).inactive()];
        let mut aggregator = MockCategoryAggregator::new();
        aggregator.expect_aggregate().never();

        let evaluator = ProgressEvaluator::new(aggregator);
        assert_eq!(evaluator.evaluate(&targets, &now()).await?, None);
        assert_eq!(evaluator.evaluate(&[], &now()).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn selected_target_is_the_one_evaluated() -> Result<()> {
        let targets = [
            Target::new(1, Period::Daily, 100).with_effective_from(now() - ChronoDuration::days(1)),
            Target::new(2, Period::Tomorrow, 200)
                .with_effective_from(now() + ChronoDuration::hours(1)),
        ];
        let record = ProgressEvaluator::new(returning_total(50))
            .evaluate(&targets, &now())
            .await?
            .unwrap();
        assert_eq!(record.target_id.0, 2);
        assert_eq!(record.period, Period::Tomorrow);
        assert_eq!(record.target_seconds, 200);
        assert_eq!(
            record.window.start,
            Utc.with_ymd_and_hms(2024, 4, 6, 0, 0, 0).unwrap()
        );
        Ok(())
    }

    struct StalledAggregator;

    #[async_trait]
    impl CategoryAggregator for StalledAggregator {
        async fn aggregate(
            &self,
            _window: EvaluationWindow,
            _categories: Option<BTreeSet<CategoryId>>,
        ) -> Result<Aggregation, AggregationError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_aggregator_times_out() {
        let targets = [Target::new(1, Period::Daily, 3600)];
        let evaluator =
            ProgressEvaluator::new(StalledAggregator).with_timeout(Duration::from_secs(5));

        let result = evaluator.evaluate(&targets, &now()).await;
        assert!(matches!(
            result,
            Err(EvaluationError::AggregationUnavailable(
                AggregationError::TimedOut(_)
            ))
        ));
    }

    #[tokio::test]
    async fn cancelled_evaluation_returns_cancelled() {
        let targets = [Target::new(1, Period::Daily, 3600)];
        let evaluator = ProgressEvaluator::new(StalledAggregator);
        let token = CancellationToken::new();
        token.cancel();

        let result = evaluator
            .evaluate_until_cancelled(&targets, &now(), &token)
            .await;
        assert!(matches!(result, Err(EvaluationError::Cancelled)));
    }

    #[test]
    fn completion_is_capped() {
        let target = Target::new(1, Period::Daily, 3600);
        let window = resolve_window(Period::Daily, None, &now());

        let record = ProgressRecord::new(&target, window, 1800);
        assert_eq!(*record.completion(), 50.);

        let record = ProgressRecord::new(&target, window, 9000);
        assert_eq!(record.completion(), Percentage::FULL);
        assert_eq!(record.remaining_seconds(), 0);

        let zero = ProgressRecord::new(&Target::new(2, Period::Daily, 0), window, 0);
        assert!(zero.passed);
        assert_eq!(zero.completion(), Percentage::FULL);
    }
}
