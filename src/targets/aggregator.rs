use std::{collections::BTreeSet, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{window::EvaluationWindow, CategoryId};

/// Tracked time of a single category. `category_id` is `None` for sessions without a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySeconds {
    pub category_id: Option<CategoryId>,
    pub seconds: u64,
}

/// Tracked time inside a window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregation {
    pub total_seconds: u64,
    pub per_category: Vec<CategorySeconds>,
}

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("session data is unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("aggregation timed out after {0:?}")]
    TimedOut(Duration),
}

/// Source of tracked time. The evaluator issues at most one request per evaluation.
///
/// Implementations must be idempotent for a fixed window and filter. `total_seconds` is the sum
/// of all sessions intersecting the window, clipped to its bounds and restricted to `categories`
/// when a filter is given.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CategoryAggregator: Send + Sync {
    async fn aggregate(
        &self,
        window: EvaluationWindow,
        categories: Option<BTreeSet<CategoryId>>,
    ) -> Result<Aggregation, AggregationError>;
}
