//! Target selection and progress evaluation.
//!
//! The flow is: [selector::select_current_target] picks one target, [window::resolve_window]
//! finds the calendar interval it is measured against, and [progress::ProgressEvaluator] asks a
//! [aggregator::CategoryAggregator] how much time was tracked inside that interval.

pub mod aggregator;
pub mod progress;
pub mod review;
pub mod selector;
pub mod stats;
pub mod window;

use std::{collections::BTreeSet, fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(pub u64);

impl Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub u64);

impl Display for CategoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Recurrence of a target. `Tomorrow` is a one-off target for the next calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
    Tomorrow,
}

impl Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Period::Daily => write!(f, "daily"),
            Period::Weekly => write!(f, "weekly"),
            Period::Monthly => write!(f, "monthly"),
            Period::Tomorrow => write!(f, "tomorrow"),
        }
    }
}

impl FromStr for Period {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Period::Daily),
            "weekly" => Ok(Period::Weekly),
            "monthly" => Ok(Period::Monthly),
            "tomorrow" => Ok(Period::Tomorrow),
            other => Err(TargetError::UnknownPeriod(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("unknown target period '{0}'")]
    UnknownPeriod(String),
    #[error("target {id} is invalid: {reason}")]
    InvalidTarget { id: TargetId, reason: String },
}

/// A user's goal of tracked time over a period. Instances are always normalized, see
/// [crate::storage::entities::TargetEntity] for the loose on-disk shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub period: Period,
    pub target_seconds: u64,
    /// Empty means every category counts.
    pub include_category_ids: BTreeSet<CategoryId>,
    /// When absent the target is treated as becoming effective "now".
    pub effective_from: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl Target {
    pub fn new(id: u64, period: Period, target_seconds: u64) -> Self {
        Self {
            id: TargetId(id),
            period,
            target_seconds,
            include_category_ids: BTreeSet::new(),
            effective_from: None,
            is_active: true,
        }
    }

    pub fn with_effective_from(self, effective_from: DateTime<Utc>) -> Self {
        Self {
            effective_from: Some(effective_from),
            ..self
        }
    }

    pub fn with_categories(self, categories: impl IntoIterator<Item = u64>) -> Self {
        Self {
            include_category_ids: categories.into_iter().map(CategoryId).collect(),
            ..self
        }
    }

    pub fn inactive(self) -> Self {
        Self {
            is_active: false,
            ..self
        }
    }

    /// Category filter to hand to an aggregator. `None` means no filtering.
    pub fn category_filter(&self) -> Option<BTreeSet<CategoryId>> {
        if self.include_category_ids.is_empty() {
            None
        } else {
            Some(self.include_category_ids.clone())
        }
    }

    pub fn effective_from_or(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.effective_from.unwrap_or(now)
    }
}
