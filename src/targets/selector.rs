use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use tracing::trace;

use super::Target;

/// Ordering key of a candidate. Variant order matters: any upcoming target beats every standing
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Candidacy {
    /// Becomes effective now or later. Sooner is better.
    Upcoming(DateTime<Utc>),
    /// Already effective. More recent is better.
    Standing(Reverse<DateTime<Utc>>),
}

fn candidacy(target: &Target, now: DateTime<Utc>) -> Candidacy {
    let effective_from = target.effective_from_or(now);
    if effective_from >= now {
        Candidacy::Upcoming(effective_from)
    } else {
        Candidacy::Standing(Reverse(effective_from))
    }
}

/// Picks the target that should currently be highlighted.
///
/// Inactive targets are ignored. The soonest upcoming target wins, otherwise the most recently
/// started one. Targets with identical effective dates are ordered by lowest [TargetId], so the
/// result never depends on the order of `targets`.
pub fn select_current_target<'a>(
    targets: impl IntoIterator<Item = &'a Target>,
    now: DateTime<Utc>,
) -> Option<&'a Target> {
    let selected = targets
        .into_iter()
        .filter(|v| v.is_active)
        .min_by_key(|v| (candidacy(v, now), v.id));
    trace!("Selected target {:?}", selected.map(|v| v.id));
    selected
}
