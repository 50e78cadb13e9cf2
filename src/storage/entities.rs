use chrono::Duration;
use chrono::Utc;

use chrono::DateTime;
use chrono::NaiveTime;
use serde::Deserialize;
use serde::Serialize;

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::targets::{CategoryId, Period, Target, TargetError, TargetId};

/// A finished tracking session as stored on disk. Sessions are saved in the file of the UTC day
/// they started on.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize, Clone)]
pub struct SessionEntity {
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start: DateTime<Utc>,
    #[serde(with = "duration_ser")]
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<Arc<str>>,
}

impl SessionEntity {
    /// Creates a session spanning from `start` to `end`. Returns `None` if `end` is before
    /// `start`.
    pub fn between(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        category_id: Option<CategoryId>,
    ) -> Option<Self> {
        if end < start {
            return None;
        }
        Some(Self {
            category_id,
            start,
            duration: end - start,
            note: None,
        })
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.start + self.duration
    }

    /// Splits a session into 2 halves, 1 before split, 1 after.
    pub fn split_by(self, split: DateTime<Utc>) -> (Option<SessionEntity>, Option<SessionEntity>) {
        let end = self.end();
        if split < self.start {
            (None, Some(self))
        } else if split >= end {
            (Some(self), None)
        } else {
            let before = SessionEntity {
                category_id: self.category_id,
                start: self.start,
                duration: split - self.start,
                note: self.note.clone(),
            };
            let after = SessionEntity {
                category_id: self.category_id,
                start: split,
                duration: end - split,
                note: self.note,
            };
            (Some(before), Some(after))
        }
    }

    /// Returns the part of the session inside `[from, to)`. Because the session might happen
    /// outside of the interval the result is optional.
    pub fn clamp(self, from: DateTime<Utc>, to: DateTime<Utc>) -> Option<SessionEntity> {
        self.split_by(from).1.and_then(|v| v.split_by(to).0)
    }

    /// Cuts the session at every UTC midnight it crosses, so each part belongs to a single day
    /// file.
    pub fn split_by_days(self) -> Vec<SessionEntity> {
        let mut parts = vec![];
        let mut rest = Some(self);
        while let Some(current) = rest.take() {
            let Some(next_day) = current.start.date_naive().succ_opt() else {
                parts.push(current);
                break;
            };
            let (before, after) = current.split_by(next_day.and_time(NaiveTime::MIN).and_utc());
            parts.extend(before);
            rest = after;
        }
        parts
    }

    pub fn with_note(self, note: impl Into<Arc<str>>) -> Self {
        Self {
            note: Some(note.into()),
            ..self
        }
    }

    pub fn seconds(&self) -> u64 {
        u64::try_from(self.duration.num_seconds()).unwrap_or(0)
    }
}

mod duration_ser {
    use chrono::Duration;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(duration.num_seconds())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = i64::deserialize(deserializer)?;
        let duration = Duration::seconds(s);
        Ok(duration)
    }
}

/// Target record as it is found in `targets.json`. Older records use `target_type`,
/// `category_ids` and `is_enabled`, so both spellings are accepted here and collapsed by
/// [TryFrom] into a [Target].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetEntity {
    pub id: u64,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default, skip_serializing)]
    pub target_type: Option<String>,
    pub target_seconds: i64,
    #[serde(default)]
    pub include_category_ids: Option<Vec<u64>>,
    #[serde(default, skip_serializing)]
    pub category_ids: Option<Vec<u64>>,
    #[serde(default)]
    pub effective_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing)]
    pub is_enabled: Option<bool>,
}

impl TryFrom<TargetEntity> for Target {
    type Error = TargetError;

    fn try_from(entity: TargetEntity) -> Result<Self, Self::Error> {
        let id = TargetId(entity.id);
        let invalid = |reason: String| TargetError::InvalidTarget { id, reason };

        let period = match entity.period.or(entity.target_type) {
            Some(v) => v.parse::<Period>().map_err(|e| invalid(e.to_string()))?,
            None => Period::Daily,
        };
        let target_seconds = u64::try_from(entity.target_seconds).map_err(|_| {
            invalid(format!(
                "target_seconds must not be negative, got {}",
                entity.target_seconds
            ))
        })?;
        let include_category_ids = entity
            .include_category_ids
            .or(entity.category_ids)
            .unwrap_or_default()
            .into_iter()
            .map(CategoryId)
            .collect::<BTreeSet<_>>();

        Ok(Target {
            id,
            period,
            target_seconds,
            include_category_ids,
            effective_from: entity.effective_from,
            is_active: entity.is_active.or(entity.is_enabled).unwrap_or(true),
        })
    }
}

impl From<&Target> for TargetEntity {
    fn from(target: &Target) -> Self {
        TargetEntity {
            id: target.id.0,
            period: Some(target.period.to_string()),
            target_seconds: i64::try_from(target.target_seconds).unwrap_or(i64::MAX),
            include_category_ids: Some(target.include_category_ids.iter().map(|v| v.0).collect()),
            effective_from: target.effective_from,
            is_active: Some(target.is_active),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

    use super::{SessionEntity, TargetEntity};
    use crate::targets::{CategoryId, Period, Target, TargetError, TargetId};

    fn start() -> chrono::DateTime<Utc> {
        Utc.from_utc_datetime(&NaiveDateTime::new(
            NaiveDate::from_ymd_opt(2024, 4, 5).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        ))
    }

    fn session() -> SessionEntity {
        SessionEntity::between(start(), start() + Duration::hours(2), Some(CategoryId(1))).unwrap()
    }

    #[test]
    fn clamp_inside_is_unchanged() {
        let clamped = session().clamp(start() - Duration::hours(1), start() + Duration::hours(3));
        assert_eq!(clamped, Some(session()));
    }

    #[test]
    fn clamp_cuts_both_ends() {
        let clamped = session()
            .clamp(start() + Duration::minutes(30), start() + Duration::minutes(90))
            .unwrap();
        assert_eq!(clamped.start, start() + Duration::minutes(30));
        assert_eq!(clamped.seconds(), 3600);
    }

    #[test]
    fn clamp_outside_is_empty() {
        assert_eq!(
            session().clamp(start() + Duration::hours(2), start() + Duration::hours(5)),
            None
        );
        assert_eq!(
            session().clamp(start() - Duration::hours(5), start() - Duration::hours(1)),
            None
        );
    }

    #[test]
    fn split_by_days_cuts_at_utc_midnight() {
        let start = Utc.with_ymd_and_hms(2024, 4, 3, 12, 0, 0).unwrap();
        let long = SessionEntity::between(start, start + Duration::hours(60), Some(CategoryId(2)))
            .unwrap()
            .with_note("migration");

        let parts = long.split_by_days();
        let bounds = parts
            .iter()
            .map(|v| (v.start, v.seconds()))
            .collect::<Vec<_>>();
        assert_eq!(
            bounds,
            vec![
                (start, 12 * 3600),
                (Utc.with_ymd_and_hms(2024, 4, 4, 0, 0, 0).unwrap(), 24 * 3600),
                (Utc.with_ymd_and_hms(2024, 4, 5, 0, 0, 0).unwrap(), 24 * 3600),
            ]
        );
        assert!(parts
            .iter()
            .all(|v| v.category_id == Some(CategoryId(2)) && v.note.as_deref() == Some("migration")));
    }

    #[test]
    fn split_by_days_keeps_short_sessions_whole() {
        assert_eq!(session().split_by_days(), vec![session()]);
        let empty = SessionEntity::between(start(), start(), None).unwrap();
        assert_eq!(empty.clone().split_by_days(), vec![empty]);
    }

    #[test]
    fn session_end_before_start_is_rejected() {
        assert_eq!(SessionEntity::between(start(), start() - Duration::seconds(1), None), None);
    }

    #[test]
    fn session_serializes_as_seconds() -> anyhow::Result<()> {
        let json = serde_json::to_string(&session().with_note("writing"))?;
        assert_eq!(
            json,
            format!(
                "{{\"category_id\":1,\"start\":{},\"duration\":7200,\"note\":\"writing\"}}",
                start().timestamp()
            )
        );
        let parsed: SessionEntity = serde_json::from_str(&json)?;
        assert_eq!(parsed.note.as_deref(), Some("writing"));
        Ok(())
    }

    #[test]
    fn target_entity_with_canonical_fields() -> anyhow::Result<()> {
        let entity: TargetEntity = serde_json::from_str(
            r#"{"id": 4, "period": "weekly", "target_seconds": 7200,
                "include_category_ids": [3, 1], "effective_from": "2024-04-01T08:00:00Z",
                "is_active": false}"#,
        )?;
        let target = Target::try_from(entity)?;
        assert_eq!(target.id, TargetId(4));
        assert_eq!(target.period, Period::Weekly);
        assert_eq!(target.target_seconds, 7200);
        assert_eq!(
            target.include_category_ids.into_iter().collect::<Vec<_>>(),
            vec![CategoryId(1), CategoryId(3)]
        );
        assert_eq!(
            target.effective_from,
            Some(Utc.with_ymd_and_hms(2024, 4, 1, 8, 0, 0).unwrap())
        );
        assert!(!target.is_active);
        Ok(())
    }

    #[test]
    fn target_entity_with_legacy_fields() -> anyhow::Result<()> {
        let entity: TargetEntity = serde_json::from_str(
            r#"{"id": 2, "target_type": "monthly", "target_seconds": 60,
                "category_ids": [9], "is_enabled": true}"#,
        )?;
        let target = Target::try_from(entity)?;
        assert_eq!(target.period, Period::Monthly);
        assert_eq!(target.category_filter().map(|v| v.len()), Some(1));
        assert!(target.is_active);
        assert_eq!(target.effective_from, None);
        Ok(())
    }

    #[test]
    fn canonical_fields_win_over_legacy_ones() -> anyhow::Result<()> {
        let entity: TargetEntity = serde_json::from_str(
            r#"{"id": 2, "period": "tomorrow", "target_type": "daily", "target_seconds": 60,
                "is_active": false, "is_enabled": true}"#,
        )?;
        let target = Target::try_from(entity)?;
        assert_eq!(target.period, Period::Tomorrow);
        assert!(!target.is_active);
        Ok(())
    }

    #[test]
    fn target_entity_defaults() -> anyhow::Result<()> {
        let entity: TargetEntity = serde_json::from_str(r#"{"id": 1, "target_seconds": 0}"#)?;
        let target = Target::try_from(entity)?;
        assert_eq!(target, Target::new(1, Period::Daily, 0));
        Ok(())
    }

    #[test]
    fn invalid_target_entities_are_rejected() {
        let negative = TargetEntity {
            id: 1,
            target_seconds: -5,
            ..Default::default()
        };
        assert!(matches!(
            Target::try_from(negative),
            Err(TargetError::InvalidTarget { id: TargetId(1), .. })
        ));

        let unknown_period = TargetEntity {
            id: 2,
            period: Some("yearly".into()),
            target_seconds: 5,
            ..Default::default()
        };
        assert!(matches!(
            Target::try_from(unknown_period),
            Err(TargetError::InvalidTarget { id: TargetId(2), .. })
        ));
    }

    #[test]
    fn target_converts_back_to_canonical_entity() -> anyhow::Result<()> {
        let target = Target::new(8, Period::Weekly, 90).with_categories([4]);
        let json = serde_json::to_value(TargetEntity::from(&target))?;
        assert_eq!(json["period"], "weekly");
        assert!(json.get("target_type").is_none());
        let parsed: TargetEntity = serde_json::from_value(json)?;
        assert_eq!(Target::try_from(parsed)?, target);
        Ok(())
    }
}
