use std::{
    collections::{BTreeMap, BTreeSet},
    future::{self, Future},
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use fs4::tokio::AsyncFileExt;
use futures::{stream, Stream, StreamExt};
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
};
use tracing::{debug, error, warn};

use crate::{
    targets::{
        aggregator::{Aggregation, AggregationError, CategoryAggregator, CategorySeconds},
        window::EvaluationWindow,
        CategoryId,
    },
    utils::time::date_to_record_name,
};

use super::entities::SessionEntity;

/// Interface for abstracting storage of sessions.
pub trait SessionStorage {
    /// Appends a finished session. Sessions crossing UTC midnight are stored as one part per day.
    fn append_session(&self, session: SessionEntity) -> impl Future<Output = Result<()>>;

    /// Retrieves sessions that started on a certain UTC day.
    fn get_data_for(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<SessionEntity>>> + Send;
}

/// The main realization of [SessionStorage].
pub struct SessionStorageImpl {
    session_dir: PathBuf,
}

impl SessionStorageImpl {
    pub fn new(session_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&session_dir)?;

        Ok(Self { session_dir })
    }

    async fn get_all_inner(&self, path: &Path) -> Result<Vec<SessionEntity>> {
        async fn extract(path: &Path) -> std::result::Result<Vec<SessionEntity>, std::io::Error> {
            debug!("Extracting {path:?}");
            let file = File::open(path).await?;
            file.lock_shared()?;
            let buffer = BufReader::new(file);
            let mut lines = buffer.lines();
            let mut sessions = vec![];
            while let Some(v) = lines.next_line().await? {
                if v.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<SessionEntity>(&v) {
                    Ok(v) => sessions.push(v),
                    Err(e) => {
                        // ignore illegal values. Might happen after an interrupted write
                        warn!(
                            "During parsing in path {:?} found illegal json string {}:  {e}",
                            path, &v
                        )
                    }
                }
            }

            lines.into_inner().into_inner().unlock_async().await?;

            Ok(sessions)
        }

        match extract(path).await {
            Ok(s) => Ok(s),
            Err(e) => {
                if e.kind() == ErrorKind::NotFound {
                    Ok(vec![])
                } else {
                    Err(e)?
                }
            }
        }
    }

    async fn append_with_file(
        file: &mut (impl AsyncWrite + Unpin),
        session: &SessionEntity,
    ) -> Result<()> {
        let mut buffer = serde_json::to_vec(session)?;
        buffer.push(b'\n');
        file.write_all(&buffer).await?;
        file.flush().await?;
        Ok(())
    }
}

impl SessionStorage for SessionStorageImpl {
    async fn append_session(&self, session: SessionEntity) -> Result<()> {
        for part in session.split_by_days() {
            let path = self
                .session_dir
                .join(date_to_record_name(part.start.date_naive()));

            let mut file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .await?;

            // Semi-safe acquire-release for a file
            file.lock_exclusive()?;
            let result = Self::append_with_file(&mut file, &part).await;
            file.unlock_async().await?;
            result?;
        }
        Ok(())
    }

    async fn get_data_for(&self, date: NaiveDate) -> Result<Vec<SessionEntity>> {
        let path = self.session_dir.join(date_to_record_name(date));
        let data = self.get_all_inner(&path).await?;
        Ok(data)
    }
}

pub struct ExtractConfig {
    pub start: DateTime<Utc>,
    /// Exclusive.
    pub end: DateTime<Utc>,
}

impl ExtractConfig {
    fn filter(&self, entity: SessionEntity) -> Option<SessionEntity> {
        entity.clamp(self.start, self.end)
    }
}

/// Extracts [SessionEntity] between 2 instants, clipped to them. Day files are read a few at a
/// time through a stream.
///
/// Every stored part lies within the UTC day of its file. Reading still begins one day early so
/// files written before sessions were split by day are counted too.
pub fn extract_between<S: SessionStorage + Sync>(
    storage: &S,
    config: ExtractConfig,
) -> impl Stream<Item = Result<SessionEntity>> + Send + '_ {
    let first_day = config.start.date_naive();
    let first_day = first_day.checked_sub_days(Days::new(1)).unwrap_or(first_day);
    let date_iteration = date_range(first_day, config.end.date_naive());

    let files = date_iteration
        .map(move |day| async move { (day, storage.get_data_for(day).await) })
        .buffered(4);

    files
        .flat_map(|(day, data)| match data {
            Ok(data) => stream::iter(data).map(Ok).boxed(),
            Err(e) => {
                error!("Failed to process file {day} {e}");
                stream::once(future::ready(Err(e))).boxed()
            }
        })
        .filter_map(move |v| future::ready(v.map(|v| config.filter(v)).transpose()))
}

/// Returns a stream of dates between start (inclusive) and end (inclusive).
fn date_range(start: NaiveDate, end: NaiveDate) -> impl Stream<Item = NaiveDate> + Send {
    stream::unfold(Some(start), move |current| {
        future::ready(match current {
            Some(current) if current <= end => Some((current, current.succ_opt())),
            _ => None,
        })
    })
}

#[async_trait]
impl CategoryAggregator for SessionStorageImpl {
    async fn aggregate(
        &self,
        window: EvaluationWindow,
        categories: Option<BTreeSet<CategoryId>>,
    ) -> Result<Aggregation, AggregationError> {
        let sessions = extract_between(
            self,
            ExtractConfig {
                start: window.start,
                end: window.end_exclusive(),
            },
        );
        let mut sessions = std::pin::pin!(sessions);

        let mut per_category = BTreeMap::<Option<CategoryId>, u64>::new();
        let mut total_seconds = 0;
        while let Some(session) = sessions.next().await {
            let session = session.map_err(|e| AggregationError::Unavailable {
                reason: format!("{e:#}"),
            })?;
            let included = match &categories {
                Some(filter) => session.category_id.is_some_and(|v| filter.contains(&v)),
                None => true,
            };
            if !included {
                continue;
            }
            let seconds = session.seconds();
            total_seconds += seconds;
            *per_category.entry(session.category_id).or_default() += seconds;
        }

        debug!("Aggregated {total_seconds}s in {window}");
        Ok(Aggregation {
            total_seconds,
            per_category: per_category
                .into_iter()
                .map(|(category_id, seconds)| CategorySeconds {
                    category_id,
                    seconds,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use anyhow::Result;
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
    use tempfile::tempdir;

    use super::{SessionStorage, SessionStorageImpl};
    use crate::{
        storage::entities::SessionEntity,
        targets::{
            aggregator::{AggregationError, CategoryAggregator, CategorySeconds},
            window::day_window,
            CategoryId,
        },
        utils::logging::TEST_LOGGING,
    };

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, d, h, m, 0).unwrap()
    }

    fn session(start: DateTime<Utc>, minutes: i64, category: Option<u64>) -> SessionEntity {
        SessionEntity::between(start, start + Duration::minutes(minutes), category.map(CategoryId))
            .unwrap()
    }

    fn review_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 5).unwrap()
    }

    #[tokio::test]
    async fn test_session_storage_basic() -> Result<()> {
        let dir = tempdir()?;
        let storage = SessionStorageImpl::new(dir.path().to_owned())?;
        let sessions = [
            session(at(5, 9, 0), 30, Some(1)),
            session(at(5, 11, 0), 45, None).with_note("reading"),
        ];
        storage.append_session(sessions[0].clone()).await?;
        storage.append_session(sessions[1].clone()).await?;

        let values = storage.get_data_for(review_date()).await?;
        assert_eq!(values, sessions.to_vec());

        let empty = storage.get_data_for(review_date().succ_opt().unwrap()).await?;
        assert!(empty.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_illegal_lines_are_skipped() -> Result<()> {
        let dir = tempdir()?;
        let storage = SessionStorageImpl::new(dir.path().to_owned())?;
        let valid = session(at(5, 9, 0), 30, Some(1));
        let content = format!(
            "{}\n{{\"category_id\": 1, \"sta\n\n",
            serde_json::to_string(&valid)?
        );
        std::fs::write(dir.path().join("2024-04-05"), content)?;

        assert_eq!(storage.get_data_for(review_date()).await?, vec![valid]);
        Ok(())
    }

    #[tokio::test]
    async fn test_aggregate_clips_to_window() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let storage = SessionStorageImpl::new(dir.path().to_owned())?;

        // 30 minutes fall into the reviewed day.
        storage.append_session(session(at(4, 23, 30), 60, Some(1))).await?;
        storage.append_session(session(at(5, 9, 0), 90, Some(2))).await?;
        // 20 minutes fall into the reviewed day.
        storage.append_session(session(at(5, 23, 40), 40, None)).await?;
        storage.append_session(session(at(6, 8, 0), 60, Some(1))).await?;
        storage.append_session(session(at(3, 8, 0), 60, Some(1))).await?;

        let aggregation = storage
            .aggregate(day_window(review_date(), &Utc), None)
            .await?;

        assert_eq!(aggregation.total_seconds, (30 + 90 + 20) * 60);
        assert_eq!(
            aggregation.per_category,
            vec![
                CategorySeconds {
                    category_id: None,
                    seconds: 20 * 60
                },
                CategorySeconds {
                    category_id: Some(CategoryId(1)),
                    seconds: 30 * 60
                },
                CategorySeconds {
                    category_id: Some(CategoryId(2)),
                    seconds: 90 * 60
                },
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_aggregate_filters_categories() -> Result<()> {
        let dir = tempdir()?;
        let storage = SessionStorageImpl::new(dir.path().to_owned())?;
        storage.append_session(session(at(5, 9, 0), 10, Some(5))).await?;
        storage.append_session(session(at(5, 10, 0), 20, Some(6))).await?;
        storage.append_session(session(at(5, 11, 0), 40, None)).await?;

        let window = day_window(review_date(), &Utc);
        let filtered = storage
            .aggregate(window, Some(BTreeSet::from([CategoryId(5)])))
            .await?;
        assert_eq!(filtered.total_seconds, 10 * 60);
        assert_eq!(filtered.per_category.len(), 1);

        let everything = storage.aggregate(window, None).await?;
        assert_eq!(everything.total_seconds, 70 * 60);

        // idempotent for the same request
        assert_eq!(storage.aggregate(window, None).await?, everything);
        Ok(())
    }

    #[tokio::test]
    async fn test_aggregate_counts_last_second() -> Result<()> {
        let dir = tempdir()?;
        let storage = SessionStorageImpl::new(dir.path().to_owned())?;
        let last_second = Utc.with_ymd_and_hms(2024, 4, 5, 23, 59, 59).unwrap();
        storage
            .append_session(
                SessionEntity::between(last_second, last_second + Duration::seconds(5), None)
                    .unwrap(),
            )
            .await?;

        let aggregation = storage
            .aggregate(day_window(review_date(), &Utc), None)
            .await?;
        assert_eq!(aggregation.total_seconds, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_multi_day_session_counts_in_every_day() -> Result<()> {
        let dir = tempdir()?;
        let storage = SessionStorageImpl::new(dir.path().to_owned())?;
        let start = at(3, 12, 0);
        storage
            .append_session(session(start, 60 * 60, Some(1)))
            .await?;

        let aggregation = storage
            .aggregate(day_window(review_date(), &Utc), None)
            .await?;
        assert_eq!(aggregation.total_seconds, 86_400);

        let first_day = storage.get_data_for(start.date_naive()).await?;
        assert_eq!(first_day.len(), 1);
        assert_eq!(first_day[0].seconds(), 12 * 3600);
        assert!(storage
            .get_data_for(review_date().succ_opt().unwrap())
            .await?
            .is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_aggregate_with_no_data_is_zero() -> Result<()> {
        let dir = tempdir()?;
        let storage = SessionStorageImpl::new(dir.path().to_owned())?;
        let aggregation = storage
            .aggregate(day_window(review_date(), &Utc), None)
            .await?;
        assert_eq!(aggregation.total_seconds, 0);
        assert!(aggregation.per_category.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_unreadable_day_is_unavailable() -> Result<()> {
        let dir = tempdir()?;
        let storage = SessionStorageImpl::new(dir.path().to_owned())?;
        // A directory where a day file should be can't be read as a file.
        std::fs::create_dir(dir.path().join("2024-04-05"))?;

        let result = storage
            .aggregate(day_window(review_date(), &Utc), None)
            .await;
        assert!(matches!(result, Err(AggregationError::Unavailable { .. })));
        Ok(())
    }
}
