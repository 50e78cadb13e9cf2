use std::{
    fs::File as StdFile,
    future::Future,
    io::{ErrorKind, Read, Seek, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use fs4::{fs_std::FileExt, tokio::AsyncFileExt};
use tokio::{fs::File, io::AsyncReadExt};
use tracing::{debug, info, warn};

use crate::targets::{Target, TargetId};

use super::entities::TargetEntity;

/// Readable list of the user's targets.
pub trait TargetStorage {
    fn load_targets(&self) -> impl Future<Output = Result<Vec<Target>>>;
}

/// Targets kept in a single json array file. Readers take a shared lock on the file, writers an
/// exclusive one for the whole read-modify-write.
pub struct TargetStorageImpl {
    path: PathBuf,
}

fn parse_records(content: &str, path: &Path) -> Result<Vec<serde_json::Value>> {
    if content.trim().is_empty() {
        return Ok(vec![]);
    }
    serde_json::from_str::<Vec<serde_json::Value>>(content)
        .with_context(|| format!("Targets file {path:?} must contain a json array"))
}

fn next_id(records: &[serde_json::Value]) -> u64 {
    records
        .iter()
        .filter_map(|v| v.get("id")?.as_u64())
        .max()
        .map_or(1, |v| v + 1)
}

/// Runs on a blocking thread while holding the exclusive lock.
fn append_locked(file: &mut StdFile, path: &Path, target: Target) -> Result<Target> {
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    let mut records = parse_records(&content, path)?;

    let target = Target {
        id: TargetId(next_id(&records)),
        ..target
    };
    records.push(serde_json::to_value(TargetEntity::from(&target))?);

    file.set_len(0)?;
    file.rewind()?;
    file.write_all(&serde_json::to_vec_pretty(&records)?)?;
    file.flush()?;
    Ok(target)
}

impl TargetStorageImpl {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn read_records(&self) -> Result<Vec<serde_json::Value>> {
        let mut file = match File::open(&self.path).await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No targets file at {:?}", self.path);
                return Ok(vec![]);
            }
            Err(e) => return Err(e.into()),
        };
        file.lock_shared()?;
        let mut content = String::new();
        let read = file.read_to_string(&mut content).await;
        file.unlock_async().await?;
        read?;
        parse_records(&content, &self.path)
    }

    /// Appends `target` under the next free id. Records already in the file are written back
    /// untouched, including the ones that fail normalization.
    pub async fn add_target(&self, target: Target) -> Result<Target> {
        let path = self.path.clone();
        let target = tokio::task::spawn_blocking(move || -> Result<Target> {
            let mut file = StdFile::options()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?;
            file.lock_exclusive()?;
            let result = append_locked(&mut file, &path, target);
            FileExt::unlock(&file)?;
            result
        })
        .await??;

        info!("Added target {} to {:?}", target.id, self.path);
        Ok(target)
    }
}

impl TargetStorage for TargetStorageImpl {
    async fn load_targets(&self) -> Result<Vec<Target>> {
        Ok(normalize_targets(self.read_records().await?))
    }
}

/// Converts raw records into targets. Records that can't be parsed or that break target
/// invariants are dropped, the rest are still returned.
pub fn normalize_targets(records: impl IntoIterator<Item = serde_json::Value>) -> Vec<Target> {
    records
        .into_iter()
        .filter_map(|record| {
            let entity = serde_json::from_value::<TargetEntity>(record.clone())
                .inspect_err(|e| warn!("Skipping malformed target {record}: {e}"))
                .ok()?;
            Target::try_from(entity)
                .inspect_err(|e| warn!("Skipping target: {e}"))
                .ok()
        })
        .collect()
}
