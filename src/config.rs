//! Application configuration, read from `config.json` inside the application directory.
//!
//! Every field is optional, a missing file is the same as an empty one:
//! ```json
//! {
//!   "timezone": "Europe/Kyiv",
//!   "aggregation_timeout_secs": 10,
//!   "watch_interval_secs": 60,
//!   "log_level": "debug",
//!   "log_files": 5
//! }
//! ```

use std::{io::ErrorKind, path::Path, str::FromStr, time::Duration};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, level_filters::LevelFilter};

pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// IANA time zone used for calendar days. System local time when absent.
    pub timezone: Option<String>,
    pub aggregation_timeout_secs: u64,
    pub watch_interval_secs: u64,
    /// Level of this crate's logs, `RUST_LOG` or `info` when absent.
    pub log_level: Option<String>,
    pub log_files: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timezone: None,
            aggregation_timeout_secs: 10,
            watch_interval_secs: 60,
            log_level: None,
            log_files: 5,
        }
    }
}

impl AppConfig {
    pub async fn load(app_dir: &Path) -> Result<Self> {
        let path = app_dir.join(CONFIG_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse configuration {path:?}")),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No configuration at {path:?}, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn timezone(&self) -> Result<Option<chrono_tz::Tz>> {
        self.timezone
            .as_deref()
            .map(|name| {
                name.parse::<chrono_tz::Tz>()
                    .map_err(|e| anyhow!("Unknown timezone '{name}': {e}"))
            })
            .transpose()
    }

    pub fn log_level(&self) -> Result<Option<LevelFilter>> {
        self.log_level
            .as_deref()
            .map(|level| {
                LevelFilter::from_str(level)
                    .map_err(|e| anyhow!("Unknown log level '{level}': {e}"))
            })
            .transpose()
    }

    pub fn aggregation_timeout(&self) -> Duration {
        Duration::from_secs(self.aggregation_timeout_secs)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_secs.max(1))
    }
}
