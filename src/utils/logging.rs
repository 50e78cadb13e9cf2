use std::{path::Path, sync::LazyLock};

use anyhow::Result;
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::fmt::{format::FmtSpan, writer::MakeWriterExt};

pub const CLI_PREFIX: &str = "cli";

const DEFAULT_LEVEL: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOptions {
    /// Overrides `RUST_LOG` when set.
    pub level: Option<LevelFilter>,
    /// Daily log files kept in the log directory.
    pub max_files: usize,
    /// Mirror log lines to stderr. Stdout stays reserved for command output.
    pub show_std: bool,
}

/// Filter directive for this crate. Other crates stay silent.
fn filter_directive(level: Option<LevelFilter>, env_level: Option<&str>) -> String {
    let level = match (level, env_level) {
        (Some(level), _) => level.to_string().to_lowercase(),
        (None, Some(env)) if !env.trim().is_empty() => env.trim().to_string(),
        _ => DEFAULT_LEVEL.to_string(),
    };
    format!("{}={level}", env!("CARGO_PKG_NAME").replace('-', "_"))
}

pub fn enable_logging(prefix: &str, log_dir: &Path, options: LogOptions) -> Result<()> {
    let appender = tracing_appender::rolling::Builder::new()
        .rotation(Rotation::DAILY)
        .max_log_files(options.max_files.max(1))
        .filename_prefix(prefix)
        .build(log_dir)?;

    let show_std = options.show_std;
    let stderr = std::io::stderr.with_filter(move |_| show_std);

    let env_level = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter_directive(
            options.level,
            env_level.as_deref(),
        )))
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(stderr.and(appender))
        .pretty()
        .init();
    Ok(())
}

pub static TEST_LOGGING: LazyLock<()> = LazyLock::new(|| {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::TRACE)
        .with_test_writer()
        .pretty()
        .init()
});
