pub mod dates;
pub mod output;
pub mod progress;
pub mod review;
pub mod session;
pub mod stats;

use std::{fmt::Display, path::PathBuf};

use anyhow::Result;
use chrono::{DateTime, Local, TimeZone};
use clap::{Parser, Subcommand};
use dates::{parse_moment, DateStyle, DATE_EXAMPLES};
use output::{format_window, write_targets};
use progress::{process_progress_command, process_watch_command, ProgressCommand, WatchCommand};
use review::{process_review_command, ReviewCommand};
use session::{process_log_command, LogCommand};
use stats::{process_stats_command, StatsCommand};
use tracing::{debug, level_filters::LevelFilter};

use crate::{
    config::AppConfig,
    storage::{
        session_storage::SessionStorageImpl,
        target_storage::{TargetStorage, TargetStorageImpl},
    },
    targets::{progress::ProgressEvaluator, window::resolve_window, Period, Target},
    utils::{
        clock::{Clock, DefaultClock},
        dir::{create_application_default_path, create_dir},
        logging::{enable_logging, LogOptions, CLI_PREFIX},
    },
};

const SESSIONS_DIR: &str = "sessions";
const TARGETS_FILE: &str = "targets.json";
const LOGS_DIR: &str = "logs";

#[derive(Parser, Debug)]
#[command(name = "Worktarget", version, long_about = None)]
#[command(about = "Tracks progress towards daily, weekly and monthly work targets", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
    #[arg(
        long,
        help = "Application directory. By default uses $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Order of day and month in dates")]
    date_style: DateStyle,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Show progress of the current target")]
    Progress {
        #[command(flatten)]
        command: ProgressCommand,
    },
    #[command(about = "Keep showing progress of the current target until Ctrl-C")]
    Watch {
        #[command(flatten)]
        command: WatchCommand,
    },
    #[command(about = "Show which daily targets were met on a day")]
    Review {
        #[command(flatten)]
        command: ReviewCommand,
    },
    #[command(about = "Summarize tracked time per category")]
    Stats {
        #[command(flatten)]
        command: StatsCommand,
    },
    #[command(about = "Record a finished work session")]
    Log {
        #[command(flatten)]
        command: LogCommand,
    },
    #[command(about = "Print the window a period resolves to")]
    Window {
        period: Period,
        #[arg(long, help = format!("Moment the target starts counting from. {DATE_EXAMPLES}"))]
        effective_from: Option<String>,
        #[arg(long, help = "Resolve as if it was this moment")]
        now: Option<String>,
    },
    #[command(about = "List configured targets")]
    Targets {},
    #[command(about = "Add a target")]
    AddTarget {
        period: Period,
        #[arg(long, short, help = "Target duration in minutes")]
        minutes: u64,
        #[arg(long, short, value_delimiter = ',', help = "Count only these categories, e.g. 1,4")]
        categories: Vec<u64>,
        #[arg(long, help = format!("Moment the target starts counting from. {DATE_EXAMPLES}"))]
        effective_from: Option<String>,
        #[arg(long, help = "Add the target disabled")]
        inactive: bool,
    },
}

/// Everything a command needs besides its own arguments.
pub struct AppContext {
    pub app_dir: PathBuf,
    pub config: AppConfig,
    pub date_style: DateStyle,
}

impl AppContext {
    pub fn sessions(&self) -> Result<SessionStorageImpl> {
        Ok(SessionStorageImpl::new(self.app_dir.join(SESSIONS_DIR))?)
    }

    pub fn targets(&self) -> TargetStorageImpl {
        TargetStorageImpl::new(self.app_dir.join(TARGETS_FILE))
    }

    pub fn evaluator(&self) -> Result<ProgressEvaluator<SessionStorageImpl>> {
        Ok(ProgressEvaluator::new(self.sessions()?).with_timeout(self.config.aggregation_timeout()))
    }
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = match args.dir {
        Some(dir) => create_dir(dir)?,
        None => create_application_default_path()?,
    };

    let config = AppConfig::load(&app_dir).await?;
    let level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        config.log_level()?
    };
    enable_logging(
        CLI_PREFIX,
        &app_dir.join(LOGS_DIR),
        LogOptions {
            level,
            max_files: config.log_files,
            show_std: args.log,
        },
    )?;
    debug!("Using {app_dir:?} with {config:?}");

    let context = AppContext {
        app_dir,
        date_style: args.date_style,
        config,
    };

    match context.config.timezone()? {
        Some(tz) => process_command(args.commands, &context, &DefaultClock, tz).await,
        None => process_command(args.commands, &context, &DefaultClock, Local).await,
    }
}

async fn process_command<Tz: TimeZone>(
    commands: Commands,
    context: &AppContext,
    clock: &dyn Clock,
    tz: Tz,
) -> Result<()>
where
    Tz::Offset: Copy + Display,
{
    let now = clock.time().with_timezone(&tz);
    match commands {
        Commands::Progress { command } => process_progress_command(command, context, now).await,
        Commands::Watch { command } => process_watch_command(command, context, clock, tz).await,
        Commands::Review { command } => process_review_command(command, context, now).await,
        Commands::Stats { command } => process_stats_command(command, context, now).await,
        Commands::Log { command } => process_log_command(command, context, now).await,
        Commands::Window {
            period,
            effective_from,
            now: at,
        } => process_window_command(period, effective_from, at, context, now),
        Commands::Targets {} => {
            let targets = context.targets().load_targets().await?;
            if targets.is_empty() {
                println!("No targets in {:?}", context.app_dir.join(TARGETS_FILE));
            }
            write_targets(&mut std::io::stdout().lock(), &targets, &tz)
        }
        Commands::AddTarget {
            period,
            minutes,
            categories,
            effective_from,
            inactive,
        } => {
            let mut target = Target::new(0, period, minutes.saturating_mul(60))
                .with_categories(categories);
            if let Some(effective_from) = effective_from {
                let moment =
                    parse_moment("effective-from", Some(&effective_from), &now, context.date_style)?;
                target = target.with_effective_from(moment.to_utc());
            }
            if inactive {
                target = target.inactive();
            }
            let target = context.targets().add_target(target).await?;
            write_targets(&mut std::io::stdout().lock(), &[target], &tz)
        }
    }
}

fn process_window_command<Tz: TimeZone>(
    period: Period,
    effective_from: Option<String>,
    at: Option<String>,
    context: &AppContext,
    now: DateTime<Tz>,
) -> Result<()>
where
    Tz::Offset: Copy + Display,
{
    let now = parse_moment("now", at.as_deref(), &now, context.date_style)?;
    let effective_from = effective_from
        .map(|v| parse_moment("effective-from", Some(&v), &now, context.date_style))
        .transpose()?
        .map(|v| v.to_utc());

    let window = resolve_window(period, effective_from, &now);
    println!("{}", format_window(&window, &now.timezone()));
    Ok(())
}
