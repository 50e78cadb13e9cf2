use anyhow::Result;
use chrono::{DateTime, TimeZone};
use clap::CommandFactory;
use tracing::info;

use crate::{
    storage::{entities::SessionEntity, session_storage::SessionStorage},
    targets::CategoryId,
};

use super::{
    dates::{parse_moment, DATE_EXAMPLES},
    output::format_duration,
    AppContext, Args,
};

#[derive(Debug, clap::Args)]
pub struct LogCommand {
    #[arg(long, short, help = format!("Start of the session. {DATE_EXAMPLES}"))]
    start: String,
    #[arg(long, short, help = "End of the session, now by default")]
    end: Option<String>,
    #[arg(long, short, help = "Category the session belongs to")]
    category: Option<u64>,
    #[arg(long, short, help = "Free form note attached to the session")]
    note: Option<String>,
}

/// Records a finished session.
pub async fn process_log_command<Tz: TimeZone>(
    command: LogCommand,
    context: &AppContext,
    now: DateTime<Tz>,
) -> Result<()>
where
    Tz::Offset: Copy,
{
    let start = parse_moment("start", Some(&command.start), &now, context.date_style)?;
    let end = parse_moment("end", command.end.as_deref(), &now, context.date_style)?;

    let Some(mut session) =
        SessionEntity::between(start.to_utc(), end.to_utc(), command.category.map(CategoryId))
    else {
        return Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                "Session end must not be before its start",
            )
            .into());
    };
    if let Some(note) = command.note {
        session = session.with_note(note);
    }

    let duration = session.duration;
    context.sessions()?.append_session(session).await?;
    info!("Logged session of {}s", duration.num_seconds());
    println!("Logged {}", format_duration(duration));
    Ok(())
}
