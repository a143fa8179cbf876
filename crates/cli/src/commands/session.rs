// `pathways session`: client session records.

use clap::{Args, Subcommand};
use pathways_common::types::{RpSessionState, Session};
use pathways_engine::restore::session::SessionCounts;
use serde::Serialize;

use super::{short_time, Ctx};
use crate::output;

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    /// Start a session for a client
    New(NewArgs),
    /// Show one session with its tallies
    Show(IdArgs),
    /// List sessions, newest first
    List(ListArgs),
    /// Stamp the session's end time
    End(IdArgs),
    /// Append a titled block to the session notes
    Notes(NotesArgs),
    /// Save the practitioner's next steps (empty text clears them)
    NextSteps(NextStepsArgs),
}

#[derive(Debug, Args)]
pub struct NewArgs {
    /// Client (person) identifier.
    #[arg(long)]
    person: String,
    /// Why the client came in.
    #[arg(long)]
    reason: Option<String>,
    #[arg(long)]
    notes: Option<String>,
}

#[derive(Debug, Args)]
pub struct IdArgs {
    session_id: String,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Only sessions of this client.
    #[arg(long)]
    person: Option<String>,
}

#[derive(Debug, Args)]
pub struct NotesArgs {
    session_id: String,
    #[arg(long)]
    title: String,
    body: String,
}

#[derive(Debug, Args)]
pub struct NextStepsArgs {
    session_id: String,
    #[arg(default_value = "")]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionDetail {
    session: Session,
    state: Option<RpSessionState>,
    counts: SessionCounts,
}

pub async fn run(ctx: &Ctx, cmd: SessionCommand) -> anyhow::Result<()> {
    let service = &ctx.service;
    match cmd {
        SessionCommand::New(args) => {
            let session = service
                .create_session(&args.person, args.reason.as_deref(), args.notes.as_deref())
                .await?;
            output::print_output(ctx.format, &session, format_session)?;
        }
        SessionCommand::Show(args) => {
            let detail = SessionDetail {
                session: service.get_session(&args.session_id).await?,
                state: service.session_state(&args.session_id).await?,
                counts: service.session_counts(&args.session_id).await?,
            };
            output::print_output(ctx.format, &detail, format_detail)?;
        }
        SessionCommand::List(args) => {
            let sessions = service.list_sessions(args.person.as_deref()).await?;
            output::print_output(ctx.format, &sessions, |sessions| format_list(sessions))?;
        }
        SessionCommand::End(args) => {
            let session = service.end_session(&args.session_id).await?;
            output::print_output(ctx.format, &session, format_session)?;
        }
        SessionCommand::Notes(args) => {
            let session =
                service.append_session_notes(&args.session_id, &args.title, &args.body).await?;
            output::print_output(ctx.format, &session, format_session)?;
        }
        SessionCommand::NextSteps(args) => {
            let state = service.save_practitioner_notes(&args.session_id, Some(&args.text)).await?;
            output::print_output(ctx.format, &state, |state| {
                match state.practitioner_notes.as_deref() {
                    Some(notes) => format!("Next steps saved: {notes}"),
                    None => "Next steps cleared.".to_string(),
                }
            })?;
        }
    }
    Ok(())
}

fn format_session(session: &Session) -> String {
    let mut lines = vec![format!(
        "{} (client {}) started {}",
        session.id,
        session.person_id,
        short_time(&session.started_at)
    )];
    if let Some(ended) = &session.ended_at {
        lines.push(format!("  ended {}", short_time(ended)));
    }
    if let Some(reason) = &session.reason {
        lines.push(format!("  reason: {reason}"));
    }
    if let Some(notes) = &session.notes {
        lines.push("  notes:".into());
        lines.extend(notes.lines().map(|line| format!("    {line}")));
    }
    lines.join("\n")
}

fn format_detail(detail: &SessionDetail) -> String {
    let mut out = format_session(&detail.session);
    if let Some(state) = &detail.state {
        out.push_str(&format!("\n  state: {} ({})", state.current_state, state.phase));
    }
    let c = &detail.counts;
    out.push_str(&format!(
        "\n  roots: {} restored, {} deferred, {} identified; {} collections completed",
        c.restored_roots, c.deferred_roots, c.identified_roots, c.collections_completed
    ));
    out
}

fn format_list(sessions: &[Session]) -> String {
    if sessions.is_empty() {
        return "No sessions.".into();
    }
    sessions
        .iter()
        .map(|s| {
            let status = if s.ended_at.is_some() { "ended" } else { "open" };
            format!("{}  {}  {}  {status}", s.id, s.person_id, short_time(&s.started_at))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
