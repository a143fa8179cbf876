// `pathways events`: a session's audit trail, oldest first.

use clap::Args;
use pathways_common::types::RpEvent;

use super::{short_time, Ctx};
use crate::output;

#[derive(Debug, Args)]
pub struct EventsArgs {
    session_id: String,
}

pub async fn run(ctx: &Ctx, args: EventsArgs) -> anyhow::Result<()> {
    let events = ctx.service.list_events(&args.session_id).await?;
    output::print_output(ctx.format, &events, |events| format_events(events))?;
    Ok(())
}

fn format_events(events: &[RpEvent]) -> String {
    if events.is_empty() {
        return "No events.".into();
    }
    events
        .iter()
        .map(|e| {
            let action = e.action.as_deref().unwrap_or("-");
            format!("{}  {:<28} {action}", short_time(&e.created_at), e.state.as_str())
        })
        .collect::<Vec<_>>()
        .join("\n")
}
