// `pathways summary`: print the client-facing session summary.

use clap::Args;
use serde::Serialize;

use super::Ctx;
use crate::output;

#[derive(Debug, Args)]
pub struct SummaryArgs {
    session_id: String,
    /// Name in the heading (defaults to `summary.default_client_name`).
    #[arg(long)]
    client: Option<String>,
    /// Additional notes; the saved next steps are used when omitted.
    #[arg(long)]
    notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SummaryOutput {
    session_id: String,
    summary: String,
}

pub async fn run(ctx: &Ctx, args: SummaryArgs) -> anyhow::Result<()> {
    let client = args.client.as_deref().unwrap_or(&ctx.config.summary.default_client_name);
    let summary = ctx.service.summary(&args.session_id, client, args.notes.as_deref()).await?;
    let out = SummaryOutput { session_id: args.session_id, summary };
    output::print_output(ctx.format, &out, |o| o.summary.clone())?;
    Ok(())
}
