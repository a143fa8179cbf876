// `pathways run|status|stop`: drive the restoration machine.

use clap::{Args, Subcommand};
use pathways_common::machine::Action;
use pathways_common::types::{
    AuthorityMode, IntegrationChannel, IntegrationCheck, ReadinessResult, RpState,
};
use pathways_engine::restore::runner::Step;

use super::root::format_root;
use super::Ctx;
use crate::output;

#[derive(Debug, Args)]
pub struct RunArgs {
    session_id: String,
    #[command(subcommand)]
    action: ActionArg,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    session_id: String,
}

#[derive(Debug, Args)]
pub struct StopArgs {
    session_id: String,
}

#[derive(Debug, Clone, Subcommand)]
pub enum ActionArg {
    /// Start or resume the root loop
    Begin,
    /// Re-enter restoration with a building collection
    StartRestoration,
    /// Go back to discovery to log more roots
    AddPathways,
    Acknowledge,
    /// Pause the current root and move on
    Defer {
        #[arg(long)]
        reason: Option<String>,
    },
    /// Record readiness: ready, not_ready or conditional
    Readiness { result: ReadinessResult },
    ReturnToDiscovery,
    /// Park the root and look for an associated pathway
    FindAssociatedPathway,
    /// Pick how authority is transferred
    Authority {
        mode: AuthorityMode,
        #[arg(long)]
        script: Option<String>,
    },
    /// Choose integration channels (comma separated)
    ContinueIntegration {
        #[arg(value_delimiter = ',')]
        channels: Vec<IntegrationChannel>,
    },
    SkipIntegration,
    IntegrationDone,
    ChangeIntegration,
    /// Finish the root: integrated or unsure
    Complete { check: IntegrationCheck },
    NextRoot,
    /// Answer the associated-pathway question
    AssociatedPathway {
        #[arg(value_parser = parse_answer, action = clap::ArgAction::Set)]
        answer: bool,
    },
    /// Answer the another-pathway question
    AnotherPathway {
        #[arg(value_parser = parse_answer, action = clap::ArgAction::Set)]
        answer: bool,
    },
    Back,
    EndSession,
    Stop,
}

impl From<ActionArg> for Action {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::Begin => Action::Begin,
            ActionArg::StartRestoration => Action::StartRestoration,
            ActionArg::AddPathways => Action::AddPathways,
            ActionArg::Acknowledge => Action::Acknowledge,
            ActionArg::Defer { reason } => Action::Defer { reason },
            ActionArg::Readiness { result } => Action::Readiness(result),
            ActionArg::ReturnToDiscovery => Action::ReturnToDiscovery,
            ActionArg::FindAssociatedPathway => Action::FindAssociatedPathway,
            ActionArg::Authority { mode, script } => Action::PickAuthority { mode, script },
            ActionArg::ContinueIntegration { channels } => {
                Action::ContinueIntegration { channels }
            }
            ActionArg::SkipIntegration => Action::SkipIntegration,
            ActionArg::IntegrationDone => Action::IntegrationDone,
            ActionArg::ChangeIntegration => Action::ChangeIntegration,
            ActionArg::Complete { check } => Action::CompleteIntegration(check),
            ActionArg::NextRoot => Action::NextRoot,
            ActionArg::AssociatedPathway { answer } => Action::AssociatedPathway(answer),
            ActionArg::AnotherPathway { answer } => Action::AnotherPathway(answer),
            ActionArg::Back => Action::Back,
            ActionArg::EndSession => Action::EndSession,
            ActionArg::Stop => Action::Stop,
        }
    }
}

fn parse_answer(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "yes" | "y" => Ok(true),
        "no" | "n" => Ok(false),
        other => Err(format!("expected yes or no, got `{other}`")),
    }
}

pub async fn run(ctx: &Ctx, args: RunArgs) -> anyhow::Result<()> {
    let action = Action::from(args.action);
    let step = ctx.service.apply(&args.session_id, &action).await?;
    output::print_output(ctx.format, &step, format_step)?;
    Ok(())
}

pub async fn status(ctx: &Ctx, args: StatusArgs) -> anyhow::Result<()> {
    let step = ctx.service.status(&args.session_id).await?;
    output::print_output(ctx.format, &step, format_step)?;
    Ok(())
}

pub async fn stop(ctx: &Ctx, args: StopArgs) -> anyhow::Result<()> {
    let state = ctx.service.request_stop(&args.session_id).await?;
    output::print_output(ctx.format, &state, |s| format!("Stopped at {}", s.current_state))?;
    Ok(())
}

fn format_step(step: &Step) -> String {
    let state = &step.state;
    let mut lines = vec![format!("{} ({})", state.current_state, state.phase)];
    if let Some(root) = &step.root {
        lines.push(format!("  root: {}", format_root(root)));
    }
    if state.current_state == RpState::EmbodiedIntegrationGuide {
        let channels = step
            .root
            .as_ref()
            .and_then(|r| r.restoration.channels_used.clone())
            .unwrap_or_default();
        for channel in channels {
            lines.push(format!("  {}:", channel.label()));
            lines.extend(channel.guidance().iter().map(|line| format!("    - {line}")));
        }
    }
    if state.stop_requested {
        lines.push("  stop requested".into());
    }
    lines.push(format!("  next: {}", step.available.join(", ")));
    lines.join("\n")
}
