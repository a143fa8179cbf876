// `pathways root`: log catalog nodes as roots and manage their status.

use clap::{Args, Subcommand};
use pathways_common::types::{RootStatus, RpRoot};

use super::Ctx;
use crate::output;

#[derive(Debug, Subcommand)]
pub enum RootCommand {
    /// Log a catalog node as a root in the building collection
    Add(AddArgs),
    /// List a session's roots in the order they were logged
    List(ListArgs),
    /// Pause a root so newer ones are worked first
    Defer(DeferArgs),
}

#[derive(Debug, Args)]
pub struct AddArgs {
    session_id: String,
    node_id: String,
    #[arg(long)]
    notes: Option<String>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    session_id: String,
}

#[derive(Debug, Args)]
pub struct DeferArgs {
    root_id: String,
    /// What the client's system needs first.
    #[arg(long)]
    reason: Option<String>,
}

pub async fn run(ctx: &Ctx, cmd: RootCommand) -> anyhow::Result<()> {
    match cmd {
        RootCommand::Add(args) => {
            let root =
                ctx.service.add_root(&args.session_id, &args.node_id, args.notes.as_deref()).await?;
            output::print_output(ctx.format, &root, |r| format!("Added {}", format_root(r)))?;
        }
        RootCommand::List(args) => {
            let roots = ctx.service.list_roots(&args.session_id).await?;
            output::print_output(ctx.format, &roots, |roots| format_roots(roots))?;
        }
        RootCommand::Defer(args) => {
            let root = ctx.service.defer_root(&args.root_id, args.reason.as_deref()).await?;
            output::print_output(ctx.format, &root, |r| format!("Deferred {}", format_root(r)))?;
        }
    }
    Ok(())
}

pub(crate) fn format_root(root: &RpRoot) -> String {
    let path = if root.path.is_empty() { root.domain.clone() } else { root.path.join(" > ") };
    format!("{} [{}] {path}", root.id, root.status)
}

fn format_roots(roots: &[RpRoot]) -> String {
    if roots.is_empty() {
        return "No roots logged.".into();
    }
    let mut lines: Vec<String> = roots.iter().map(format_root).collect();
    let open = roots.iter().filter(|r| r.status != RootStatus::Restored).count();
    lines.push(format!("{open} of {} still open", roots.len()));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pathways_common::types::Restoration;

    use super::*;

    fn root(id: &str, status: RootStatus) -> RpRoot {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap();
        RpRoot {
            id: id.into(),
            session_id: "s1".into(),
            collection_id: "c1".into(),
            pathway_node_id: "jaw".into(),
            domain: "Body".into(),
            path: vec!["Body".into(), "Head".into(), "Jaw tension".into()],
            source: None,
            notes: None,
            status,
            restoration: Restoration::default(),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn root_line_shows_status_and_path() {
        assert_eq!(
            format_root(&root("r1", RootStatus::Deferred)),
            "r1 [deferred] Body > Head > Jaw tension"
        );
    }

    #[test]
    fn list_counts_open_roots() {
        let output =
            format_roots(&[root("r1", RootStatus::Restored), root("r2", RootStatus::Identified)]);
        assert!(output.ends_with("1 of 2 still open"));
        assert_eq!(format_roots(&[]), "No roots logged.");
    }
}
