// `pathways export|import`: JSON backup of every record.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use pathways_engine::store::backup::BackupBundle;

use super::Ctx;
use crate::output;

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Write to this file instead of stdout.
    #[arg(long, short)]
    out: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    path: PathBuf,
}

pub async fn export(ctx: &Ctx, args: ExportArgs) -> anyhow::Result<()> {
    let bundle = ctx.service.export_backup().await?;
    let json = serde_json::to_string_pretty(&bundle).context("failed to encode backup")?;
    match args.out {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("Wrote backup to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

pub async fn import(ctx: &Ctx, args: ImportArgs) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(&args.path)
        .with_context(|| format!("failed to read {}", args.path.display()))?;
    let bundle = parse_bundle(&raw)?;
    let report = ctx.service.import_backup(&bundle).await?;
    output::print_output(ctx.format, &report, |r| {
        format!(
            "Imported {} sessions, {} checkpoints, {} collections, {} roots, {} events",
            r.sessions, r.rp_sessions, r.rp_collections, r.rp_roots, r.rp_events
        )
    })?;
    Ok(())
}

fn parse_bundle(raw: &str) -> anyhow::Result<BackupBundle> {
    serde_json::from_str(raw).context("backup is not a valid bundle")
}
