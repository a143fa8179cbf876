// CLI subcommand dispatch.

use std::path::PathBuf;

use anyhow::Context;
use clap::Subcommand;
use pathways_engine::config::GlobalConfig;
use pathways_engine::PathwaysService;
use tracing::debug;

use crate::output::OutputFormat;

pub mod backup;
pub mod catalog;
pub mod events;
pub mod root;
pub mod run;
pub mod session;
pub mod summary;

#[derive(Subcommand)]
pub enum Command {
    /// Create, inspect and end client sessions
    #[command(subcommand)]
    Session(session::SessionCommand),
    /// Import or browse the pathway catalog
    #[command(subcommand)]
    Catalog(catalog::CatalogCommand),
    /// Log and manage roots
    #[command(subcommand)]
    Root(root::RootCommand),
    /// Apply one restoration action
    Run(run::RunArgs),
    /// Show where a session stands and what it accepts next
    Status(run::StatusArgs),
    /// Stop a session from any step
    Stop(run::StopArgs),
    /// Print the client summary
    Summary(summary::SummaryArgs),
    /// Export all records as JSON
    Export(backup::ExportArgs),
    /// Import a JSON backup
    Import(backup::ImportArgs),
    /// Show a session's audit trail
    Events(events::EventsArgs),
}

/// Shared handles for one CLI invocation.
pub struct Ctx {
    pub service: PathwaysService,
    pub config: GlobalConfig,
    pub format: OutputFormat,
}

pub async fn run(db: Option<PathBuf>, format: OutputFormat, cmd: Command) -> anyhow::Result<()> {
    let config = GlobalConfig::load();
    let service = open_service(db, &config).await?;
    let ctx = Ctx { service, config, format };

    match cmd {
        Command::Session(cmd) => session::run(&ctx, cmd).await,
        Command::Catalog(cmd) => catalog::run(&ctx, cmd).await,
        Command::Root(cmd) => root::run(&ctx, cmd).await,
        Command::Run(args) => run::run(&ctx, args).await,
        Command::Status(args) => run::status(&ctx, args).await,
        Command::Stop(args) => run::stop(&ctx, args).await,
        Command::Summary(args) => summary::run(&ctx, args).await,
        Command::Export(args) => backup::export(&ctx, args).await,
        Command::Import(args) => backup::import(&ctx, args).await,
        Command::Events(args) => events::run(&ctx, args).await,
    }
}

async fn open_service(db: Option<PathBuf>, config: &GlobalConfig) -> anyhow::Result<PathwaysService> {
    let path = db
        .or_else(|| config.resolved_db_path())
        .context("could not determine home directory; pass --db")?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let service = PathwaysService::open(&path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    debug!(db = %path.display(), "opened database");

    if let Some(catalog_path) = &config.catalog_path {
        let imported = service.import_catalog_if_missing(catalog_path).await?;
        debug!(path = %catalog_path.display(), imported, "checked configured catalog");
    }
    Ok(service)
}

/// Render a timestamp the way human output shows it.
pub(crate) fn short_time(at: &chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}
