// `pathways catalog`: import and browse the node index.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Subcommand};
use pathways_common::catalog::{CatalogIndex, CatalogLookup};
use serde::Serialize;

use super::Ctx;
use crate::output;

#[derive(Debug, Subcommand)]
pub enum CatalogCommand {
    /// Validate a node-index JSON file and make it the active catalog
    Import(ImportArgs),
    /// List top-level nodes, or the children of one node
    Show(ShowArgs),
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    path: PathBuf,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Node whose children to list.
    node_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CatalogSummary {
    version: String,
    nodes: usize,
    top_level: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeEntry {
    id: String,
    label: String,
    domain: String,
    level: u32,
    loggable: bool,
    children: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeListing {
    /// Labels from the top level down to the listed node.
    path: Vec<String>,
    entries: Vec<NodeEntry>,
}

pub async fn run(ctx: &Ctx, cmd: CatalogCommand) -> anyhow::Result<()> {
    match cmd {
        CatalogCommand::Import(args) => {
            let json = std::fs::read_to_string(&args.path)
                .with_context(|| format!("failed to read {}", args.path.display()))?;
            let catalog = ctx.service.import_catalog(&json).await?;
            let summary = CatalogSummary {
                version: catalog.version().to_string(),
                nodes: catalog.len(),
                top_level: catalog.root_ids().len(),
            };
            output::print_output(ctx.format, &summary, |s| {
                format!("Imported catalog {} ({} nodes, {} top-level)", s.version, s.nodes, s.top_level)
            })?;
        }
        CatalogCommand::Show(args) => {
            let catalog = ctx.service.load_catalog().await?;
            let listing = listing(&catalog, args.node_id.as_deref())?;
            output::print_output(ctx.format, &listing, format_listing)?;
        }
    }
    Ok(())
}

fn listing(catalog: &CatalogIndex, node_id: Option<&str>) -> anyhow::Result<NodeListing> {
    let entry = |id: &str| {
        catalog.node(id).map(|node| NodeEntry {
            id: id.to_string(),
            label: node.label.clone(),
            domain: node.domain.clone(),
            level: node.level,
            loggable: node.is_loggable(),
            children: node.children.len(),
        })
    };

    let Some(node_id) = node_id else {
        let entries = catalog.root_ids().iter().filter_map(|id| entry(id.as_str())).collect();
        return Ok(NodeListing { path: Vec::new(), entries });
    };
    let path = catalog.path_labels(node_id)?;
    let entries = catalog.children(node_id)?.into_iter().filter_map(|(id, _)| entry(id)).collect();
    Ok(NodeListing { path, entries })
}

fn format_listing(listing: &NodeListing) -> String {
    let mut lines = Vec::new();
    if !listing.path.is_empty() {
        lines.push(listing.path.join(" > "));
    }
    if listing.entries.is_empty() {
        lines.push("  (no child nodes)".into());
    }
    for e in &listing.entries {
        let marker = if e.loggable { "*" } else { " " };
        let more = if e.children > 0 { format!(" ({} more)", e.children) } else { String::new() };
        lines.push(format!("{marker} {}  {}{more}", e.id, e.label));
    }
    lines.join("\n")
}
