//! `pkview`: command-line host for the PK/PD projection core.
//!
//! # Responsibility
//! - Validate map directories and project analysis snapshots from disk.
//! - Save and reload snapshots through the SQLite store, repairing
//!   references on every load.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use pkview_core::db::{open_db, open_db_in_memory, Connection};
use pkview_core::{
    default_log_level, default_maps_dir, init_logging, AnalysisSession, MapRegistry, Snapshot,
    SqliteSnapshotRepository,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Project PK/PD analysis graphs into UI-ready JSON.
#[derive(Parser)]
#[command(name = "pkview", version, about)]
struct Args {
    /// Directory of map definitions (default: bundled PK/PD maps).
    #[arg(long, global = true)]
    maps: Option<PathBuf>,

    /// Snapshot store file.
    #[arg(long, global = true, default_value = "pkview.sqlite3")]
    db: PathBuf,

    /// Log level: trace|debug|info|warn|error.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Absolute directory for rolling log files; logging is off without it.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load and cross-check every map definition.
    Validate,
    /// Repair and project a snapshot file.
    Project {
        snapshot: PathBuf,
        /// Projected-shape edits applied before projecting.
        #[arg(long)]
        edits: Option<PathBuf>,
    },
    /// Store a snapshot file as a new revision of NAME.
    Save { name: String, snapshot: PathBuf },
    /// Load the latest revision of NAME and print its projection.
    Load {
        name: String,
        /// Also write the repaired snapshot to this file.
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// List stored snapshot revisions.
    List,
}

fn main() -> Result<()> {
    let args = Args::parse();
    if let Some(log_dir) = &args.log_dir {
        let level = args.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, &log_dir.to_string_lossy())
            .map_err(|err| anyhow!("failed to start logging: {err}"))?;
    }

    let maps_dir = args.maps.clone().unwrap_or_else(default_maps_dir);
    let registry = MapRegistry::load(&maps_dir)
        .with_context(|| format!("failed to load maps from {}", maps_dir.display()))?;

    match args.command {
        Command::Validate => {
            for type_name in registry.type_names() {
                let map = registry.get_map(type_name)?;
                println!(
                    "{type_name} -> {} ({} properties)",
                    map.target_type(),
                    map.properties().len()
                );
            }
            println!("{} map(s) OK", registry.len());
        }
        Command::Project { snapshot, edits } => {
            let conn = open_db_in_memory().context("failed to open scratch store")?;
            let mut session = open_session(registry, &conn);
            let report = session.restore(&read_snapshot(&snapshot)?)?;
            if let Some(edits) = edits {
                let patch = serde_json::from_str(&read_text(&edits)?)
                    .with_context(|| format!("{} is not valid JSON", edits.display()))?;
                let applied = session.apply_edits(&patch)?;
                info!(
                    "event=cli_apply module=cli status=ok updated={} skipped_read_only={}",
                    applied.updated.len(),
                    applied.skipped_read_only.len()
                );
            }
            if report.dropped() > 0 {
                eprintln!("dropped {} stale selection(s)", report.dropped());
            }
            println!("{}", serde_json::to_string_pretty(&session.project()?)?);
        }
        Command::Save { name, snapshot } => {
            let conn = open_db(&args.db).context("failed to open snapshot store")?;
            let mut session = open_session(registry, &conn);
            session.restore(&read_snapshot(&snapshot)?)?;
            let id = session.save(&name)?;
            println!("{id}");
        }
        Command::Load { name, export } => {
            let conn = open_db(&args.db).context("failed to open snapshot store")?;
            let mut session = open_session(registry, &conn);
            let report = session.load(&name)?;
            if report.dropped() > 0 {
                eprintln!("dropped {} stale selection(s)", report.dropped());
            }
            if let Some(export) = export {
                if session.root().is_none() {
                    bail!("no analysis loaded for {name}");
                }
                std::fs::write(&export, session.snapshot()?.to_json_string()?)
                    .with_context(|| format!("failed to write {}", export.display()))?;
            }
            println!("{}", serde_json::to_string_pretty(&session.project()?)?);
        }
        Command::List => {
            let conn = open_db(&args.db).context("failed to open snapshot store")?;
            for summary in open_session(registry, &conn).list()? {
                println!(
                    "{}\t{}\t#{}\t{}\t{}",
                    summary.id,
                    summary.name,
                    summary.sequence,
                    summary.root_type,
                    summary.created_at_ms
                );
            }
        }
    }
    Ok(())
}

fn open_session(
    registry: MapRegistry,
    conn: &Connection,
) -> AnalysisSession<SqliteSnapshotRepository<'_>> {
    AnalysisSession::new(Arc::new(registry), SqliteSnapshotRepository::new(conn))
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn read_snapshot(path: &Path) -> Result<Snapshot> {
    Snapshot::from_json_str(&read_text(path)?)
        .with_context(|| format!("{} is not a snapshot envelope", path.display()))
}
