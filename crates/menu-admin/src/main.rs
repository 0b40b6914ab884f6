// ============================================================================
// Menu Admin - Command Line Entry Point
// File: crates/menu-admin/src/main.rs
// Description: menuctl, drives the menu tree engine from the shell
// ============================================================================

mod bootstrap;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use menu_core::domain::{MoveRequest, NewItem, SortEntry, UpsertMenuRequest};
use menu_core::MenuTreeEngine;
use menu_shared::config::AppConfig;
use menu_shared::telemetry::init_cli_telemetry;
use menu_shared::{ItemId, Position, SectionId};

#[derive(Parser)]
#[command(name = "menuctl", version)]
#[command(about = "Inspect and restructure the navigation menu tree")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Upsert payload applied before the command (handy with the memory backend)
    #[arg(long, env = "MENUCTL_SEED")]
    seed: Option<PathBuf>,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the whole menu as JSON
    Show,
    /// Move an item (and its subtree) to a new parent/position
    Move {
        #[arg(long)]
        item: ItemId,
        /// Omit to make the item a root
        #[arg(long)]
        parent: Option<ItemId>,
        #[arg(long)]
        position: Position,
        #[arg(long)]
        section: Option<SectionId>,
    },
    /// Apply a JSON array of sort entries
    Sort {
        #[arg(long)]
        file: PathBuf,
    },
    /// Replace the left/main/right sections from a JSON payload
    Upsert {
        #[arg(long)]
        file: PathBuf,
    },
    /// Insert one item from a JSON object
    Create {
        #[arg(long)]
        file: PathBuf,
    },
    /// Delete an item and its descendants
    DeleteItem { id: ItemId },
    /// Delete a section and all of its items
    DeleteSection { id: SectionId },
    /// Apply the bundled PostgreSQL migrations
    Migrate,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(engine: &MenuTreeEngine, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Show => print_json(&engine.load_menu().await?),
        Commands::Move { item, parent, position, section } => {
            let request = MoveRequest { item_id: item, parent_id: parent, position, section_id: section };
            print_json(&engine.move_subtree(request).await?)
        }
        Commands::Sort { file } => {
            let entries: Vec<SortEntry> = read_json(&file)?;
            print_json(&engine.sort_items(entries).await?)
        }
        Commands::Upsert { file } => {
            let request: UpsertMenuRequest = read_json(&file)?;
            print_json(&engine.upsert_menu(request).await?)
        }
        Commands::Create { file } => {
            let item: NewItem = read_json(&file)?;
            print_json(&engine.create_item(item).await?)
        }
        Commands::DeleteItem { id } => print_json(&engine.delete_item(id).await?),
        Commands::DeleteSection { id } => print_json(&engine.delete_section(id).await?),
        Commands::Migrate => anyhow::bail!("migrate runs without an engine"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_cli_telemetry(&cli.log_level);

    let config = AppConfig::load().context("Failed to load configuration")?;
    info!(env = %config.app.env, backend = ?config.database.backend, "Configuration loaded");

    if matches!(cli.command, Commands::Migrate) {
        return bootstrap::migrate(&config).await;
    }

    let engine = bootstrap::build_engine(&config).await?;

    if let Some(seed) = &cli.seed {
        let request: UpsertMenuRequest = read_json(seed)?;
        engine.upsert_menu(request).await.context("Failed to apply seed payload")?;
    }

    let result = run(&engine, cli.command).await;
    engine.flush_notifications().await;
    result
}
