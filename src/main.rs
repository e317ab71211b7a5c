//! Study Materials Bot - Main Entry Point
//!
//! A Telegram bot that serves a catalog of study materials organised as
//! exam › subject › publisher › sub-folder, with admin upload and backup.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use study_forward_bot::catalog::{CatalogRoot, JsonCatalogStore};
use study_forward_bot::commands::{CatalogService, CommandHandler};
use study_forward_bot::config::{BotSettings, TelegramConfig};
use study_forward_bot::telegram::TelegramBot;
use study_forward_bot::updates::{RunnerMessage, UpdateRunner};

/// Telegram bot serving a study-materials catalog.
#[derive(Parser, Debug)]
#[command(name = "materials_bot")]
#[command(about = "Browse and manage study materials over Telegram")]
#[command(version)]
struct Args {
    /// Path to the catalog JSON file (overrides CATALOG_PATH).
    #[arg(short, long)]
    catalog: Option<PathBuf>,

    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Write the default catalog to the catalog path and exit.
    #[arg(long)]
    generate_catalog: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    let mut settings = BotSettings::from_env_with_defaults();
    if let Some(path) = args.catalog {
        settings.catalog_path = path;
    }

    if args.generate_catalog {
        return generate_catalog(&settings);
    }

    let tg_config = TelegramConfig::from_env()
        .context("Failed to load Telegram configuration from environment")?;

    match settings.owner_id {
        Some(owner) => info!("Owner: {}", owner),
        None => warn!("ADMIN_ID is not set; nobody can manage admins"),
    }
    if settings.backup_channel_id.is_none() {
        warn!("BACKUP_CHANNEL_ID is not set; /backup and /restore are disabled");
    }

    let service = CatalogService::open(
        JsonCatalogStore::new(&settings.catalog_path),
        settings.owner_id,
    );
    let stats = service.catalog().stats();
    info!(
        "Catalog {}: {} exams, {} subjects, {} publishers, {} files",
        settings.catalog_path.display(),
        stats.exams,
        stats.subjects,
        stats.publishers,
        stats.files
    );
    if service.is_degraded() {
        warn!("Catalog storage is degraded; deleting stays disabled until /restore");
    }

    let bot = TelegramBot::connect(
        tg_config.api_id,
        &tg_config.api_hash,
        &tg_config.session_path,
        settings.send_interval_ms,
    )
    .await
    .context("Failed to connect to Telegram")?;

    bot.bot_sign_in(&tg_config.bot_token)
        .await
        .context("Bot sign-in failed")?;

    let bot = Arc::new(bot);
    let handler = Arc::new(CommandHandler::new(Arc::clone(&bot), service, &settings));
    let runner = UpdateRunner::new(Arc::clone(&bot), handler);

    let (runner_tx, runner_rx) = mpsc::channel::<RunnerMessage>(4);
    let runner_handle = tokio::spawn(async move {
        runner.run(runner_rx).await;
    });

    info!("Materials bot is running. Use Ctrl+C to stop.");

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
    }
    info!("Received Ctrl+C, shutting down...");

    let _ = runner_tx.send(RunnerMessage::Shutdown).await;
    let _ = runner_handle.await;
    bot.disconnect();

    Ok(())
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Writes the seeded catalog so it can be edited by hand.
fn generate_catalog(settings: &BotSettings) -> Result<()> {
    let store = JsonCatalogStore::new(&settings.catalog_path);
    if store.path().exists() {
        anyhow::bail!("{} already exists", store.path().display());
    }
    store
        .save(&CatalogRoot::default())
        .context("Failed to write catalog")?;

    println!("✓ Catalog written to: {}", store.path().display());
    println!("\nTo run the bot:");
    println!("1. Create a .env file with API_ID, API_HASH, BOT_TOKEN and ADMIN_ID");
    println!("2. Optionally set BACKUP_CHANNEL_ID for /backup and /restore");
    println!("3. Run: materials_bot");

    Ok(())
}
