//! Auto-Forward Bot - Main Entry Point
//!
//! A Telegram bot through which users log in their own account and have
//! posts of a source channel re-sent to their target channels.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use study_forward_bot::config::{BotSettings, TelegramConfig};
use study_forward_bot::forward::{ForwardService, SessionConnector, SettingsStore};
use study_forward_bot::telegram::TelegramBot;
use study_forward_bot::updates::{RunnerMessage, UpdateRunner};

/// Telegram bot forwarding channel posts through users' own accounts.
#[derive(Parser, Debug)]
#[command(name = "autoforward_bot")]
#[command(about = "Forward channel posts with text substitution")]
#[command(version)]
struct Args {
    /// Directory for per-user settings and account sessions (overrides
    /// SESSIONS_DIR).
    #[arg(short, long)]
    settings_dir: Option<PathBuf>,

    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    let tg_config = TelegramConfig::from_env()
        .context("Failed to load Telegram configuration from environment")?;

    let mut settings = BotSettings::from_env_with_defaults();
    if let Some(dir) = args.settings_dir {
        settings.sessions_dir = dir;
    }
    std::fs::create_dir_all(&settings.sessions_dir).with_context(|| {
        format!("Failed to create {}", settings.sessions_dir.display())
    })?;

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

    let store = SettingsStore::new(&settings.sessions_dir);
    let connector = SessionConnector::new(
        tg_config.api_id,
        tg_config.api_hash.clone(),
        store.clone(),
        settings.send_interval_ms,
    );

    let bot = Arc::new(bot);
    let service = Arc::new(ForwardService::new(
        connector,
        Arc::clone(&bot),
        store,
        &settings,
    ));

    match service.resume_sessions().await {
        Ok(count) => info!("{} accounts forwarding", count),
        Err(e) => warn!("Could not resume stored sessions: {}", e),
    }

    let runner = UpdateRunner::new(Arc::clone(&bot), Arc::clone(&service));
    let (runner_tx, runner_rx) = mpsc::channel::<RunnerMessage>(4);
    let runner_handle = tokio::spawn(async move {
        runner.run(runner_rx).await;
    });

    info!("Auto-forward bot is running. Use Ctrl+C to stop.");

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
    }
    info!("Received Ctrl+C, shutting down...");

    let _ = runner_tx.send(RunnerMessage::Shutdown).await;
    let _ = runner_handle.await;
    service.shutdown().await;
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
