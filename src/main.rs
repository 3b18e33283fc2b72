#![forbid(unsafe_code)]

//! `agent-switchboard` console binary.
//!
//! Loads configuration, opens the channel store, optionally binds the
//! console channel to a workspace, and runs the console surface until stdin
//! closes or a shutdown signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use agent_switchboard::config::GlobalConfig;
use agent_switchboard::console::{self, ConsoleOptions};
use agent_switchboard::orchestrator::{ChannelRegistry, Dispatcher};
use agent_switchboard::persistence::channel_repo::ChannelRepo;
use agent_switchboard::persistence::db;
use agent_switchboard::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "agent-switchboard",
    about = "Drive a coding-assistant CLI per channel with human approval",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file. Built-in defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json). Logs go to stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Channel identifier used for console input.
    #[arg(long, default_value = "console")]
    channel: String,

    /// Bind the console channel to this directory at startup.
    #[arg(long)]
    workspace: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-switchboard bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    let config = Arc::new(config);
    info!(host_cli = %config.host_cli, "configuration loaded");

    // ── Initialize database ─────────────────────────────
    let db = Arc::new(db::connect(&config.db_path).await?);
    let repo = ChannelRepo::new(Arc::clone(&db));
    info!(path = %config.db_path.display(), "database connected");

    if let Some(workspace) = &args.workspace {
        let canonical = workspace
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid workspace: {err}")))?;
        let binding = repo.bind(&args.channel, &canonical).await?;
        info!(
            channel_id = %binding.channel_id,
            directory = %binding.directory.display(),
            "console channel bound"
        );
    }

    // ── Wire the console surface ────────────────────────
    let (events_tx, events_rx) = mpsc::channel(config.event_buffer);
    let registry = ChannelRegistry::new();
    let dispatcher = Dispatcher::new(
        Arc::clone(&config),
        registry.clone(),
        repo,
        events_tx,
    );
    let options = ConsoleOptions {
        channel_id: args.channel.clone(),
        max_output_length: config.max_output_length,
    };

    let ct = CancellationToken::new();
    let mut console_handle = tokio::spawn(console::run(dispatcher, events_rx, options, ct.clone()));

    // ── Wait for shutdown signal or end of input ────────
    tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown signal received");
            for channel_id in registry.active_channels() {
                registry.abort(&channel_id);
            }
            ct.cancel();
        }
        result = &mut console_handle => {
            info!("agent-switchboard shut down");
            return result
                .map_err(|err| AppError::Io(format!("console task failed: {err}")))?;
        }
    }

    if let Err(err) = console_handle.await {
        warn!(%err, "console task ended abnormally");
    }
    info!("agent-switchboard shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
