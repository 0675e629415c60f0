//! Sockgate - SOCKS5 gateway and forwarder
//!
//! This is the main entry point for the Sockgate application.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sockgate::config::load_config;
use sockgate::helper::set_nofile;
use sockgate::{run_forwarder, run_gateway};
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Sockgate - SOCKS5 authenticating gateway and forwarding front-end
#[derive(Parser, Debug)]
#[command(name = "sockgate")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,

    /// Raise the open file descriptor limit before listening
    #[arg(long)]
    nofile: Option<u64>,

    /// Role to run
    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    /// Authenticating gateway, connects to destinations directly
    Gateway,
    /// Local front-end that tunnels to an upstream gateway
    Forward,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level, args.json_log)?;

    if let Some(nofile) = args.nofile {
        if let Err(e) = set_nofile(nofile) {
            warn!("Failed to set open file limit to {}: {}", nofile, e);
        }
    }

    // Load configuration
    let config = load_config(&args.config)?;

    info!("Sockgate v{}", sockgate::VERSION);
    info!("Configuration loaded from: {:?}", args.config);

    // Setup shutdown signal
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    // Handle Ctrl+C and termination signals (cross-platform)
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_signal().await {
            warn!("Failed to listen for shutdown signals: {}", e);
            return;
        }
        let _ = shutdown_tx_clone.send(true);
    });

    match args.role {
        Role::Gateway => run_gateway(&config, shutdown_rx)
            .await
            .context("Gateway terminated"),
        Role::Forward => run_forwarder(&config, shutdown_rx)
            .await
            .context("Forwarder terminated"),
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Received Ctrl+C, shutting down...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    // On Windows, only handle Ctrl+C
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down...");
    Ok(())
}

/// Setup logging based on configuration
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
