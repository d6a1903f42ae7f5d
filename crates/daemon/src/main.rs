//! Shellgate Daemon
//!
//! Headless service bridging one remote peer to a local shell.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use daemon::config::Config;
use daemon::network::TerminalServer;
use daemon::session::SessionGateway;

/// Shellgate daemon - serves one interactive terminal to a remote peer.
#[derive(Parser, Debug)]
#[command(name = "shellgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Listen address override (e.g. 127.0.0.1:8080)
    #[arg(short, long, value_name = "ADDR")]
    pub listen: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };

    // Apply environment variable overrides, then CLI overrides
    config.apply_env_overrides();
    if let Some(listen) = cli.listen.clone() {
        config.network.listen_addr = listen;
    }

    // Validate configuration
    config.validate()?;

    // Initialize tracing
    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        config.daemon.log_level.clone()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Shellgate daemon starting...");
    if let Some(config_path) = &cli.config {
        tracing::info!("Using config file: {:?}", config_path);
    }

    let gateway = Arc::new(SessionGateway::new(config.shell_settings()));
    let server = TerminalServer::bind(&config.network.listen_addr, Arc::clone(&gateway)).await?;
    tracing::info!(addr = %server.local_addr(), "transport attached");

    tokio::select! {
        result = server.serve() => result?,
        () = wait_for_shutdown_signal() => {
            tracing::info!("Received shutdown signal");
        }
    }

    // Tear down the active session so no shell process outlives the daemon.
    gateway.shutdown().await;

    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("Failed to register SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
}

/// Wait for a shutdown signal (ctrl-c).
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl-c");
    }
}
