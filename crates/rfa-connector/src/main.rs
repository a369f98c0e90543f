//! RFA Connector - Main entry point

use anyhow::Result;
use clap::Parser;
use rfa_common::logging::{init_logging, LogConfig, LogLevel};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use rfa_connector::{
    config::{AcquisitionMode, Config},
    persist::MssqlSink,
    pipeline::Pipeline,
    stream::StreamAcquisition,
    watcher::FileAcquisition,
};

#[derive(Parser, Debug)]
#[command(name = "rfa-connector")]
#[command(author, version, about = "RFA analyzer to order database connector")]
struct Cli {
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the CLI-built defaults
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("rfa-connector".to_string())
        .build()
        .overlay_env()?;

    init_logging(&log_config)?;

    info!("Starting the RFA connector");

    // Configuration errors are fatal here; everything after startup is
    // recovered locally by the acquisition loops.
    let config = Config::load()?;

    let sink = Arc::new(MssqlSink::new(config.connections.clone()));
    let pipeline = Pipeline::new(sink);

    let cancel = CancellationToken::new();

    let handle = match config.mode.clone() {
        AcquisitionMode::Tcp { host, port } => {
            info!(host = %host, port, "TCP mode selected");
            let acquisition = StreamAcquisition::new(host, port, pipeline);
            tokio::spawn(acquisition.run(cancel.clone()))
        },
        AcquisitionMode::FileWatch { directory } => {
            info!(dir = %directory.display(), "File watch mode selected");
            let acquisition =
                FileAcquisition::new(directory, config.max_concurrent_files, pipeline);
            tokio::spawn(acquisition.run(cancel.clone()))
        },
    };

    info!("RFA connector ready");

    shutdown_signal().await;

    info!("Stopping the RFA connector");
    cancel.cancel();

    // Bounded grace period; an overrunning acquisition task is dropped.
    let grace = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(grace, handle).await.is_err() {
        warn!(
            timeout_secs = config.shutdown_timeout_secs,
            "Acquisition did not stop within the grace period, abandoning it"
        );
    }

    info!("RFA connector shut down gracefully");

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
