//! Edgeshare Edge - central directory server

use anyhow::Result;
use clap::Parser;
use edgeshare_edge::{console, EdgeConfig, EdgeServer};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "edgeshare-edge")]
#[command(about = "Edgeshare directory server", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "edge.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Seconds of silence before a peer is evicted (overrides config)
    #[arg(long)]
    timeout: Option<u64>,

    /// Write the catalog grouped by extension to this file (overrides config)
    #[arg(long)]
    export: Option<String>,

    /// Do not read operator commands from stdin
    #[arg(long)]
    no_console: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let mut config = EdgeConfig::load_or_default(&cli.config)?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(timeout) = cli.timeout {
        config.heartbeat_timeout_secs = timeout;
    }
    if cli.export.is_some() {
        config.catalog_export = cli.export;
    }

    tracing::info!("Starting Edgeshare Edge");
    tracing::info!("Protocol version: {}", edgeshare_core::PROTOCOL_VERSION);
    tracing::info!(
        "Heartbeat timeout: {}s, eviction every {:?}",
        config.heartbeat_timeout_secs,
        config.eviction_interval()
    );

    let server = EdgeServer::bind(&config).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if !cli.no_console {
        println!("{}", console::USAGE);
        tokio::spawn(console::run_console(
            console::spawn_stdin_reader(),
            server.registry(),
            shutdown_tx.clone(),
        ));
    }

    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received");
            let _ = ctrl_c_tx.send(true);
        }
    });

    server.run(shutdown_rx).await?;
    tracing::info!("Shut down");

    Ok(())
}
