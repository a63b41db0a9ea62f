//! Edgeshare - peer for a hybrid P2P file sharing network

use anyhow::Result;
use clap::{Parser, Subcommand};
use edgeshare_core::catalog::render_by_extension;
use edgeshare_core::hash_to_hex;
use edgeshare_peer::commands::{self, PeerCommand};
use edgeshare_peer::{PeerConfig, PeerNode};
use std::io::BufRead;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "edgeshare")]
#[command(about = "Share a folder and download files from other peers", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "peer.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Edge address as host:port (overrides config)
    #[arg(short, long)]
    edge: Option<String>,

    /// Port to serve downloads on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Shared folder (overrides config)
    #[arg(short, long)]
    folder: Option<String>,

    /// Host to announce to the Edge (overrides config)
    #[arg(long)]
    advertise: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init,
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

    if let Some(Commands::Init) = cli.command {
        return init_config(&cli.config);
    }

    let mut config = PeerConfig::load_or_default(&cli.config)?;
    if let Some(edge) = &cli.edge {
        let addr: edgeshare_core::PeerAddr = edge.parse()?;
        config.edge_host = addr.host;
        config.edge_port = addr.port;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(folder) = cli.folder {
        config.shared_dir = folder;
    }
    if let Some(advertise) = cli.advertise {
        config.advertise_host = advertise;
    }

    tracing::info!("Starting Edgeshare peer");
    tracing::info!("Edge: {}", config.edge_addr());

    let mut node = PeerNode::start(&config).await?;
    println!("{}", commands::USAGE);

    let mut lines = spawn_stdin_reader();
    loop {
        let line = tokio::select! {
            line = lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received");
                break;
            }
        };

        match commands::parse_command(&line) {
            Ok(Some(PeerCommand::Catalog)) => match node.catalog().await {
                Ok(catalog) if catalog.is_empty() => println!("catalog is empty"),
                Ok(catalog) => print!("{}", render_by_extension(&catalog)),
                Err(e) => println!("catalog failed: {}", e),
            },
            Ok(Some(PeerCommand::Get(name))) => match node.get(&name).await {
                Ok(record) => println!(
                    "downloaded {} ({} bytes, sha256 {})",
                    record.name,
                    record.size,
                    hash_to_hex(&record.content_hash)
                ),
                Err(e) => println!("get {} failed: {}", name, e),
            },
            Ok(Some(PeerCommand::Help)) => println!("{}", commands::USAGE),
            Ok(Some(PeerCommand::Quit)) => break,
            Ok(None) => {}
            Err(usage) => println!("{}", usage),
        }
    }

    node.shutdown().await;
    Ok(())
}

/// Forward stdin lines from a dedicated thread so shutdown never waits on input
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn init_config(path: &std::path::Path) -> Result<()> {
    if path.exists() {
        println!("Config already exists at: {}", path.display());
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let config = PeerConfig::default();
    let toml = toml::to_string_pretty(&config)?;
    std::fs::write(path, toml)?;
    std::fs::create_dir_all(config.shared_dir())?;

    println!("Wrote default config to: {}", path.display());
    Ok(())
}
