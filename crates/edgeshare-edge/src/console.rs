//! Operator console for the Edge
//!
//! Reads commands from stdin. Console commands only ever read the registry.

use edgeshare_core::{hash_to_hex, PeerAddr};
use std::fmt::Write as _;
use std::io::BufRead;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::registry::CatalogRegistry;

pub const USAGE: &str = "commands: show_hashes <host:port> | peers | help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    ShowHashes(PeerAddr),
    Peers,
    Help,
    Quit,
}

/// Parse one console line; `Ok(None)` for a blank line
pub fn parse_command(line: &str) -> Result<Option<AdminCommand>, String> {
    let mut parts = line.split_whitespace();
    let Some(cmd) = parts.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = parts.collect();

    match (cmd, args.as_slice()) {
        ("show_hashes", [addr]) => addr
            .parse()
            .map(|addr| Some(AdminCommand::ShowHashes(addr)))
            .map_err(|e| format!("{}\nusage: show_hashes <host:port>", e)),
        ("show_hashes", _) => Err("usage: show_hashes <host:port>".to_string()),
        ("peers", []) => Ok(Some(AdminCommand::Peers)),
        ("help", _) => Ok(Some(AdminCommand::Help)),
        ("quit" | "exit", []) => Ok(Some(AdminCommand::Quit)),
        _ => Err(USAGE.to_string()),
    }
}

/// Produce the output text for a command
pub async fn execute(registry: &CatalogRegistry, command: &AdminCommand) -> String {
    match command {
        AdminCommand::ShowHashes(addr) => match registry.file_records(addr).await {
            Some(records) if records.is_empty() => format!("{} advertises no files", addr),
            Some(records) => {
                let mut out = String::new();
                for record in records {
                    let _ = writeln!(
                        out,
                        "{} -> {}: {} ({} bytes)",
                        addr,
                        record.name,
                        hash_to_hex(&record.content_hash),
                        record.size
                    );
                }
                out.trim_end().to_string()
            }
            None => format!("unknown peer {}", addr),
        },
        AdminCommand::Peers => {
            let snapshot = registry.snapshot().await;
            if snapshot.is_empty() {
                return "no live peers".to_string();
            }
            let mut out = String::new();
            for (addr, files) in &snapshot {
                let _ = writeln!(out, "{} ({} files)", addr, files.len());
            }
            out.trim_end().to_string()
        }
        AdminCommand::Help => USAGE.to_string(),
        AdminCommand::Quit => "shutting down".to_string(),
    }
}

/// Forward stdin lines from a dedicated thread
///
/// A blocking reader thread never holds up runtime shutdown; the thread is
/// simply abandoned when the process exits.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
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

/// Run the console until `quit` or end of input
pub async fn run_console(
    mut lines: mpsc::Receiver<String>,
    registry: Arc<CatalogRegistry>,
    shutdown: watch::Sender<bool>,
) {
    while let Some(line) = lines.recv().await {
        match parse_command(&line) {
            Ok(Some(command)) => {
                println!("{}", execute(&registry, &command).await);
                if command == AdminCommand::Quit {
                    let _ = shutdown.send(true);
                    return;
                }
            }
            Ok(None) => {}
            Err(usage) => println!("{}", usage),
        }
    }
    // Input closed: keep serving, just stop reading commands
    tracing::debug!("Console input closed");
}
