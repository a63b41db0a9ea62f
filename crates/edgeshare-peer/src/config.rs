//! Peer configuration

use edgeshare_core::transport::MAX_FRAME_BYTES;
use edgeshare_core::{
    PeerAddr, TransportConfig, DEFAULT_EDGE_PORT, DEFAULT_HEARTBEAT_INTERVAL_SECS,
    DEFAULT_IO_TIMEOUT_SECS, DEFAULT_PEER_PORT,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Edge host
    pub edge_host: String,

    /// Edge port
    pub edge_port: u16,

    /// Interface the download listener binds
    pub listen_host: String,

    /// Host announced to the Edge; unspecified means "the address the Edge sees"
    pub advertise_host: String,

    /// Port this peer serves downloads on
    pub port: u16,

    /// Shared folder path (`~/` expands to the home directory)
    pub shared_dir: String,

    /// Seconds between heartbeats
    pub heartbeat_interval_secs: u64,

    /// Bound on each socket operation, in seconds
    pub io_timeout_secs: u64,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            edge_host: "127.0.0.1".to_string(),
            edge_port: DEFAULT_EDGE_PORT,
            listen_host: "0.0.0.0".to_string(),
            advertise_host: "0.0.0.0".to_string(),
            port: DEFAULT_PEER_PORT,
            shared_dir: "shared".to_string(),
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            io_timeout_secs: DEFAULT_IO_TIMEOUT_SECS,
        }
    }
}

impl PeerConfig {
    /// Load configuration from a file
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PeerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Expand ~ in shared_dir path
    pub fn shared_dir(&self) -> PathBuf {
        expand_path(&self.shared_dir)
    }

    pub fn edge_addr(&self) -> PeerAddr {
        PeerAddr::new(self.edge_host.clone(), self.edge_port)
    }

    /// Address announced to the Edge
    pub fn advertised_addr(&self) -> PeerAddr {
        PeerAddr::new(self.advertise_host.clone(), self.port)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            io_timeout: Duration::from_secs(self.io_timeout_secs),
            max_frame_bytes: MAX_FRAME_BYTES,
        }
    }
}

/// Expand a leading `~/` to the home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
