//! Edge configuration

use edgeshare_core::transport::MAX_FRAME_BYTES;
use edgeshare_core::{TransportConfig, DEFAULT_EDGE_PORT, DEFAULT_HEARTBEAT_TIMEOUT_SECS, DEFAULT_IO_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    /// Interface to bind
    pub listen_host: String,

    /// Well-known port peers connect to
    pub port: u16,

    /// Silence after which a peer is evicted
    pub heartbeat_timeout_secs: u64,

    /// Bound on each socket read or write
    pub io_timeout_secs: u64,

    /// Largest request frame accepted
    pub max_frame_bytes: usize,

    /// Optional text export of the catalog, grouped by extension
    pub catalog_export: Option<String>,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".to_string(),
            port: DEFAULT_EDGE_PORT,
            heartbeat_timeout_secs: DEFAULT_HEARTBEAT_TIMEOUT_SECS,
            io_timeout_secs: DEFAULT_IO_TIMEOUT_SECS,
            max_frame_bytes: MAX_FRAME_BYTES,
            catalog_export: None,
        }
    }
}

impl EdgeConfig {
    /// Load configuration from a file
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EdgeConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    /// Cadence of the background eviction sweep
    pub fn eviction_interval(&self) -> Duration {
        (self.heartbeat_timeout() / 2).max(Duration::from_millis(10))
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            io_timeout: Duration::from_secs(self.io_timeout_secs),
            max_frame_bytes: self.max_frame_bytes,
        }
    }

    pub fn catalog_export_path(&self) -> Option<PathBuf> {
        self.catalog_export.as_ref().map(PathBuf::from)
    }
}
