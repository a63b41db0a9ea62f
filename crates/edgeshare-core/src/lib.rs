//! Edgeshare Core - Shared types, protocols, and utilities
//!
//! This crate provides the building blocks shared by the Edgeshare directory
//! server (the Edge) and its peers: the wire protocol, framed TCP transport,
//! content digests, and the error taxonomy.

pub mod catalog;
pub mod digest;
pub mod error;
pub mod proto;
pub mod transport;
pub mod types;

pub use catalog::Catalog;
pub use error::{Error, ErrorKind, Result};
pub use transport::{PeerAddr, TransportConfig};
pub use types::*;

/// Protocol version
pub const PROTOCOL_VERSION: u8 = 1;

/// Well-known port the Edge listens on
pub const DEFAULT_EDGE_PORT: u16 = 5000;

/// Default port a peer serves downloads on
pub const DEFAULT_PEER_PORT: u16 = 6000;

/// Default interval between heartbeats, in seconds
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Default time after which a silent peer is evicted, in seconds
pub const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 60;

/// Default bound on any single socket operation, in seconds
pub const DEFAULT_IO_TIMEOUT_SECS: u64 = 10;

/// Buffer size used when hashing and streaming file content: 64 KB
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;
