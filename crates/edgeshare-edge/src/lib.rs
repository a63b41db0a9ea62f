//! Edgeshare Edge Library
//!
//! The Edge is the single directory authority: it tracks which peer
//! advertises which files and answers catalog queries. It never carries
//! file content.

pub mod config;
pub mod console;
pub mod export;
pub mod handler;
pub mod registry;
pub mod server;

pub use config::EdgeConfig;
pub use registry::CatalogRegistry;
pub use server::EdgeServer;
