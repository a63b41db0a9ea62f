//! Edgeshare Peer Library
//!
//! A peer announces its shared folder to the Edge, keeps its entry alive
//! with heartbeats, serves files to other peers, and downloads files from
//! them after resolving ownership through the catalog.

pub mod announcer;
pub mod client;
pub mod commands;
pub mod config;
pub mod file_service;
pub mod node;
pub mod share;

pub use client::PeerClient;
pub use config::PeerConfig;
pub use node::{NodeState, PeerNode};
pub use share::SharedFolder;
