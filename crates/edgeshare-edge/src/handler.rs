//! Message handler for the Edge
//!
//! Decodes one request frame, dispatches it to the registry, and builds the
//! single response for that connection.

use edgeshare_core::proto::{self, error_codes, Announce, Envelope, Heartbeat, Payload};
use edgeshare_core::{catalog, Error, FileRecord, PeerAddr};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::export::CatalogExporter;
use crate::registry::CatalogRegistry;

/// Handler for processing protocol messages
#[derive(Clone)]
pub struct MessageHandler {
    registry: Arc<CatalogRegistry>,
    exporter: Option<Arc<CatalogExporter>>,
}

impl MessageHandler {
    /// Create a new message handler
    pub fn new(registry: Arc<CatalogRegistry>, exporter: Option<Arc<CatalogExporter>>) -> Self {
        Self { registry, exporter }
    }

    pub fn registry(&self) -> &Arc<CatalogRegistry> {
        &self.registry
    }

    /// Process one request frame from `remote` and return the response
    pub async fn handle(&self, frame: &[u8], remote: SocketAddr) -> Envelope {
        // Decode the envelope
        let envelope = match Envelope::from_bytes(frame) {
            Ok(env) => env,
            Err(Error::VersionMismatch { expected, actual }) => {
                tracing::warn!("Version mismatch from {}: got {}", remote, actual);
                return proto::error_response(
                    0,
                    error_codes::VERSION_MISMATCH,
                    format!("expected protocol version {}, got {}", expected, actual),
                );
            }
            Err(e) => {
                tracing::warn!("Failed to decode message from {}: {}", remote, e);
                return proto::error_response(
                    0,
                    error_codes::INVALID_MESSAGE,
                    format!("decode error: {}", e),
                );
            }
        };

        let request_id = envelope.request_id;
        match envelope.payload {
            Some(Payload::Announce(req)) => self.handle_announce(request_id, req, remote).await,
            Some(Payload::Heartbeat(req)) => self.handle_heartbeat(request_id, req, remote).await,
            Some(Payload::CatalogRequest(_)) => self.handle_catalog(request_id).await,
            Some(other) => {
                tracing::warn!("Unexpected message type from {}: {}", remote, other.name());
                proto::error_response(
                    request_id,
                    error_codes::INVALID_MESSAGE,
                    format!("unexpected message type {}", other.name()),
                )
            }
            None => {
                tracing::warn!("Empty or unrecognized payload from {}", remote);
                proto::error_response(
                    request_id,
                    error_codes::INVALID_MESSAGE,
                    "empty or unrecognized payload".to_string(),
                )
            }
        }
    }

    /// Handle an announce: replace the peer's entry wholesale
    async fn handle_announce(&self, request_id: u64, req: Announce, remote: SocketAddr) -> Envelope {
        let addr = match resolve_address(req.address.as_ref(), remote) {
            Ok(addr) => addr,
            Err(e) => return invalid(request_id, e),
        };

        let files = match req
            .files
            .into_iter()
            .map(FileRecord::from_proto)
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!("Rejected announce from {}: {}", addr, e);
                return proto::error_response(request_id, error_codes::INVALID_DATA, e.to_string());
            }
        };

        tracing::info!("Announce {} -> {} files", addr, files.len());
        self.registry.register(addr, files).await;
        self.export().await;

        proto::ack(request_id)
    }

    /// Handle a heartbeat: refresh liveness only
    async fn handle_heartbeat(&self, request_id: u64, req: Heartbeat, remote: SocketAddr) -> Envelope {
        let addr = match resolve_address(req.address.as_ref(), remote) {
            Ok(addr) => addr,
            Err(e) => return invalid(request_id, e),
        };

        match self.registry.heartbeat(&addr).await {
            Ok(()) => {
                tracing::debug!("Heartbeat {}", addr);
                proto::ack(request_id)
            }
            Err(e) => {
                tracing::info!("Heartbeat from unregistered {}: {}", addr, e);
                proto::error_response(request_id, error_codes::NOT_FOUND, e.to_string())
            }
        }
    }

    /// Handle a catalog request with a consistent snapshot
    async fn handle_catalog(&self, request_id: u64) -> Envelope {
        let snapshot = self.registry.snapshot().await;
        tracing::debug!("Catalog request: {} peers", snapshot.len());
        proto::catalog_response(request_id, catalog::to_proto(&snapshot))
    }

    /// Refresh the text export, if one is configured
    pub async fn export(&self) {
        if let Some(exporter) = &self.exporter {
            if let Err(e) = exporter.write(&self.registry).await {
                tracing::error!("Failed to write catalog export {}: {}", exporter.path().display(), e);
            }
        }
    }
}

/// Peer address from a message, with the observed IP filling an unspecified host
fn resolve_address(
    address: Option<&proto::PeerAddress>,
    remote: SocketAddr,
) -> edgeshare_core::Result<PeerAddr> {
    let address = address.ok_or_else(|| Error::Protocol("missing peer address".to_string()))?;
    let mut addr = PeerAddr::from_proto(address)?;
    if addr.is_unspecified() {
        addr.host = remote.ip().to_string();
    }
    Ok(addr)
}

fn invalid(request_id: u64, e: Error) -> Envelope {
    tracing::warn!("Invalid request: {}", e);
    proto::error_response(request_id, error_codes::INVALID_MESSAGE, e.to_string())
}
