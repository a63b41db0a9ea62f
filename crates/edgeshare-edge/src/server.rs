//! Edge network front-end
//!
//! Accepts connections on the well-known port and serves each on its own
//! task: read one request, write one response, close. A background janitor
//! evicts silent peers every half timeout.

use edgeshare_core::proto::{self, error_codes};
use edgeshare_core::transport::{read_frame, timed, write_envelope};
use edgeshare_core::{Error, Result, TransportConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::config::EdgeConfig;
use crate::export::CatalogExporter;
use crate::handler::MessageHandler;
use crate::registry::CatalogRegistry;

/// A bound Edge server, ready to run
pub struct EdgeServer {
    listener: TcpListener,
    handler: MessageHandler,
    exporter: Option<Arc<CatalogExporter>>,
    transport: TransportConfig,
    eviction_interval: Duration,
}

impl EdgeServer {
    /// Bind the listener and create an empty registry
    pub async fn bind(config: &EdgeConfig) -> Result<Self> {
        let bind_addr = (config.listen_host.as_str(), config.port);
        let listener = TcpListener::bind(bind_addr).await.map_err(|e| {
            Error::ConnectionFailed(format!(
                "failed to bind {}:{}: {}",
                config.listen_host, config.port, e
            ))
        })?;

        let registry = Arc::new(CatalogRegistry::new(config.heartbeat_timeout()));
        let exporter = config
            .catalog_export_path()
            .map(|path| Arc::new(CatalogExporter::new(path)));
        if let Some(exporter) = &exporter {
            exporter.clear().await?;
        }

        tracing::info!("Edge listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            handler: MessageHandler::new(registry, exporter.clone()),
            exporter,
            transport: config.transport(),
            eviction_interval: config.eviction_interval(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> Arc<CatalogRegistry> {
        self.handler.registry().clone()
    }

    /// Serve until `shutdown` flips to true, then clear the catalog
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let registry = self.handler.registry().clone();
        let janitor = tokio::spawn(run_janitor(
            self.handler.clone(),
            self.eviction_interval,
            shutdown.clone(),
        ));

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        let handler = self.handler.clone();
                        let transport = self.transport.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(stream, remote, &handler, &transport).await {
                                tracing::warn!("Connection from {} failed: {}", remote, e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Accept failed: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Edge shutting down, clearing catalog");
        if let Err(e) = janitor.await {
            tracing::error!("Janitor task failed: {}", e);
        }
        let dropped = registry.clear().await;
        tracing::info!("Dropped {} catalog entries", dropped);
        if let Some(exporter) = &self.exporter {
            exporter.clear().await?;
        }

        Ok(())
    }
}

/// Serve a single request/response exchange
async fn serve_connection(
    mut stream: TcpStream,
    remote: SocketAddr,
    handler: &MessageHandler,
    transport: &TransportConfig,
) -> Result<()> {
    let frame = timed(
        transport.io_timeout,
        "read request",
        read_frame(&mut stream, transport.max_frame_bytes),
    )
    .await;

    let response = match frame {
        Ok(frame) => handler.handle(&frame, remote).await,
        Err(e) if e.kind() == edgeshare_core::ErrorKind::Protocol => {
            tracing::warn!("Malformed frame from {}: {}", remote, e);
            proto::error_response(0, error_codes::INVALID_MESSAGE, e.to_string())
        }
        Err(e) => return Err(e),
    };

    timed(
        transport.io_timeout,
        "write response",
        write_envelope(&mut stream, &response),
    )
    .await
}

/// Periodically evict peers that stopped signalling
async fn run_janitor(handler: MessageHandler, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let registry = handler.registry().clone();
    let timeout = registry.timeout();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let evicted = registry.evict_expired(timeout).await;
                for addr in &evicted {
                    tracing::info!("Removing {} (inactive)", addr);
                }
                if !evicted.is_empty() {
                    handler.export().await;
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
