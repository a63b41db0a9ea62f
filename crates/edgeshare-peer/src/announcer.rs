//! Announcing the shared folder and keeping the Edge entry alive
//!
//! The announcer runs on its own task. A failed heartbeat is logged and
//! retried on the next tick; an Edge that no longer knows us gets a full
//! re-announce instead.

use edgeshare_core::proto::{self, Payload};
use edgeshare_core::{transport, Error, ErrorKind, FileRecord, PeerAddr, Result, TransportConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::client::next_request_id;

#[derive(Clone)]
pub struct Announcer {
    edge: PeerAddr,
    advertised: PeerAddr,
    files: Arc<[FileRecord]>,
    transport: TransportConfig,
    interval: Duration,
}

impl Announcer {
    pub fn new(
        edge: PeerAddr,
        advertised: PeerAddr,
        files: &[FileRecord],
        transport: TransportConfig,
        interval: Duration,
    ) -> Self {
        Self {
            edge,
            advertised,
            files: files.into(),
            transport,
            interval,
        }
    }

    /// Send the full file list
    pub async fn announce(&self) -> Result<()> {
        let files = self.files.iter().map(FileRecord::to_proto).collect();
        let request = proto::announce(next_request_id(), self.advertised.to_proto(), files);
        self.expect_ack(&request).await?;
        tracing::info!(
            "Announced {} files to {} as {}",
            self.files.len(),
            self.edge,
            self.advertised
        );
        Ok(())
    }

    /// Refresh our entry; `Error::NotFound` means the Edge forgot us
    pub async fn heartbeat(&self) -> Result<()> {
        let request = proto::heartbeat(next_request_id(), self.advertised.to_proto());
        self.expect_ack(&request).await?;
        tracing::debug!("Heartbeat acknowledged by {}", self.edge);
        Ok(())
    }

    async fn expect_ack(&self, request: &proto::Envelope) -> Result<()> {
        let response = transport::request(&self.edge, request, &self.transport).await?;
        match response.into_payload()? {
            Payload::Ack(_) => Ok(()),
            Payload::ErrorResponse(err) => Err(err.into_error()),
            other => Err(Error::Protocol(format!(
                "expected ack, got {}",
                other.name()
            ))),
        }
    }

    /// One scheduled tick: heartbeat when registered, announce otherwise
    ///
    /// Returns whether the Edge holds our entry afterwards.
    pub async fn tick(&self, registered: bool) -> bool {
        if registered {
            match self.heartbeat().await {
                Ok(()) => return true,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::info!("Edge no longer knows {}, re-announcing", self.advertised);
                }
                Err(e) => {
                    tracing::warn!("Heartbeat to {} failed: {}", self.edge, e);
                    return true;
                }
            }
        }

        match self.announce().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Announce to {} failed: {}", self.edge, e);
                false
            }
        }
    }

    /// Tick on a fixed interval until `shutdown` flips to true
    pub async fn run(self, mut registered: bool, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; the startup announce covered it
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    registered = self.tick(registered).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::debug!("Announcer stopped");
    }
}
