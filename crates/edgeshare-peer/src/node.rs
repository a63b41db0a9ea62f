//! Peer lifecycle
//!
//! A running peer is three independent activities: the announcer, the file
//! service listener, and whatever drives the client (the command loop). They
//! share only the startup file list and the shutdown signal.

use edgeshare_core::catalog::Catalog;
use edgeshare_core::{Error, FileRecord, PeerAddr, Result};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::announcer::Announcer;
use crate::client::PeerClient;
use crate::config::PeerConfig;
use crate::file_service::FileService;
use crate::share::SharedFolder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Init,
    Announced,
    Ready,
    Downloading,
    ShuttingDown,
    Terminated,
}

pub struct PeerNode {
    client: PeerClient,
    share: SharedFolder,
    advertised: PeerAddr,
    listen_addr: SocketAddr,
    state: watch::Sender<NodeState>,
    shutdown: watch::Sender<bool>,
    announcer_task: Option<JoinHandle<()>>,
    listener_task: Option<JoinHandle<()>>,
}

impl PeerNode {
    /// Scan the shared folder, start serving, and announce to the Edge
    ///
    /// An unreachable Edge does not stop the peer from starting; the
    /// announcer keeps retrying in the background.
    pub async fn start(config: &PeerConfig) -> Result<Self> {
        let (state, _) = watch::channel(NodeState::Init);
        let transport = config.transport();

        let share = SharedFolder::open(&config.shared_dir())?;

        let listener = TcpListener::bind((config.listen_host.as_str(), config.port))
            .await
            .map_err(|e| {
                Error::ConnectionFailed(format!(
                    "failed to bind {}:{}: {}",
                    config.listen_host, config.port, e
                ))
            })?;
        let listen_addr = listener.local_addr()?;
        // Port 0 binds an ephemeral port; advertise the one we actually got
        let advertised = PeerAddr {
            port: listen_addr.port(),
            ..config.advertised_addr()
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let service = FileService::new(share.clone(), transport.clone());
        let listener_task = tokio::spawn(service.run(listener, shutdown_rx.clone()));

        let announcer = Announcer::new(
            config.edge_addr(),
            advertised.clone(),
            share.files(),
            transport.clone(),
            config.heartbeat_interval(),
        );
        let registered = match announcer.announce().await {
            Ok(()) => {
                state.send_replace(NodeState::Announced);
                true
            }
            Err(e) => {
                tracing::warn!("Initial announce to {} failed: {}", config.edge_addr(), e);
                false
            }
        };
        let announcer_task = tokio::spawn(announcer.run(registered, shutdown_rx));

        let client = PeerClient::new(
            config.edge_addr(),
            share.clone(),
            Some(advertised.clone()),
            transport,
        );
        state.send_replace(NodeState::Ready);

        Ok(Self {
            client,
            share,
            advertised,
            listen_addr,
            state,
            shutdown,
            announcer_task: Some(announcer_task),
            listener_task: Some(listener_task),
        })
    }

    pub fn state(&self) -> NodeState {
        *self.state.borrow()
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn advertised(&self) -> &PeerAddr {
        &self.advertised
    }

    pub fn share(&self) -> &SharedFolder {
        &self.share
    }

    pub fn client(&self) -> &PeerClient {
        &self.client
    }

    pub async fn catalog(&self) -> Result<Catalog> {
        self.client.catalog().await
    }

    /// Download a file into the shared folder
    pub async fn get(&self, filename: &str) -> Result<FileRecord> {
        self.state.send_replace(NodeState::Downloading);
        let result = self.client.get(filename).await;
        self.state.send_replace(NodeState::Ready);
        result
    }

    /// Stop the announcer, then the listener
    pub async fn shutdown(&mut self) {
        if self.state() == NodeState::Terminated {
            return;
        }
        self.state.send_replace(NodeState::ShuttingDown);
        let _ = self.shutdown.send(true);

        if let Some(task) = self.announcer_task.take() {
            if let Err(e) = task.await {
                tracing::error!("Announcer task failed: {}", e);
            }
        }
        if let Some(task) = self.listener_task.take() {
            if let Err(e) = task.await {
                tracing::error!("File service task failed: {}", e);
            }
        }

        self.state.send_replace(NodeState::Terminated);
        tracing::info!("Peer {} terminated", self.advertised);
    }
}
