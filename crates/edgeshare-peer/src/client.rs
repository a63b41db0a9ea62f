//! Catalog queries and downloads
//!
//! Every `get` starts from a fresh catalog snapshot, picks owners in
//! ascending address order, and verifies the streamed bytes against the
//! digest the owner announced before the file appears in the shared folder.

use edgeshare_core::catalog::{self, Catalog};
use edgeshare_core::digest::StreamDigest;
use edgeshare_core::proto::{self, Payload};
use edgeshare_core::transport::{self, read_envelope, timed, write_envelope};
use edgeshare_core::{
    hash_from_slice, hash_to_hex, ContentHash, Error, ErrorKind, FileRecord, PeerAddr, Result,
    TransportConfig, STREAM_CHUNK_SIZE,
};
use std::net::IpAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::share::{partial_path, SharedFolder};

/// Request ID counter, initialized with a random offset to avoid collisions across sessions
static REQUEST_COUNTER: LazyLock<AtomicU64> = LazyLock::new(|| {
    let mut buf = [0u8; 8];
    // If getrandom fails, use current time as fallback
    if getrandom::getrandom(&mut buf).is_err() {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        return AtomicU64::new(ts);
    }
    AtomicU64::new(u64::from_le_bytes(buf))
});

/// Get a unique request ID
pub fn next_request_id() -> u64 {
    REQUEST_COUNTER.fetch_add(1, Ordering::SeqCst)
}

#[derive(Clone)]
pub struct PeerClient {
    edge: PeerAddr,
    share: SharedFolder,
    /// Our own advertised address, never picked as an owner
    self_addr: Option<PeerAddr>,
    transport: TransportConfig,
}

impl PeerClient {
    pub fn new(
        edge: PeerAddr,
        share: SharedFolder,
        self_addr: Option<PeerAddr>,
        transport: TransportConfig,
    ) -> Self {
        Self {
            edge,
            share,
            self_addr,
            transport,
        }
    }

    /// Fetch the Edge's current catalog snapshot
    pub async fn catalog(&self) -> Result<Catalog> {
        let (snapshot, _) = self.catalog_from_edge().await?;
        Ok(snapshot)
    }

    /// Snapshot plus the local IP the Edge saw this request come from
    async fn catalog_from_edge(&self) -> Result<(Catalog, IpAddr)> {
        let request = proto::catalog_request(next_request_id());
        let (response, local) =
            transport::request_from(&self.edge, &request, &self.transport).await?;

        match response.into_payload()? {
            Payload::CatalogResponse(resp) => Ok((catalog::from_proto(resp)?, local.ip())),
            Payload::ErrorResponse(err) => Err(err.into_error()),
            other => Err(Error::Protocol(format!(
                "unexpected reply to catalog request: {}",
                other.name()
            ))),
        }
    }

    /// Download `filename` from the lowest-addressed peer that can serve it
    ///
    /// Owners that are unreachable or no longer have the file are skipped.
    /// A digest mismatch or short transfer is reported immediately.
    pub async fn get(&self, filename: &str) -> Result<FileRecord> {
        self.ensure_not_announced(filename)?;
        let (snapshot, observed) = self.catalog_from_edge().await?;
        let owners: Vec<PeerAddr> = catalog::owners_of(&snapshot, filename)
            .into_iter()
            .filter(|owner| !self.is_self(owner, Some(observed)))
            .collect();

        if owners.is_empty() {
            return Err(Error::NotFound(format!("no peer advertises '{}'", filename)));
        }

        let mut last_error = None;
        for owner in owners {
            tracing::info!("Requesting '{}' from {}", filename, owner);
            match self.fetch_from(&owner, filename).await {
                Ok(record) => return Ok(record),
                Err(e) if matches!(e.kind(), ErrorKind::Connectivity | ErrorKind::NotFound) => {
                    tracing::warn!("{} could not serve '{}': {}", owner, filename, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| Error::NotFound(filename.to_string())))
    }

    /// Download `filename` from one specific peer
    pub async fn fetch_from(&self, peer: &PeerAddr, filename: &str) -> Result<FileRecord> {
        self.ensure_not_announced(filename)?;
        let destination = self.share.destination(filename)?;
        let mut stream = transport::connect(peer, &self.transport).await?;

        let request = proto::get_request(next_request_id(), filename.to_string());
        timed(
            self.transport.io_timeout,
            "send request",
            write_envelope(&mut stream, &request),
        )
        .await?;
        let header = timed(
            self.transport.io_timeout,
            "read response",
            read_envelope(&mut stream, self.transport.max_frame_bytes),
        )
        .await?;

        match header.into_payload()? {
            Payload::GetResponseOk(ok) => {
                let expected = hash_from_slice(&ok.content_hash).ok_or_else(|| {
                    Error::Protocol(format!("bad digest length {}", ok.content_hash.len()))
                })?;
                receive_body(
                    &mut stream,
                    ok.size,
                    &expected,
                    &destination,
                    self.transport.io_timeout,
                )
                .await?;

                tracing::info!(
                    "Downloaded '{}' ({} bytes, {}) from {}",
                    filename,
                    ok.size,
                    hash_to_hex(&expected),
                    peer
                );
                Ok(FileRecord {
                    name: filename.to_string(),
                    content_hash: expected,
                    size: ok.size,
                })
            }
            Payload::GetResponseErr(err) if err.reason == proto::REASON_NOT_FOUND => Err(
                Error::NotFound(format!("'{}' not on {}", filename, peer)),
            ),
            Payload::GetResponseErr(err) => Err(Error::Protocol(format!(
                "{} refused '{}': {}",
                peer, filename, err.reason
            ))),
            Payload::ErrorResponse(err) => Err(err.into_error()),
            other => Err(Error::Protocol(format!(
                "unexpected reply to get request: {}",
                other.name()
            ))),
        }
    }

    /// Names in our announced list are never overwritten: the Edge keeps
    /// advertising their startup digest for this peer
    fn ensure_not_announced(&self, filename: &str) -> Result<()> {
        if self.share.lookup(filename).is_some() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("'{}' is already shared by this peer", filename),
            )));
        }
        Ok(())
    }

    /// Whether a catalog address is this peer
    ///
    /// With an unspecified advertised host the Edge lists us under the IP it
    /// observed, so a loopback or observed host on our port counts as us.
    fn is_self(&self, addr: &PeerAddr, observed: Option<IpAddr>) -> bool {
        let Some(me) = self.self_addr.as_ref() else {
            return false;
        };
        if !me.is_unspecified() {
            return me == addr;
        }
        if addr.port != me.port {
            return false;
        }
        match addr.host.parse::<IpAddr>() {
            Ok(ip) => ip.is_loopback() || Some(ip) == observed,
            Err(_) => addr.host == "localhost",
        }
    }
}

/// Receive exactly `size` bytes into `destination`, verifying the digest
///
/// Bytes land in a partial file first. The partial file is removed on any
/// failure, so a corrupt or short transfer never appears as a shared file.
pub async fn receive_body<R>(
    reader: &mut R,
    size: u64,
    expected: &ContentHash,
    destination: &Path,
    io_timeout: Duration,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let partial = partial_path(destination);
    let result = match write_partial(reader, size, expected, &partial, io_timeout).await {
        Ok(()) => tokio::fs::rename(&partial, destination)
            .await
            .map_err(Error::from),
        Err(e) => Err(e),
    };
    if result.is_err() {
        if let Err(rm) = tokio::fs::remove_file(&partial).await {
            tracing::debug!("Could not remove {}: {}", partial.display(), rm);
        }
    }
    result
}

async fn write_partial<R>(
    reader: &mut R,
    size: u64,
    expected: &ContentHash,
    partial: &Path,
    io_timeout: Duration,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut file = tokio::fs::File::create(partial).await?;
    let mut digest = StreamDigest::new();
    let mut buffer = vec![0u8; STREAM_CHUNK_SIZE];
    let mut received = 0u64;

    while received < size {
        let want = (size - received).min(buffer.len() as u64) as usize;
        let read = timed(io_timeout, "read body", async {
            reader
                .read(&mut buffer[..want])
                .await
                .map_err(|e| Error::ConnectionFailed(e.to_string()))
        })
        .await;
        // A stream that breaks mid-body is a short transfer, same as early EOF
        let n = match read {
            Ok(n) => n,
            Err(e) => {
                tracing::debug!("Body read stopped after {} bytes: {}", received, e);
                0
            }
        };
        if n == 0 {
            return Err(Error::Truncated {
                expected: size,
                received,
            });
        }
        digest.update(&buffer[..n]);
        file.write_all(&buffer[..n]).await?;
        received += n as u64;
    }
    file.flush().await?;
    file.sync_all().await?;

    let actual = digest.finalize();
    if &actual != expected {
        return Err(Error::HashMismatch {
            expected: hash_to_hex(expected),
            actual: hash_to_hex(&actual),
        });
    }
    Ok(())
}
