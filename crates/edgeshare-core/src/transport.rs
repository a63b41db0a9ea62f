//! Framed TCP transport
//!
//! Every protocol message is an [`Envelope`] carried in a length-prefixed
//! frame: a 4-byte big-endian length followed by the encoded bytes. Each
//! exchange is one connection: connect, send one request, read one response.
//! All socket operations are bounded by the configured I/O timeout.

use crate::proto::{self, Envelope};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// Default upper bound on a single frame: 16 MiB
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// A peer's download address
///
/// Ordering is lexicographic on host, then numeric on port, which is the
/// order used to pick an owner deterministically.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerAddr {
    pub host: String,
    pub port: u16,
}

impl PeerAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Whether the host is empty or the unspecified address (`0.0.0.0`)
    pub fn is_unspecified(&self) -> bool {
        self.host.is_empty()
            || self
                .host
                .parse::<IpAddr>()
                .map(|ip| ip.is_unspecified())
                .unwrap_or(false)
    }

    pub fn to_proto(&self) -> proto::PeerAddress {
        proto::PeerAddress {
            host: self.host.clone(),
            port: self.port as u32,
        }
    }

    pub fn from_proto(address: &proto::PeerAddress) -> Result<Self> {
        let port = u16::try_from(address.port)
            .map_err(|_| Error::InvalidAddress(format!("port {} out of range", address.port)))?;
        if port == 0 {
            return Err(Error::InvalidAddress("port 0".to_string()));
        }
        Ok(Self::new(address.host.clone(), port))
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerAddr({}:{})", self.host, self.port)
    }
}

impl FromStr for PeerAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidAddress(format!("missing port in '{}'", s)))?;
        if host.is_empty() {
            return Err(Error::InvalidAddress(format!("missing host in '{}'", s)));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| Error::InvalidAddress(format!("invalid port in '{}'", s)))?;
        Ok(Self::new(host, port))
    }
}

impl From<SocketAddr> for PeerAddr {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

/// Configuration for the transport layer
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Bound on each connect, read, and write
    pub io_timeout: Duration,
    /// Largest frame accepted from the remote side
    pub max_frame_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            io_timeout: Duration::from_secs(crate::DEFAULT_IO_TIMEOUT_SECS),
            max_frame_bytes: MAX_FRAME_BYTES,
        }
    }
}

/// Run a socket operation under a timeout, turning expiry into [`Error::Timeout`]
pub async fn timed<T, F>(duration: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(format!("{} after {:?}", what, duration))),
    }
}

/// Open a TCP connection to a peer or the Edge
pub async fn connect(addr: &PeerAddr, config: &TransportConfig) -> Result<TcpStream> {
    let target = (addr.host.as_str(), addr.port);
    timed(config.io_timeout, "connect", async {
        TcpStream::connect(target)
            .await
            .map_err(|e| Error::ConnectionFailed(format!("{}: {}", addr, e)))
    })
    .await
}

/// Write a length-prefixed frame
pub async fn write_frame<S>(io: &mut S, data: &[u8]) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let len = u32::try_from(data.len()).map_err(|_| Error::FrameTooLarge {
        size: data.len(),
        max: u32::MAX as usize,
    })?;
    io.write_u32(len).await.map_err(map_write_error)?;
    io.write_all(data).await.map_err(map_write_error)?;
    io.flush().await.map_err(map_write_error)?;
    Ok(())
}

/// Read a length-prefixed frame, rejecting frames larger than `max_len`
pub async fn read_frame<S>(io: &mut S, max_len: usize) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let len = match io.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(Error::ConnectionClosed)
        }
        Err(e) => return Err(Error::ConnectionFailed(e.to_string())),
    };
    if len > max_len {
        return Err(Error::FrameTooLarge {
            size: len,
            max: max_len,
        });
    }
    let mut data = vec![0u8; len];
    match io.read_exact(&mut data).await {
        Ok(_) => Ok(data),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(Error::Protocol(
            format!("frame truncated: expected {} bytes", len),
        )),
        Err(e) => Err(Error::ConnectionFailed(e.to_string())),
    }
}

pub async fn write_envelope<S>(io: &mut S, envelope: &Envelope) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    write_frame(io, &envelope.to_bytes()).await
}

pub async fn read_envelope<S>(io: &mut S, max_len: usize) -> Result<Envelope>
where
    S: AsyncRead + Unpin,
{
    let bytes = read_frame(io, max_len).await?;
    Envelope::from_bytes(&bytes)
}

/// Send one request on a fresh connection and wait for its single response
pub async fn request(
    addr: &PeerAddr,
    envelope: &Envelope,
    config: &TransportConfig,
) -> Result<Envelope> {
    let (response, _) = request_from(addr, envelope, config).await?;
    Ok(response)
}

/// Like [`request`], also returning the local address of the connection,
/// which is the address the remote side observed us on
pub async fn request_from(
    addr: &PeerAddr,
    envelope: &Envelope,
    config: &TransportConfig,
) -> Result<(Envelope, SocketAddr)> {
    let mut stream = connect(addr, config).await?;
    let local = stream.local_addr()?;
    timed(config.io_timeout, "send request", write_envelope(&mut stream, envelope)).await?;
    let response = timed(
        config.io_timeout,
        "read response",
        read_envelope(&mut stream, config.max_frame_bytes),
    )
    .await?;

    if response.request_id != envelope.request_id {
        tracing::warn!(
            "Request ID mismatch from {}: expected {}, got {}",
            addr,
            envelope.request_id,
            response.request_id
        );
    }

    Ok((response, local))
}

fn map_write_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset => {
            Error::ConnectionClosed
        }
        _ => Error::ConnectionFailed(e.to_string()),
    }
}
