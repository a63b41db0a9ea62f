//! Serving shared files to other peers
//!
//! Each inbound connection carries one `GetRequest`. The reply is a
//! `GetResponseOk` header followed by exactly `size` raw bytes, or a
//! `GetResponseErr`. Connections are served on their own tasks so downloads
//! never wait on each other.

use edgeshare_core::digest;
use edgeshare_core::proto::{self, error_codes, Payload};
use edgeshare_core::transport::{read_envelope, timed, write_envelope};
use edgeshare_core::{Error, ErrorKind, FileRecord, Result, TransportConfig, STREAM_CHUNK_SIZE};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::share::SharedFolder;

#[derive(Clone)]
pub struct FileService {
    share: SharedFolder,
    transport: TransportConfig,
}

impl FileService {
    pub fn new(share: SharedFolder, transport: TransportConfig) -> Self {
        Self { share, transport }
    }

    /// Accept downloads until `shutdown` flips to true
    ///
    /// Transfers already in flight keep running on their own tasks.
    pub async fn run(self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("Serving files on {}", addr);
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((mut stream, remote)) => {
                        let service = self.clone();
                        tokio::spawn(async move {
                            match serve_connection(&mut stream, &service.share, &service.transport).await {
                                Ok(Some(sent)) => tracing::info!("Sent {} ({} bytes) to {}", sent.name, sent.size, remote),
                                Ok(None) => {}
                                Err(e) => tracing::warn!("Transfer to {} failed: {}", remote, e),
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Accept failed: {}", e);
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::debug!("File service stopped accepting");
    }
}

/// Answer a single download request
///
/// Returns the record that was streamed, or `None` when the request was
/// answered with an error reply.
pub async fn serve_connection<S>(
    stream: &mut S,
    share: &SharedFolder,
    transport: &TransportConfig,
) -> Result<Option<FileRecord>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = timed(
        transport.io_timeout,
        "read request",
        read_envelope(stream, transport.max_frame_bytes),
    )
    .await;

    let request = match request {
        Ok(request) => request,
        Err(e) if e.kind() == ErrorKind::Protocol => {
            let code = match &e {
                Error::VersionMismatch { .. } => error_codes::VERSION_MISMATCH,
                _ => error_codes::INVALID_MESSAGE,
            };
            reply(stream, transport, proto::error_response(0, code, e.to_string())).await?;
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let request_id = request.request_id;
    let filename = match request.payload {
        Some(Payload::GetRequest(get)) => get.filename,
        other => {
            let name = other.as_ref().map(|p| p.name()).unwrap_or("unknown");
            let response = proto::error_response(
                request_id,
                error_codes::INVALID_MESSAGE,
                format!("unexpected message: {}", name),
            );
            reply(stream, transport, response).await?;
            return Ok(None);
        }
    };

    let (path, record) = match locate(share, &filename).await {
        Ok(found) => found,
        Err(e) => {
            let reason = match e.kind() {
                ErrorKind::Protocol => proto::REASON_INVALID_PATH,
                _ => proto::REASON_NOT_FOUND,
            };
            tracing::debug!("Refusing '{}': {}", filename, e);
            reply(stream, transport, proto::get_response_err(request_id, reason)).await?;
            return Ok(None);
        }
    };

    let header = proto::get_response_ok(request_id, record.size, record.content_hash.to_vec());
    reply(stream, transport, header).await?;
    send_body(stream, &path, record.size, transport).await?;

    Ok(Some(record))
}

/// Resolve a name to its path and record, digesting files that were not
/// part of the startup scan
async fn locate(share: &SharedFolder, filename: &str) -> Result<(PathBuf, FileRecord)> {
    let path = share.resolve(filename)?;
    if let Some(record) = share.lookup(filename) {
        return Ok((path, record.clone()));
    }

    let hash_path = path.clone();
    let (content_hash, size) = tokio::task::spawn_blocking(move || digest::hash_file(&hash_path))
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))??;

    Ok((
        path,
        FileRecord {
            name: filename.to_string(),
            content_hash,
            size,
        },
    ))
}

async fn reply<S>(stream: &mut S, transport: &TransportConfig, envelope: proto::Envelope) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    timed(transport.io_timeout, "write response", write_envelope(stream, &envelope)).await
}

/// Stream exactly `size` bytes of the file
async fn send_body<S>(stream: &mut S, path: &Path, size: u64, transport: &TransportConfig) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mut file = tokio::fs::File::open(path).await?;
    let mut buffer = vec![0u8; STREAM_CHUNK_SIZE];
    let mut remaining = size;

    while remaining > 0 {
        let want = remaining.min(buffer.len() as u64) as usize;
        let n = file.read(&mut buffer[..want]).await?;
        if n == 0 {
            // File shrank since it was digested; the receiver sees a short body
            return Err(Error::Truncated {
                expected: size,
                received: size - remaining,
            });
        }
        timed(transport.io_timeout, "write body", async {
            stream.write_all(&buffer[..n]).await?;
            Ok::<_, Error>(())
        })
        .await?;
        remaining -= n as u64;
    }

    timed(transport.io_timeout, "flush body", async {
        stream.flush().await?;
        stream.shutdown().await?;
        Ok::<_, Error>(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgeshare_core::digest::hash_bytes;
    use edgeshare_core::proto::Envelope;
    use edgeshare_core::transport::{self, read_envelope, write_envelope};
    use edgeshare_core::{hash_from_slice, hash_to_hex, PeerAddr};
    use std::time::Duration;
    use tempfile::TempDir;

    const OLA: &str = "Olá, mundo!\n";

    fn share_with(files: &[(&str, &[u8])]) -> (TempDir, SharedFolder) {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        let share = SharedFolder::open(dir.path()).unwrap();
        (dir, share)
    }

    /// Send one request over an in-memory pipe; return the header and body
    async fn exchange(share: &SharedFolder, request: Envelope) -> (Envelope, Vec<u8>) {
        let (mut client, mut server) = tokio::io::duplex(STREAM_CHUNK_SIZE);
        let share = share.clone();
        let server_task = tokio::spawn(async move {
            serve_connection(&mut server, &share, &TransportConfig::default()).await
        });

        write_envelope(&mut client, &request).await.unwrap();
        let header = read_envelope(&mut client, 1024).await.unwrap();
        let mut body = Vec::new();
        client.read_to_end(&mut body).await.unwrap();
        server_task.await.unwrap().unwrap();
        (header, body)
    }

    #[tokio::test]
    async fn test_serves_file_with_digest() {
        let (_dir, share) = share_with(&[("ola.txt", OLA.as_bytes())]);
        let (header, body) = exchange(&share, proto::get_request(9, "ola.txt".to_string())).await;

        assert_eq!(header.request_id, 9);
        match header.payload {
            Some(Payload::GetResponseOk(ok)) => {
                assert_eq!(ok.size, 13);
                let hash = hash_from_slice(&ok.content_hash).unwrap();
                assert_eq!(
                    hash_to_hex(&hash),
                    "ff99b66abad87baefe7203fd886a2ed85ac5a1250fa3f6945b645241d5b4cfca"
                );
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(body, OLA.as_bytes());
    }

    #[tokio::test]
    async fn test_streams_multi_chunk_body() {
        let data: Vec<u8> = (0..STREAM_CHUNK_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
        let (_dir, share) = share_with(&[("big.bin", data.as_slice())]);
        let (header, body) = exchange(&share, proto::get_request(1, "big.bin".to_string())).await;

        assert!(matches!(header.payload, Some(Payload::GetResponseOk(_))));
        assert_eq!(body.len(), data.len());
        assert_eq!(hash_bytes(&body), hash_bytes(&data));
    }

    #[tokio::test]
    async fn test_missing_file_and_bad_path() {
        let (_dir, share) = share_with(&[("ola.txt", OLA.as_bytes())]);

        let (header, body) = exchange(&share, proto::get_request(2, "nope.txt".to_string())).await;
        match header.payload {
            Some(Payload::GetResponseErr(err)) => assert_eq!(err.reason, proto::REASON_NOT_FOUND),
            other => panic!("unexpected {:?}", other),
        }
        assert!(body.is_empty());

        let (header, _) = exchange(&share, proto::get_request(3, "../ola.txt".to_string())).await;
        match header.payload {
            Some(Payload::GetResponseErr(err)) => assert_eq!(err.reason, proto::REASON_INVALID_PATH),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejects_other_messages() {
        let (_dir, share) = share_with(&[]);
        let (header, _) = exchange(&share, proto::catalog_request(4)).await;
        match header.payload {
            Some(Payload::ErrorResponse(err)) => assert_eq!(err.code, error_codes::INVALID_MESSAGE),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_digests_files_added_after_startup() {
        let (dir, share) = share_with(&[]);
        std::fs::write(dir.path().join("later.txt"), b"late arrival").unwrap();

        let (header, body) = exchange(&share, proto::get_request(5, "later.txt".to_string())).await;
        match header.payload {
            Some(Payload::GetResponseOk(ok)) => {
                assert_eq!(ok.content_hash, hash_bytes(b"late arrival").to_vec());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(body, b"late arrival");
        // The announced list is untouched
        assert!(share.files().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_downloads_over_tcp() {
        let data = vec![7u8; STREAM_CHUNK_SIZE * 4];
        let (_dir, share) = share_with(&[("a.bin", data.as_slice()), ("ola.txt", OLA.as_bytes())]);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = PeerAddr::from(listener.local_addr().unwrap());
        let (tx, rx) = watch::channel(false);
        let service = tokio::spawn(FileService::new(share, TransportConfig::default()).run(listener, rx));

        let mut tasks = Vec::new();
        for i in 0..8u64 {
            let addr = addr.clone();
            let name = if i % 2 == 0 { "a.bin" } else { "ola.txt" };
            tasks.push(tokio::spawn(async move {
                let config = TransportConfig::default();
                let mut stream = transport::connect(&addr, &config).await.unwrap();
                write_envelope(&mut stream, &proto::get_request(i, name.to_string())).await.unwrap();
                let header = read_envelope(&mut stream, 1024).await.unwrap();
                let mut body = Vec::new();
                stream.read_to_end(&mut body).await.unwrap();
                (header.request_id, body.len())
            }));
        }

        for task in tasks {
            let (id, len) = task.await.unwrap();
            let expected = if id % 2 == 0 { data.len() } else { OLA.len() };
            assert_eq!(len, expected);
        }

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), service).await.unwrap().unwrap();
    }
}
