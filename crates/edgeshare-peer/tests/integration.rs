//! End-to-end tests: a real Edge and real peers on loopback

use edgeshare_core::digest::hash_bytes;
use edgeshare_core::{hash_to_hex, ErrorKind, FileRecord, PeerAddr};
use edgeshare_edge::{CatalogRegistry, EdgeConfig, EdgeServer};
use edgeshare_peer::{NodeState, PeerConfig, PeerNode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;

const OLA: &str = "Olá, mundo!\n";
const OLA_SHA256: &str = "ff99b66abad87baefe7203fd886a2ed85ac5a1250fa3f6945b645241d5b4cfca";

struct Edge {
    addr: PeerAddr,
    registry: Arc<CatalogRegistry>,
    shutdown: watch::Sender<bool>,
}

async fn start_edge() -> Edge {
    let config = EdgeConfig {
        listen_host: "127.0.0.1".to_string(),
        port: 0,
        io_timeout_secs: 2,
        ..EdgeConfig::default()
    };
    let server = EdgeServer::bind(&config).await.unwrap();
    let addr = PeerAddr::from(server.local_addr().unwrap());
    let registry = server.registry();
    let (shutdown, rx) = watch::channel(false);
    tokio::spawn(server.run(rx));
    Edge {
        addr,
        registry,
        shutdown,
    }
}

fn peer_config(edge: &Edge, dir: &TempDir) -> PeerConfig {
    PeerConfig {
        edge_host: edge.addr.host.clone(),
        edge_port: edge.addr.port,
        listen_host: "127.0.0.1".to_string(),
        advertise_host: "127.0.0.1".to_string(),
        port: 0,
        shared_dir: dir.path().to_string_lossy().into_owned(),
        io_timeout_secs: 2,
        ..PeerConfig::default()
    }
}

async fn start_peer(edge: &Edge, files: &[(&str, &[u8])]) -> (TempDir, PeerNode) {
    let dir = TempDir::new().unwrap();
    for (name, content) in files {
        std::fs::write(dir.path().join(name), content).unwrap();
    }
    let node = PeerNode::start(&peer_config(edge, &dir)).await.unwrap();
    assert_eq!(node.state(), NodeState::Ready);
    (dir, node)
}

/// Peer A shares ola.txt, peer B downloads it through the catalog
#[tokio::test]
async fn test_share_and_download() {
    let edge = start_edge().await;
    let (_dir_a, mut alice) = start_peer(&edge, &[("ola.txt", OLA.as_bytes())]).await;
    let (dir_b, mut bob) = start_peer(&edge, &[]).await;

    let catalog = bob.catalog().await.unwrap();
    assert_eq!(catalog.get(alice.advertised()), Some(&vec!["ola.txt".to_string()]));
    assert_eq!(catalog.get(bob.advertised()), Some(&Vec::new()));

    let record = bob.get("ola.txt").await.unwrap();
    assert_eq!(record.size, 13);
    assert_eq!(hash_to_hex(&record.content_hash), OLA_SHA256);
    assert_eq!(std::fs::read(dir_b.path().join("ola.txt")).unwrap(), OLA.as_bytes());
    assert_eq!(bob.state(), NodeState::Ready);

    // The Edge still holds exactly what alice announced
    let records = edge.registry.file_records(alice.advertised()).await.unwrap();
    assert_eq!(hash_to_hex(&records[0].content_hash), OLA_SHA256);

    bob.shutdown().await;
    alice.shutdown().await;
    assert_eq!(alice.state(), NodeState::Terminated);
    edge.shutdown.send(true).unwrap();
}

#[tokio::test]
async fn test_empty_catalog_and_unknown_file() {
    let edge = start_edge().await;
    let dir = TempDir::new().unwrap();
    let client = edgeshare_peer::PeerClient::new(
        edge.addr.clone(),
        edgeshare_peer::SharedFolder::open(dir.path()).unwrap(),
        None,
        edgeshare_core::TransportConfig::default(),
    );

    assert!(client.catalog().await.unwrap().is_empty());

    let err = client.get("nothing.txt").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(!dir.path().join("nothing.txt").exists());
}

/// A name with no owner in a populated catalog contacts nobody
#[tokio::test]
async fn test_unknown_file_contacts_no_peer() {
    let edge = start_edge().await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let owner = PeerAddr::from(listener.local_addr().unwrap());
    let accepts = Arc::new(AtomicUsize::new(0));
    let counter = accepts.clone();
    tokio::spawn(async move {
        while let Ok((_stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    edge.registry
        .register(
            owner.clone(),
            vec![FileRecord {
                name: "present.txt".to_string(),
                content_hash: hash_bytes(b"present"),
                size: 7,
            }],
        )
        .await;

    let dir = TempDir::new().unwrap();
    let client = edgeshare_peer::PeerClient::new(
        edge.addr.clone(),
        edgeshare_peer::SharedFolder::open(dir.path()).unwrap(),
        None,
        edgeshare_core::TransportConfig {
            io_timeout: Duration::from_millis(300),
            ..edgeshare_core::TransportConfig::default()
        },
    );
    assert_eq!(client.catalog().await.unwrap().len(), 1);

    let err = client.get("absent.txt").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(accepts.load(Ordering::SeqCst), 0);

    // The registered name does reach the owner
    assert!(client.get("present.txt").await.is_err());
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while accepts.load(Ordering::SeqCst) == 0 {
        assert!(tokio::time::Instant::now() < deadline, "owner was never contacted");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    edge.shutdown.send(true).unwrap();
}

/// A peer never replaces a file it announced with someone else's version
#[tokio::test]
async fn test_announced_file_is_not_replaced_by_get() {
    let edge = start_edge().await;
    let (dir_a, mut a) = start_peer(&edge, &[("notes.txt", b"version-A".as_slice())]).await;
    let (_dir_b, mut b) = start_peer(&edge, &[("notes.txt", b"version-B".as_slice())]).await;
    let (_dir_c, mut c) = start_peer(&edge, &[]).await;

    assert!(a.get("notes.txt").await.is_err());
    assert_eq!(a.state(), NodeState::Ready);
    assert_eq!(std::fs::read(dir_a.path().join("notes.txt")).unwrap(), b"version-A");

    // What A serves still matches what the Edge advertises for A
    let record = c.client().fetch_from(a.advertised(), "notes.txt").await.unwrap();
    assert_eq!(record.content_hash, hash_bytes(b"version-A"));
    let advertised = edge.registry.file_records(a.advertised()).await.unwrap();
    assert_eq!(advertised[0].content_hash, record.content_hash);

    c.shutdown().await;
    b.shutdown().await;
    a.shutdown().await;
}

/// Two peers advertise the same name with different content
#[tokio::test]
async fn test_same_name_different_content() {
    let edge = start_edge().await;
    let (_dir_a, mut first) = start_peer(&edge, &[("notes.txt", b"first version".as_slice())]).await;
    let (_dir_c, mut second) = start_peer(&edge, &[("notes.txt", b"second version".as_slice())]).await;
    let (_dir_b, mut fetcher) = start_peer(&edge, &[]).await;

    let from_first = fetcher.client().fetch_from(first.advertised(), "notes.txt").await.unwrap();
    let from_second = fetcher.client().fetch_from(second.advertised(), "notes.txt").await.unwrap();
    assert_ne!(from_first.content_hash, from_second.content_hash);

    // `get` takes the lowest address
    let lowest = std::cmp::min(first.advertised(), second.advertised()).clone();
    let expected = if &lowest == first.advertised() { &from_first } else { &from_second };
    let record = fetcher.get("notes.txt").await.unwrap();
    assert_eq!(record.content_hash, expected.content_hash);

    fetcher.shutdown().await;
    second.shutdown().await;
    first.shutdown().await;
}

/// An owner that went away is skipped in favour of the next one
#[tokio::test]
async fn test_falls_back_to_next_owner() {
    let edge = start_edge().await;
    let (_dir_a, a) = start_peer(&edge, &[("ola.txt", OLA.as_bytes())]).await;
    let (_dir_c, c) = start_peer(&edge, &[("ola.txt", OLA.as_bytes())]).await;
    let (dir_b, mut b) = start_peer(&edge, &[]).await;

    // Stop the lowest owner; its entry stays in the catalog until evicted
    let (mut gone, mut alive) = if a.advertised() < c.advertised() { (a, c) } else { (c, a) };
    gone.shutdown().await;

    let record = b.get("ola.txt").await.unwrap();
    assert_eq!(hash_to_hex(&record.content_hash), OLA_SHA256);
    assert_eq!(std::fs::read(dir_b.path().join("ola.txt")).unwrap(), OLA.as_bytes());

    b.shutdown().await;
    alive.shutdown().await;
}

/// After the Edge forgets a peer, the next heartbeat re-announces it
#[tokio::test]
async fn test_reannounce_after_edge_forgets() {
    let edge = start_edge().await;
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("ola.txt"), OLA).unwrap();
    let config = PeerConfig {
        heartbeat_interval_secs: 1,
        ..peer_config(&edge, &dir)
    };
    let mut node = PeerNode::start(&config).await.unwrap();
    assert_eq!(edge.registry.len().await, 1);

    edge.registry.clear().await;
    assert!(edge.registry.is_empty().await);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while edge.registry.is_empty().await {
        assert!(tokio::time::Instant::now() < deadline, "peer never re-announced");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let snapshot = edge.registry.snapshot().await;
    assert_eq!(snapshot.get(node.advertised()), Some(&vec!["ola.txt".to_string()]));

    node.shutdown().await;
}

/// A peer without a reachable Edge still starts and shuts down cleanly
#[tokio::test]
async fn test_peer_survives_missing_edge() {
    let dir = TempDir::new().unwrap();
    let config = PeerConfig {
        edge_host: "127.0.0.1".to_string(),
        edge_port: 1,
        listen_host: "127.0.0.1".to_string(),
        advertise_host: "127.0.0.1".to_string(),
        port: 0,
        shared_dir: dir.path().to_string_lossy().into_owned(),
        io_timeout_secs: 1,
        ..PeerConfig::default()
    };
    let mut node = PeerNode::start(&config).await.unwrap();
    assert_eq!(node.state(), NodeState::Ready);
    assert_eq!(node.catalog().await.unwrap_err().kind(), ErrorKind::Connectivity);

    node.shutdown().await;
    assert_eq!(node.state(), NodeState::Terminated);
}
