//! In-memory catalog registry
//!
//! Maps each peer's download address to the files it advertises and the
//! last time it was heard from. Every operation, reads included, goes
//! through one mutex, so a snapshot never observes a half-applied update
//! and the eviction task is serialized with request handlers.

use edgeshare_core::{Catalog, Error, FileRecord, PeerAddr, Result};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// A registered peer
#[derive(Debug, Clone)]
struct PeerEntry {
    files: Vec<FileRecord>,
    last_seen: Instant,
}

impl PeerEntry {
    fn is_live(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) <= timeout
    }
}

/// Registry of live peers, bound to the lifetime of one Edge process
pub struct CatalogRegistry {
    entries: Mutex<HashMap<PeerAddr, PeerEntry>>,
    /// Silence after which a peer no longer counts as live
    timeout: Duration,
}

impl CatalogRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Insert or replace a peer's file list and mark it seen now
    pub async fn register(&self, addr: PeerAddr, files: Vec<FileRecord>) {
        self.register_at(addr, files, Instant::now()).await
    }

    pub async fn register_at(&self, addr: PeerAddr, files: Vec<FileRecord>, now: Instant) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            addr,
            PeerEntry {
                files,
                last_seen: now,
            },
        );
    }

    /// Refresh a known peer's liveness
    ///
    /// Fails with [`Error::NotFound`] when the address was never announced
    /// or has already expired; the peer must then re-announce its files.
    pub async fn heartbeat(&self, addr: &PeerAddr) -> Result<()> {
        self.heartbeat_at(addr, Instant::now()).await
    }

    pub async fn heartbeat_at(&self, addr: &PeerAddr, now: Instant) -> Result<()> {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(addr) {
            Some(entry) if entry.is_live(now, self.timeout) => {
                entry.last_seen = now;
                Ok(())
            }
            Some(_) => {
                // Expired but not yet swept: a heartbeat cannot revive it
                entries.remove(addr);
                Err(Error::NotFound(format!("peer {} expired", addr)))
            }
            None => Err(Error::NotFound(format!("peer {} not registered", addr))),
        }
    }

    /// Copy of `address -> filenames` for every live entry
    pub async fn snapshot(&self) -> Catalog {
        self.snapshot_at(Instant::now()).await
    }

    pub async fn snapshot_at(&self, now: Instant) -> Catalog {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .filter(|(_, entry)| entry.is_live(now, self.timeout))
            .map(|(addr, entry)| {
                let filenames = entry.files.iter().map(|f| f.name.clone()).collect();
                (addr.clone(), filenames)
            })
            .collect()
    }

    /// Remove every entry silent for longer than `timeout`
    pub async fn evict_expired(&self, timeout: Duration) -> Vec<PeerAddr> {
        self.evict_expired_at(timeout, Instant::now()).await
    }

    pub async fn evict_expired_at(&self, timeout: Duration, now: Instant) -> Vec<PeerAddr> {
        let mut entries = self.entries.lock().await;
        let expired: Vec<PeerAddr> = entries
            .iter()
            .filter(|(_, entry)| !entry.is_live(now, timeout))
            .map(|(addr, _)| addr.clone())
            .collect();

        for addr in &expired {
            entries.remove(addr);
        }

        expired
    }

    /// Remove all entries; returns how many were dropped
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let count = entries.len();
        entries.clear();
        count
    }

    /// File records advertised by one live peer
    pub async fn file_records(&self, addr: &PeerAddr) -> Option<Vec<FileRecord>> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries
            .get(addr)
            .filter(|entry| entry.is_live(now, self.timeout))
            .map(|entry| entry.files.clone())
    }

    /// Number of entries currently held, live or not yet swept
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgeshare_core::digest::hash_bytes;
    use edgeshare_core::ErrorKind;
    use std::sync::Arc;

    const TIMEOUT: Duration = Duration::from_secs(60);

    fn record(name: &str, content: &[u8]) -> FileRecord {
        FileRecord {
            name: name.to_string(),
            content_hash: hash_bytes(content),
            size: content.len() as u64,
        }
    }

    fn peer(port: u16) -> PeerAddr {
        PeerAddr::new("127.0.0.1", port)
    }

    #[tokio::test]
    async fn test_register_and_snapshot() {
        let registry = CatalogRegistry::new(TIMEOUT);
        registry
            .register(peer(6001), vec![record("ola.txt", "Olá, mundo!\n".as_bytes())])
            .await;

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[&peer(6001)], vec!["ola.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_snapshot() {
        let registry = CatalogRegistry::new(TIMEOUT);
        assert!(registry.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_register_replaces_files() {
        let registry = CatalogRegistry::new(TIMEOUT);
        registry.register(peer(6001), vec![record("a.txt", b"a")]).await;
        registry.register(peer(6001), vec![record("b.txt", b"b")]).await;

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot[&peer(6001)], vec!["b.txt".to_string()]);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_heartbeat_unknown_is_not_found() {
        let registry = CatalogRegistry::new(TIMEOUT);
        let err = registry.heartbeat(&peer(6001)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_liveness_window() {
        let registry = CatalogRegistry::new(TIMEOUT);
        let t0 = Instant::now();

        registry.register_at(peer(6001), vec![record("a.txt", b"a")], t0).await;
        registry
            .register_at(peer(6002), vec![record("b.txt", b"b")], t0 + Duration::from_secs(30))
            .await;

        // Exactly at the boundary both are live
        let at_boundary = registry.snapshot_at(t0 + TIMEOUT).await;
        assert_eq!(at_boundary.len(), 2);

        // Past it, only the later announce remains
        let later = registry.snapshot_at(t0 + TIMEOUT + Duration::from_secs(1)).await;
        assert_eq!(later.keys().cloned().collect::<Vec<_>>(), vec![peer(6002)]);
    }

    #[tokio::test]
    async fn test_heartbeat_extends_liveness() {
        let registry = CatalogRegistry::new(TIMEOUT);
        let t0 = Instant::now();
        registry.register_at(peer(6001), vec![record("a.txt", b"a")], t0).await;

        registry
            .heartbeat_at(&peer(6001), t0 + Duration::from_secs(50))
            .await
            .unwrap();

        let snapshot = registry.snapshot_at(t0 + Duration::from_secs(100)).await;
        assert!(snapshot.contains_key(&peer(6001)));
    }

    #[tokio::test]
    async fn test_expired_peer_needs_reannounce() {
        let registry = CatalogRegistry::new(TIMEOUT);
        let t0 = Instant::now();
        registry.register_at(peer(6001), vec![record("a.txt", b"a")], t0).await;

        let evicted = registry
            .evict_expired_at(TIMEOUT, t0 + TIMEOUT + Duration::from_secs(1))
            .await;
        assert_eq!(evicted, vec![peer(6001)]);

        // A bare heartbeat does not bring it back
        let late = t0 + TIMEOUT + Duration::from_secs(2);
        assert!(registry.heartbeat_at(&peer(6001), late).await.unwrap_err().is_not_found());
        assert!(registry.snapshot_at(late).await.is_empty());

        // A fresh announce does
        registry.register_at(peer(6001), vec![record("a.txt", b"a")], late).await;
        assert!(registry.snapshot_at(late).await.contains_key(&peer(6001)));
    }

    #[tokio::test]
    async fn test_heartbeat_on_unswept_expired_entry() {
        let registry = CatalogRegistry::new(TIMEOUT);
        let t0 = Instant::now();
        registry.register_at(peer(6001), vec![record("a.txt", b"a")], t0).await;

        let err = registry
            .heartbeat_at(&peer(6001), t0 + TIMEOUT + Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_same_name_different_digests_stay_separate() {
        let registry = CatalogRegistry::new(TIMEOUT);
        registry.register(peer(6001), vec![record("notes.txt", b"version one")]).await;
        registry.register(peer(6002), vec![record("notes.txt", b"version two")]).await;

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 2);

        let first = registry.file_records(&peer(6001)).await.unwrap();
        let second = registry.file_records(&peer(6002)).await.unwrap();
        assert_eq!(first[0].content_hash, hash_bytes(b"version one"));
        assert_eq!(second[0].content_hash, hash_bytes(b"version two"));
    }

    #[tokio::test]
    async fn test_clear() {
        let registry = CatalogRegistry::new(TIMEOUT);
        registry.register(peer(6001), vec![]).await;
        registry.register(peer(6002), vec![]).await;
        assert_eq!(registry.clear().await, 2);
        assert!(registry.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_registration() {
        let registry = Arc::new(CatalogRegistry::new(TIMEOUT));
        let mut handles = Vec::new();
        for port in 7000..7050u16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let files = vec![record("a.txt", b"a"), record("b.txt", b"b")];
                registry.register(peer(port), files).await;
                registry.snapshot().await
            }));
        }
        for handle in handles {
            // Every snapshot sees whole entries only
            let snapshot = handle.await.unwrap();
            assert!(snapshot.values().all(|files| files.len() == 2));
        }
        assert_eq!(registry.snapshot().await.len(), 50);
    }
}
