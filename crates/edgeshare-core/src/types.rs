//! Core data types for Edgeshare

use serde::{Deserialize, Serialize};

use crate::{proto, Error, Result};

/// A 32-byte SHA-256 digest
pub type ContentHash = [u8; 32];

/// A file a peer advertises, computed once when the peer starts
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path relative to the shared folder, `/`-separated
    pub name: String,
    /// SHA-256 of the file contents
    pub content_hash: ContentHash,
    /// File size in bytes
    pub size: u64,
}

impl FileRecord {
    pub fn to_proto(&self) -> proto::FileEntry {
        proto::FileEntry {
            name: self.name.clone(),
            content_hash: self.content_hash.to_vec(),
            size: self.size,
        }
    }

    pub fn from_proto(entry: proto::FileEntry) -> Result<Self> {
        let content_hash = hash_from_slice(&entry.content_hash).ok_or_else(|| {
            Error::Protocol(format!(
                "invalid content hash length {} for {}",
                entry.content_hash.len(),
                entry.name
            ))
        })?;
        if entry.name.is_empty() {
            return Err(Error::Protocol("empty file name".to_string()));
        }
        Ok(Self {
            name: entry.name,
            content_hash,
            size: entry.size,
        })
    }
}

/// Helper to format a content hash as hex string
pub fn hash_to_hex(hash: &ContentHash) -> String {
    hex::encode(hash)
}

/// Copy a wire-format digest into a fixed array, if it has the right length
pub fn hash_from_slice(bytes: &[u8]) -> Option<ContentHash> {
    if bytes.len() != 32 {
        return None;
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(bytes);
    Some(hash)
}
