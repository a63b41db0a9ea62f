//! Content digests and shared folder scanning

use crate::{error::Result, types::*, STREAM_CHUNK_SIZE};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Suffix of in-progress downloads; never announced
pub const PARTIAL_SUFFIX: &str = ".edgeshare-part";

/// Incremental SHA-256 over streamed bytes
#[derive(Default, Clone)]
pub struct StreamDigest {
    hasher: Sha256,
}

impl StreamDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn finalize(self) -> ContentHash {
        self.hasher.finalize().into()
    }
}

/// Digest of an in-memory buffer
pub fn hash_bytes(data: &[u8]) -> ContentHash {
    Sha256::digest(data).into()
}

/// Digest and size of a file, read in fixed-size blocks
pub fn hash_file(path: &Path) -> Result<(ContentHash, u64)> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let mut digest = StreamDigest::new();
    let mut buffer = vec![0u8; STREAM_CHUNK_SIZE];
    let mut size = 0u64;

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        digest.update(&buffer[..bytes_read]);
        size += bytes_read as u64;
    }

    Ok((digest.finalize(), size))
}

/// Recursively scan a shared folder and digest every regular file in it
///
/// Names are relative to `root` and `/`-separated. Symlinks and partial
/// downloads are skipped. Records come back sorted by name.
pub fn scan_folder(root: &Path) -> Result<Vec<FileRecord>> {
    let mut records = Vec::new();
    scan_dir(root, root, &mut records)?;
    records.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(records)
}

fn scan_dir(root: &Path, dir: &Path, records: &mut Vec<FileRecord>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = entry.path();

        if file_type.is_dir() {
            scan_dir(root, &path, records)?;
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        let Some(name) = relative_name(root, &path) else {
            continue;
        };
        if name.ends_with(PARTIAL_SUFFIX) {
            continue;
        }

        let (content_hash, size) = hash_file(&path)?;
        records.push(FileRecord {
            name,
            content_hash,
            size,
        });
    }
    Ok(())
}

fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("/"))
}
