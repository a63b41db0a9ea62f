//! The peer's shared folder
//!
//! The folder is scanned once at startup. The resulting file list is what the
//! peer announces and never changes afterwards; it is shared read-only between
//! the announcer, the file service, and the client.

use edgeshare_core::digest::{self, PARTIAL_SUFFIX};
use edgeshare_core::{Error, FileRecord, Result};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SharedFolder {
    root: PathBuf,
    files: Arc<[FileRecord]>,
}

impl SharedFolder {
    /// Create the folder if needed and digest everything in it
    pub fn open(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let root = root.canonicalize()?;
        let files = digest::scan_folder(&root)?;

        tracing::info!("Sharing {} files from {}", files.len(), root.display());
        for file in files.iter() {
            tracing::debug!("  {} ({} bytes)", file.name, file.size);
        }

        Ok(Self {
            root,
            files: files.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The startup file list
    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn lookup(&self, name: &str) -> Option<&FileRecord> {
        self.files.iter().find(|f| f.name == name)
    }

    /// Map a requested name to a regular file inside the folder
    ///
    /// Names that are absolute, contain `..`, or resolve (through symlinks)
    /// outside the folder are rejected as protocol errors.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let relative = validate_name(name)?;
        let candidate = self.root.join(relative);

        let canonical = match candidate.canonicalize() {
            Ok(path) => path,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if !canonical.starts_with(&self.root) {
            return Err(invalid_path(name));
        }
        if !canonical.is_file() || name.ends_with(PARTIAL_SUFFIX) {
            return Err(Error::NotFound(name.to_string()));
        }
        Ok(canonical)
    }

    /// Where a download of `name` lands, creating parent directories
    pub fn destination(&self, name: &str) -> Result<PathBuf> {
        let relative = validate_name(name)?;
        Ok(self.root.join(relative))
    }
}

/// Path of the in-progress file for a download destination
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

fn validate_name(name: &str) -> Result<PathBuf> {
    if name.is_empty() {
        return Err(invalid_path(name));
    }
    let path = Path::new(name);
    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            _ => return Err(invalid_path(name)),
        }
    }
    if relative.as_os_str().is_empty() {
        return Err(invalid_path(name));
    }
    Ok(relative)
}

fn invalid_path(name: &str) -> Error {
    Error::Protocol(format!("invalid path: '{}'", name))
}
