//! Text export of the catalog for operators
//!
//! The export is a view, not persistence: it is emptied when the Edge starts
//! and again when it shuts down.

use edgeshare_core::catalog;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::registry::CatalogRegistry;

pub struct CatalogExporter {
    path: PathBuf,
    /// Serializes writers so the file always holds one whole snapshot
    write_lock: Mutex<()>,
}

impl CatalogExporter {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the export from the registry's current contents
    ///
    /// The snapshot is taken under the write lock, so concurrent writers land
    /// in the order they observed the registry.
    pub async fn write(&self, registry: &CatalogRegistry) -> std::io::Result<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot = registry.snapshot().await;
        self.replace_contents(catalog::render_by_extension(&snapshot)).await
    }

    /// Truncate the export
    pub async fn clear(&self) -> std::io::Result<()> {
        let _guard = self.write_lock.lock().await;
        self.replace_contents(String::new()).await
    }

    /// Callers hold `write_lock`
    async fn replace_contents(&self, contents: String) -> std::io::Result<()> {
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.path).await
    }
}
