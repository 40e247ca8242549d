use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Single-slot album art cache on disk.
pub struct ThumbCache {
    path: PathBuf,
}

impl ThumbCache {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub async fn store(&self, bytes: &[u8]) {
        match tokio::fs::write(&self.path, bytes).await {
            Ok(()) => debug!("[thumb] cached {} bytes at {:?}", bytes.len(), self.path),
            Err(e) => warn!("[thumb] failed to write {:?}: {}", self.path, e),
        }
    }

    pub async fn clear(&self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!("[thumb] cleared {:?}", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("[thumb] failed to remove {:?}: {}", self.path, e),
        }
    }
}
