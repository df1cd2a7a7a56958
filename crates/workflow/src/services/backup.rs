//! Request backup sinks.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while writing a request backup.
#[derive(Debug, Error)]
pub enum BackupError {
    /// The path would escape the backup root.
    #[error("Invalid backup path: {0}")]
    InvalidPath(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend refused the write.
    #[error("Backup unavailable: {0}")]
    Unavailable(String),
}

/// Stores a copy of each accepted request under a relative path.
#[async_trait]
pub trait RequestBackup: Send + Sync {
    /// Writes `body` at `path`, replacing any previous copy.
    async fn save(&self, path: &str, body: &[u8]) -> Result<(), BackupError>;
}

/// In-memory backup for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRequestBackup {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fail_on_save: Arc<AtomicBool>,
}

impl InMemoryRequestBackup {
    /// Creates an empty backup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the backup to fail every save.
    pub fn set_fail_on_save(&self, fail: bool) {
        self.fail_on_save.store(fail, Ordering::SeqCst);
    }

    /// Returns the stored copy at `path`.
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    /// Returns the number of stored copies.
    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RequestBackup for InMemoryRequestBackup {
    async fn save(&self, path: &str, body: &[u8]) -> Result<(), BackupError> {
        if self.fail_on_save.load(Ordering::SeqCst) {
            return Err(BackupError::Unavailable("storage offline".to_string()));
        }
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), body.to_vec());
        Ok(())
    }
}

/// Backup written under a root directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileRequestBackup {
    root: PathBuf,
}

impl FileRequestBackup {
    /// Creates a backup rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, BackupError> {
        let relative = Path::new(path);
        let only_normal = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if path.is_empty() || !only_normal {
            return Err(BackupError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl RequestBackup for FileRequestBackup {
    async fn save(&self, path: &str, body: &[u8]) -> Result<(), BackupError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, body).await?;
        tracing::debug!(path = %target.display(), bytes = body.len(), "request backup written");
        Ok(())
    }
}
