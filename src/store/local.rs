//! Local file storage backend.
//!
//! [`LocalFileBackend`] is the fallback used when no remote configuration is
//! present. It reads and writes the snapshot as a whole file at a fixed
//! path. There is no version token and no concurrency control: the
//! single-process assumption holds, every write is accepted, and the
//! registry's retry loop degenerates to a single attempt because no version
//! ever conflicts.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::store::backend::{StorageBackend, StoreError, VersionedObject};

/// Unversioned backend storing the snapshot at a local filesystem path.
///
/// # Examples
///
/// ```
/// use keepalive_store::LocalFileBackend;
///
/// let backend = LocalFileBackend::new("keepalive_tasks.json");
/// ```
#[derive(Debug, Clone)]
pub struct LocalFileBackend {
    path: PathBuf,
}

impl LocalFileBackend {
    /// Creates a backend storing the snapshot at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the snapshot file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, action: &str, err: std::io::Error) -> StoreError {
        StoreError::Backend {
            message: format!("failed to {action} {}: {err}", self.path.display()),
            source: Some(Box::new(err)),
        }
    }
}

#[async_trait]
impl StorageBackend for LocalFileBackend {
    async fn read(&self) -> Result<VersionedObject, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(data) => Ok(VersionedObject { data, token: None }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound {
                    path: self.path.display().to_string(),
                })
            },
            Err(err) => Err(self.io_error("read", err)),
        }
    }

    async fn write(
        &self,
        data: &[u8],
        _expected: Option<&str>,
        _message: &str,
    ) -> Result<Option<String>, StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|err| self.io_error("create directory for", err))?;
            }
        }
        tokio::fs::write(&self.path, data)
            .await
            .map_err(|err| self.io_error("write", err))?;
        Ok(None)
    }
}
