//! In-memory versioned storage backend.
//!
//! [`InMemoryBackend`] keeps the snapshot object in process memory behind a
//! mutex, with a monotonic counter rendered as the opaque version token. It
//! implements the full conditioned-write contract, which makes it the
//! backend of choice for exercising the registry's retry-and-merge protocol
//! in tests and for short-lived embedded use.
//!
//! Cloning shares the underlying object, so several registries can contend
//! on the same store the way independent processes contend on a remote one.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::store::backend::{StorageBackend, StoreError, VersionedObject};

const MEMORY_PATH: &str = "<memory>";

/// Thread-safe in-memory backend holding a single versioned object.
///
/// # Examples
///
/// ```
/// use keepalive_store::{InMemoryBackend, TaskRegistry};
///
/// let backend = InMemoryBackend::new();
/// let registry = TaskRegistry::new(Box::new(backend.clone()));
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    object: Arc<Mutex<Option<(Vec<u8>, u64)>>>,
}

impl InMemoryBackend {
    /// Creates an empty backend with no stored object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if no object has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.object.lock().is_none()
    }

    /// Returns the current version counter, or `None` before the first
    /// write.
    pub fn version(&self) -> Option<u64> {
        self.object.lock().as_ref().map(|(_, v)| *v)
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn read(&self) -> Result<VersionedObject, StoreError> {
        let guard = self.object.lock();
        match guard.as_ref() {
            Some((data, version)) => Ok(VersionedObject {
                data: data.clone(),
                token: Some(version.to_string()),
            }),
            None => Err(StoreError::NotFound {
                path: MEMORY_PATH.to_string(),
            }),
        }
    }

    async fn write(
        &self,
        data: &[u8],
        expected: Option<&str>,
        _message: &str,
    ) -> Result<Option<String>, StoreError> {
        let mut guard = self.object.lock();
        let current = guard.as_ref().map(|(_, v)| *v);
        let matches = match (current, expected) {
            (None, None) => true,
            (Some(version), Some(token)) => token == version.to_string(),
            _ => false,
        };
        if !matches {
            return Err(StoreError::VersionConflict {
                path: MEMORY_PATH.to_string(),
                expected: expected.map(String::from),
            });
        }
        let next = current.map_or(1, |v| v + 1);
        *guard = Some((data.to_vec(), next));
        Ok(Some(next.to_string()))
    }
}
