//! Storage backend trait and supporting types.
//!
//! [`StorageBackend`] is the contract every storage engine implements. It
//! exposes exactly two operations on a single stored object: [`read`]
//! (returning the object bytes and its current version token) and [`write`]
//! (a conditioned write accepted only when the caller's expected token
//! matches the store's current one).
//!
//! Domain logic (snapshot codec, expiry pruning, retry-and-merge) does not
//! belong here. Backends are dumb object stores; the protocol lives in
//! [`TaskRegistry`](crate::registry::TaskRegistry).
//!
//! [`read`]: StorageBackend::read
//! [`write`]: StorageBackend::write
//!
//! # Versioning
//!
//! The version token is opaque: remote stores use their revision marker
//! (the blob SHA), the in-memory backend renders a counter, and the local
//! file backend has no token at all (`None`). A write is accepted iff the
//! supplied token equals the store's current token, or both are absent for
//! first creation. Unversioned backends accept every write.

use async_trait::async_trait;
use thiserror::Error;

/// A stored object paired with its version token.
///
/// `token` is `None` when the backend is unversioned (local file store) --
/// a missing object is reported as [`StoreError::NotFound`] instead, never
/// as an empty `VersionedObject`.
#[derive(Debug, Clone)]
pub struct VersionedObject {
    /// The raw snapshot bytes.
    pub data: Vec<u8>,

    /// Opaque revision marker for conditioned writes, absent for
    /// unversioned backends.
    pub token: Option<String>,
}

/// Errors reported by storage backends.
///
/// The registry absorbs `NotFound` (missing object means "empty snapshot")
/// and retries `VersionConflict` within its attempt budget. Everything else
/// is fatal for the current call and is never retried here: retrying cannot
/// fix a rejected credential, and a transport failure is not a conflict.
///
/// # Examples
///
/// ```
/// use keepalive_store::StoreError;
///
/// let err = StoreError::NotFound { path: "keepalive/tasks.json".to_string() };
/// assert!(err.to_string().contains("keepalive/tasks.json"));
/// ```
#[derive(Debug, Error)]
pub enum StoreError {
    /// The snapshot object does not exist yet.
    #[error("object not found: {path}")]
    NotFound {
        /// The object path that was not found.
        path: String,
    },

    /// A conditioned write was rejected because the object changed since
    /// the supplied token was read. The store's state is unchanged.
    #[error("conditioned write conflict on {path}")]
    VersionConflict {
        /// The object path where the conflict occurred.
        path: String,
        /// The token the caller supplied, absent for first creation.
        expected: Option<String>,
    },

    /// The store rejected the configured credentials.
    #[error("credentials rejected by store (HTTP {status})")]
    Unauthorized {
        /// The HTTP status the store answered with.
        status: u16,
    },

    /// The store could not be reached: connection failure, DNS failure, or
    /// the configured timeout elapsed.
    #[error("store unreachable: {message}")]
    Unreachable {
        /// Human-readable description of the transport failure.
        message: String,
    },

    /// Any other backend failure (malformed response, I/O error, malformed
    /// target).
    #[error("backend error: {message}")]
    Backend {
        /// Human-readable description of the error.
        message: String,
        /// The underlying error, if available.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Single-object storage backend for the task registry snapshot.
///
/// Implementations must be `Send + Sync`; a registry may be shared across
/// request handlers. No backend provides locking -- all serialization comes
/// from the conditioned-write contract alone.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Reads the snapshot object and its current version token.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if the object does not exist yet.
    /// - [`StoreError::Unauthorized`] if credentials are rejected.
    /// - [`StoreError::Unreachable`] on transport failure or timeout.
    /// - [`StoreError::Backend`] on any other failure.
    async fn read(&self) -> Result<VersionedObject, StoreError>;

    /// Writes the snapshot object, conditioned on `expected` matching the
    /// store's current version token (`None` expects the object to not
    /// exist yet). Returns the new token where the backend has one.
    ///
    /// `message` is an audit description recorded alongside the write by
    /// backends that keep a change history; others ignore it. Intermediate
    /// path segments are created implicitly.
    ///
    /// # Errors
    ///
    /// - [`StoreError::VersionConflict`] if `expected` does not match the
    ///   store's current token; the store's state is unchanged.
    /// - [`StoreError::Unauthorized`] if credentials are rejected.
    /// - [`StoreError::Unreachable`] on transport failure or timeout.
    /// - [`StoreError::Backend`] on any other failure.
    async fn write(
        &self,
        data: &[u8],
        expected: Option<&str>,
        message: &str,
    ) -> Result<Option<String>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- StoreError Display tests ----

    #[test]
    fn not_found_display() {
        let err = StoreError::NotFound {
            path: "keepalive/tasks.json".to_string(),
        };
        assert_eq!(err.to_string(), "object not found: keepalive/tasks.json");
    }

    #[test]
    fn version_conflict_display() {
        let err = StoreError::VersionConflict {
            path: "keepalive/tasks.json".to_string(),
            expected: Some("abc123".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "conditioned write conflict on keepalive/tasks.json"
        );
    }

    #[test]
    fn unauthorized_display_carries_status() {
        let err = StoreError::Unauthorized { status: 401 };
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn unreachable_display() {
        let err = StoreError::Unreachable {
            message: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("connection refused"));
    }

    // ---- source() tests ----

    #[test]
    fn backend_error_exposes_source() {
        let inner = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let err = StoreError::Backend {
            message: "write failed".to_string(),
            source: Some(Box::new(inner)),
        };
        let source = std::error::Error::source(&err);
        assert!(source.unwrap().to_string().contains("timed out"));
    }

    #[test]
    fn non_backend_variants_have_no_source() {
        let err = StoreError::Unauthorized { status: 403 };
        assert!(std::error::Error::source(&err).is_none());
    }

    // ---- VersionedObject tests ----

    #[test]
    fn versioned_object_clone() {
        let obj = VersionedObject {
            data: b"{}".to_vec(),
            token: Some("abc".to_string()),
        };
        let cloned = obj.clone();
        assert_eq!(cloned.data, obj.data);
        assert_eq!(cloned.token, obj.token);
    }
}
