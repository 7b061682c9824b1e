//! Registry-level error type.
//!
//! [`RegistryError`] is what [`TaskRegistry`](crate::registry::TaskRegistry)
//! callers see. Backend-level failures ([`StoreError`]) are wrapped via
//! `#[from]`, except that `NotFound` never reaches this layer: the registry
//! absorbs a missing snapshot object as "empty snapshot, absent token".

use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by registry operations.
///
/// # Examples
///
/// ```
/// use keepalive_store::RegistryError;
///
/// let err = RegistryError::RetriesExhausted { attempts: 3 };
/// assert!(err.to_string().contains("3"));
/// ```
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Every conditioned write within the attempt budget was rejected with
    /// a version conflict. The caller's snapshot was not persisted, but it
    /// is intact in the caller's memory and a later save may be attempted.
    #[error("save abandoned after {attempts} conflicting write attempts")]
    RetriesExhausted {
        /// Number of write attempts performed.
        attempts: u32,
    },

    /// The snapshot could not be serialized, or the stored object could not
    /// be parsed back into a snapshot.
    #[error("snapshot codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A record failed validation before being written (empty key component,
    /// separator inside a component, or a non-positive duration).
    #[error("invalid task record: {reason}")]
    InvalidRecord {
        /// What the record violated.
        reason: String,
    },

    /// A backend failure other than a retried conflict or an absorbed
    /// `NotFound`: credentials rejected, store unreachable, or an internal
    /// backend error.
    #[error(transparent)]
    Store(#[from] StoreError),
}
