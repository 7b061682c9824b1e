//! Storage backends for the task registry snapshot.
//!
//! The registry persists one object: the serialized snapshot. Every backend
//! implements [`StorageBackend`], a two-operation contract (read with
//! version token, conditioned write), and stays free of domain logic.
//!
//! Three backends are provided:
//!
//! - [`GitHubBackend`] -- the remote store, versioned by blob SHA
//! - [`LocalFileBackend`] -- the unversioned local-file fallback
//! - [`InMemoryBackend`] -- versioned, in-process, for tests and embedding

pub mod backend;
pub mod github;
pub mod local;
pub mod memory;

pub use backend::{StorageBackend, StoreError, VersionedObject};
pub use github::GitHubBackend;
pub use local::LocalFileBackend;
pub use memory::InMemoryBackend;
