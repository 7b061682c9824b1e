//! Durable keepalive task registry.
//!
//! This crate persists the set of active keepalive tasks (which owner is
//! keeping which resource alive, since when, and for how long) so that the
//! set survives process restarts. The snapshot lives in a remote
//! version-controlled object store when credentials are configured, and in
//! a plain local file otherwise.
//!
//! # Overview
//!
//! The stored object is a single JSON mapping from `{owner_id}|{resource_id}`
//! keys to [`TaskRecord`]s. Writes to the remote store are conditioned on a
//! version token read immediately beforehand; when two processes race, the
//! loser re-reads, merges its intended snapshot over the fresh remote state,
//! and retries within a bounded attempt budget. Records expire by duration
//! and are pruned at read time.
//!
//! # Module Organization
//!
//! - [`domain`] - Task records, the snapshot codec, pruning, and merge
//! - [`store`] - The [`StorageBackend`] contract and its three backends
//! - [`registry`] - The retry-and-merge persistence protocol
//! - [`config`] - Backend selection and environment configuration
//! - [`error`] - The registry error taxonomy
//! - [`constants`] - Default paths, limits, and protocol constants
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use keepalive_store::{InMemoryBackend, TaskRecord, TaskRegistry};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let registry = TaskRegistry::new(Box::new(InMemoryBackend::new()));
//!
//! registry
//!     .add(TaskRecord::new("acct1", "box-1", Utc::now(), 4.0))
//!     .await
//!     .unwrap();
//!
//! let snapshot = registry.load().await;
//! assert!(snapshot.contains_key("acct1|box-1"));
//! # });
//! ```

pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod registry;
pub mod store;

// Re-exports for ergonomic access
pub use config::{RegistryConfig, RemoteConfig};
pub use domain::{
    decode_snapshot, encode_snapshot, make_key, merge_snapshots, parse_key, prune_expired,
    Snapshot, TaskRecord,
};
pub use error::RegistryError;
pub use registry::TaskRegistry;
pub use store::{
    GitHubBackend, InMemoryBackend, LocalFileBackend, StorageBackend, StoreError, VersionedObject,
};
