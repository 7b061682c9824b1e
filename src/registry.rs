//! The task registry: durable load and save of the keepalive snapshot.
//!
//! [`TaskRegistry`] owns the persistence protocol on top of a dumb
//! [`StorageBackend`]:
//!
//! - **Load** reads the stored object, decodes it, and prunes expired
//!   records. A missing object is an empty registry, not an error, and the
//!   infallible [`load`](TaskRegistry::load) degrades any other failure to
//!   an empty snapshot so keepalive work continues without durable state.
//! - **Save** is a conditioned write guarded by the version token read
//!   immediately beforehand. On a conflict the registry re-reads the remote
//!   state, merges the caller's intended snapshot over it, and retries, up
//!   to a bounded number of attempts. Merges always start from the caller's
//!   original snapshot so concurrent writers' changes never compound.
//!
//! Credential rejections and transport failures are never retried: the
//! retry budget exists for write races, not for outages.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::config::RegistryConfig;
use crate::constants::DEFAULT_MAX_ATTEMPTS;
use crate::domain::{
    decode_snapshot, encode_snapshot, make_key, merge_snapshots, prune_expired, Snapshot,
    TaskRecord,
};
use crate::error::RegistryError;
use crate::store::{StorageBackend, StoreError};

/// Audit message recorded with each write by history-keeping backends.
fn commit_message(count: usize, now: DateTime<Utc>) -> String {
    format!(
        "[Auto] Update task registry ({count} active) - {}",
        now.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// Durable registry of keepalive task records.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use keepalive_store::{InMemoryBackend, TaskRecord, TaskRegistry};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let registry = TaskRegistry::new(Box::new(InMemoryBackend::new()));
/// let record = TaskRecord::new("acct1", "box-1", Utc::now(), 4.0);
/// registry.add(record).await.unwrap();
///
/// let snapshot = registry.load().await;
/// assert_eq!(snapshot.len(), 1);
/// # });
/// ```
pub struct TaskRegistry {
    backend: Box<dyn StorageBackend>,
    max_attempts: u32,
}

impl TaskRegistry {
    /// Creates a registry on the given backend with the default attempt
    /// budget.
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Creates a registry on the backend the configuration selects.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Store`] if the backend cannot be constructed.
    pub fn from_config(config: &RegistryConfig) -> Result<Self, RegistryError> {
        Ok(Self {
            backend: config.backend()?,
            max_attempts: config.max_attempts.max(1),
        })
    }

    /// Sets the conditioned-write attempt budget. Clamped to at least 1.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Reads and decodes the stored snapshot without pruning.
    ///
    /// A missing object is an empty snapshot with no version token.
    async fn read_stored(&self) -> Result<(Snapshot, Option<String>), RegistryError> {
        match self.backend.read().await {
            Ok(obj) => Ok((decode_snapshot(&obj.data)?, obj.token)),
            Err(StoreError::NotFound { .. }) => Ok((Snapshot::new(), None)),
            Err(err) => Err(err.into()),
        }
    }

    /// Reads only the current version token, ignoring the stored payload.
    ///
    /// The payload is deliberately not decoded here: a save conditioned on
    /// the token overwrites whatever is stored, so a corrupt object must
    /// not block the write that would repair it.
    async fn read_token(&self) -> Result<Option<String>, RegistryError> {
        match self.backend.read().await {
            Ok(obj) => Ok(obj.token),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Loads the snapshot, pruning records that have expired.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::Codec`] if the stored object is not a valid
    ///   snapshot.
    /// - [`RegistryError::Store`] on any backend failure other than a
    ///   missing object.
    pub async fn try_load(&self) -> Result<Snapshot, RegistryError> {
        let (snapshot, _) = self.read_stored().await?;
        Ok(prune_expired(snapshot, Utc::now()))
    }

    /// Loads the snapshot, degrading every failure to an empty registry.
    ///
    /// Keepalive work must not stall on storage trouble; the failure is
    /// logged and an empty snapshot returned. Use
    /// [`try_load`](Self::try_load) where the failure must surface.
    pub async fn load(&self) -> Snapshot {
        match self.try_load().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load task registry, continuing empty");
                Snapshot::new()
            },
        }
    }

    /// Saves the snapshot with bounded retry-and-merge.
    ///
    /// Each attempt is conditioned on the version token read immediately
    /// before it. A conflicting write triggers a re-read and a merge of the
    /// caller's original `snapshot` over the fresh remote state; the merged
    /// result becomes the next attempt's payload. Conflicts beyond the
    /// attempt budget surface as [`RegistryError::RetriesExhausted`].
    ///
    /// # Errors
    ///
    /// - [`RegistryError::RetriesExhausted`] if every attempt conflicted.
    /// - [`RegistryError::Codec`] if the snapshot cannot be encoded or a
    ///   conflicting remote object cannot be decoded.
    /// - [`RegistryError::Store`] on credential rejection, transport
    ///   failure, or any other backend error; these are never retried.
    pub async fn save(&self, snapshot: &Snapshot) -> Result<(), RegistryError> {
        let mut token = self.read_token().await?;
        let mut payload = snapshot.clone();

        for attempt in 1..=self.max_attempts {
            let data = encode_snapshot(&payload)?;
            let message = commit_message(payload.len(), Utc::now());

            match self.backend.write(&data, token.as_deref(), &message).await {
                Ok(_) => {
                    tracing::debug!(records = payload.len(), attempt, "task registry saved");
                    return Ok(());
                },
                Err(StoreError::VersionConflict { .. }) if attempt < self.max_attempts => {
                    tracing::warn!(attempt, "conditioned write conflicted, merging and retrying");
                    let (remote, fresh) = self.read_stored().await?;
                    // Merge over the caller's original snapshot, never over
                    // a previous merge result.
                    payload = merge_snapshots(&remote, snapshot);
                    token = fresh;
                },
                Err(StoreError::VersionConflict { .. }) => {
                    return Err(RegistryError::RetriesExhausted {
                        attempts: self.max_attempts,
                    });
                },
                Err(err) => return Err(err.into()),
            }
        }

        Err(RegistryError::RetriesExhausted {
            attempts: self.max_attempts,
        })
    }

    // ---- record-level conveniences ----

    /// Validates and registers a record, persisting the updated snapshot.
    ///
    /// An existing record under the same key is replaced.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidRecord`] if the record fails validation.
    /// - Any error [`try_load`](Self::try_load) or [`save`](Self::save)
    ///   reports.
    pub async fn add(&self, record: TaskRecord) -> Result<(), RegistryError> {
        record
            .validate()
            .map_err(|reason| RegistryError::InvalidRecord { reason })?;
        let mut snapshot = self.try_load().await?;
        snapshot.insert(record.key(), record);
        self.save(&snapshot).await
    }

    /// Removes the record for `owner_id` and `resource_id`, persisting the
    /// updated snapshot. Returns whether a record was present.
    ///
    /// Removing an absent key is a no-op and does not write.
    ///
    /// # Errors
    ///
    /// Any error [`try_load`](Self::try_load) or [`save`](Self::save)
    /// reports.
    pub async fn remove(&self, owner_id: &str, resource_id: &str) -> Result<bool, RegistryError> {
        let mut snapshot = self.try_load().await?;
        if snapshot.remove(&make_key(owner_id, resource_id)).is_none() {
            return Ok(false);
        }
        self.save(&snapshot).await?;
        Ok(true)
    }

    /// Returns the live record for `owner_id` and `resource_id`, if any.
    ///
    /// Expired records are not returned.
    ///
    /// # Errors
    ///
    /// Any error [`try_load`](Self::try_load) reports.
    pub async fn get(
        &self,
        owner_id: &str,
        resource_id: &str,
    ) -> Result<Option<TaskRecord>, RegistryError> {
        let snapshot = self.try_load().await?;
        Ok(snapshot.get(&make_key(owner_id, resource_id)).cloned())
    }

    /// Rewrites the stored snapshot without its expired records, returning
    /// how many were removed. Does not write when nothing expired.
    ///
    /// Load-time pruning is a read filter; this compacts the stored object
    /// itself.
    ///
    /// # Errors
    ///
    /// Any error [`save`](Self::save) reports, or a store/codec failure on
    /// the initial read.
    pub async fn clear_expired(&self) -> Result<usize, RegistryError> {
        let (stored, _) = self.read_stored().await?;
        let before = stored.len();
        let pruned = prune_expired(stored, Utc::now());
        let removed = before - pruned.len();
        if removed > 0 {
            self.save(&pruned).await?;
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}
