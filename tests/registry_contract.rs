//! Integration tests for the registry persistence protocol.
//!
//! Exercised against the in-memory versioned backend plus a few stub
//! backends that fault-inject conflicts, rejected credentials, and
//! transport failures. Two sequential saves never conflict (each save reads
//! the token immediately before writing), so racing writers are simulated
//! by a wrapper that slips an out-of-band write in between.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use keepalive_store::{
    decode_snapshot, encode_snapshot, InMemoryBackend, RegistryError, Snapshot, StorageBackend,
    StoreError, TaskRecord, TaskRegistry, VersionedObject,
};
use pretty_assertions::assert_eq;

fn record(owner: &str, resource: &str, started: DateTime<Utc>, hours: f64) -> TaskRecord {
    TaskRecord::new(owner, resource, started, hours)
}

fn snapshot_of(records: Vec<TaskRecord>) -> Snapshot {
    records.into_iter().map(|r| (r.key(), r)).collect()
}

fn started_2025() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

// ---- stub backends ----

/// Forwards to an in-memory store, but slips a rival write in before the
/// first forwarded write. The forwarded write then carries a stale token
/// and conflicts, exactly as when another process wins the race.
struct RacingBackend {
    inner: InMemoryBackend,
    rival: Vec<u8>,
    injected: AtomicBool,
}

impl RacingBackend {
    fn new(inner: InMemoryBackend, rival: &Snapshot) -> Self {
        Self {
            inner,
            rival: encode_snapshot(rival).unwrap(),
            injected: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl StorageBackend for RacingBackend {
    async fn read(&self) -> Result<VersionedObject, StoreError> {
        self.inner.read().await
    }

    async fn write(
        &self,
        data: &[u8],
        expected: Option<&str>,
        message: &str,
    ) -> Result<Option<String>, StoreError> {
        if !self.injected.swap(true, Ordering::SeqCst) {
            let token = match self.inner.read().await {
                Ok(obj) => obj.token,
                Err(StoreError::NotFound { .. }) => None,
                Err(err) => return Err(err),
            };
            self.inner
                .write(&self.rival, token.as_deref(), "rival write")
                .await?;
        }
        self.inner.write(data, expected, message).await
    }
}

/// Rejects every write with a version conflict and counts the attempts.
struct AlwaysConflictBackend {
    writes: Arc<AtomicU32>,
}

impl AlwaysConflictBackend {
    fn new() -> (Self, Arc<AtomicU32>) {
        let writes = Arc::new(AtomicU32::new(0));
        (Self { writes: writes.clone() }, writes)
    }
}

#[async_trait]
impl StorageBackend for AlwaysConflictBackend {
    async fn read(&self) -> Result<VersionedObject, StoreError> {
        Ok(VersionedObject {
            data: b"{}".to_vec(),
            token: Some("base".to_string()),
        })
    }

    async fn write(
        &self,
        _data: &[u8],
        expected: Option<&str>,
        _message: &str,
    ) -> Result<Option<String>, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::VersionConflict {
            path: "<stub>".to_string(),
            expected: expected.map(String::from),
        })
    }
}

/// Accepts reads but rejects every write as unauthorized.
struct UnauthorizedBackend {
    writes: Arc<AtomicU32>,
}

impl UnauthorizedBackend {
    fn new() -> (Self, Arc<AtomicU32>) {
        let writes = Arc::new(AtomicU32::new(0));
        (Self { writes: writes.clone() }, writes)
    }
}

#[async_trait]
impl StorageBackend for UnauthorizedBackend {
    async fn read(&self) -> Result<VersionedObject, StoreError> {
        Ok(VersionedObject {
            data: b"{}".to_vec(),
            token: Some("base".to_string()),
        })
    }

    async fn write(
        &self,
        _data: &[u8],
        _expected: Option<&str>,
        _message: &str,
    ) -> Result<Option<String>, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unauthorized { status: 401 })
    }
}

/// Fails every call as if the store were offline.
struct UnreachableBackend;

#[async_trait]
impl StorageBackend for UnreachableBackend {
    async fn read(&self) -> Result<VersionedObject, StoreError> {
        Err(StoreError::Unreachable {
            message: "connection refused".to_string(),
        })
    }

    async fn write(
        &self,
        _data: &[u8],
        _expected: Option<&str>,
        _message: &str,
    ) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unreachable {
            message: "connection refused".to_string(),
        })
    }
}

// ---- load / save round trips ----

#[tokio::test]
async fn load_of_empty_store_is_empty_snapshot() {
    let registry = TaskRegistry::new(Box::new(InMemoryBackend::new()));
    assert!(registry.load().await.is_empty());
    assert!(registry.try_load().await.unwrap().is_empty());
}

#[tokio::test]
async fn save_then_load_round_trips() {
    let registry = TaskRegistry::new(Box::new(InMemoryBackend::new()));
    let snapshot = snapshot_of(vec![
        record("acct1", "box-1", Utc::now(), 4.0),
        record("acct2", "box-2", Utc::now(), 2.0),
    ]);

    registry.save(&snapshot).await.unwrap();
    assert_eq!(registry.load().await, snapshot);
}

#[tokio::test]
async fn sequential_saves_never_conflict() {
    // Each save reads the current token immediately before writing, so a
    // single writer proceeds without retries.
    let backend = InMemoryBackend::new();
    let registry = TaskRegistry::new(Box::new(backend.clone()));

    registry
        .save(&snapshot_of(vec![record("acct1", "box-1", Utc::now(), 4.0)]))
        .await
        .unwrap();
    registry
        .save(&snapshot_of(vec![record("acct1", "box-1", Utc::now(), 8.0)]))
        .await
        .unwrap();

    assert_eq!(backend.version(), Some(2));
}

#[tokio::test]
async fn save_of_empty_snapshot_persists_empty_object() {
    let backend = InMemoryBackend::new();
    let registry = TaskRegistry::new(Box::new(backend.clone()));
    registry.save(&Snapshot::new()).await.unwrap();

    let stored = backend.read().await.unwrap();
    assert_eq!(decode_snapshot(&stored.data).unwrap(), Snapshot::new());
}

// ---- expiry pruning ----

#[tokio::test]
async fn load_prunes_expired_records_without_rewriting() {
    let backend = InMemoryBackend::new();
    let stored = snapshot_of(vec![
        record("acct1", "box-1", started_2025(), 1.0), // long expired
        record("acct2", "box-2", Utc::now(), 4.0),
    ]);
    backend
        .write(&encode_snapshot(&stored).unwrap(), None, "seed")
        .await
        .unwrap();

    let registry = TaskRegistry::new(Box::new(backend.clone()));
    let loaded = registry.load().await;
    assert_eq!(loaded.len(), 1);
    assert!(loaded.contains_key("acct2|box-2"));

    // The stored object keeps the expired record; pruning is a read filter.
    let raw = decode_snapshot(&backend.read().await.unwrap().data).unwrap();
    assert_eq!(raw.len(), 2);
}

#[tokio::test]
async fn clear_expired_compacts_the_stored_object() {
    let backend = InMemoryBackend::new();
    let stored = snapshot_of(vec![
        record("acct1", "box-1", started_2025(), 1.0),
        record("acct2", "box-2", Utc::now(), 4.0),
    ]);
    backend
        .write(&encode_snapshot(&stored).unwrap(), None, "seed")
        .await
        .unwrap();

    let registry = TaskRegistry::new(Box::new(backend.clone()));
    assert_eq!(registry.clear_expired().await.unwrap(), 1);

    let raw = decode_snapshot(&backend.read().await.unwrap().data).unwrap();
    assert_eq!(raw.len(), 1);
    assert!(raw.contains_key("acct2|box-2"));
}

#[tokio::test]
async fn clear_expired_without_expired_records_does_not_write() {
    let backend = InMemoryBackend::new();
    let registry = TaskRegistry::new(Box::new(backend.clone()));
    registry
        .save(&snapshot_of(vec![record("acct1", "box-1", Utc::now(), 4.0)]))
        .await
        .unwrap();
    let version_before = backend.version();

    assert_eq!(registry.clear_expired().await.unwrap(), 0);
    assert_eq!(backend.version(), version_before);
}

// ---- conflict retry and merge ----

#[tokio::test]
async fn racing_writers_with_disjoint_keys_both_survive() {
    let inner = InMemoryBackend::new();
    let rival = snapshot_of(vec![record("acct1", "box-1", started_2025(), 4.0)]);
    let backend = RacingBackend::new(inner.clone(), &rival);

    let registry = TaskRegistry::new(Box::new(backend));
    let ours = snapshot_of(vec![record("acct2", "box-2", started_2025(), 2.0)]);
    registry.save(&ours).await.unwrap();

    let merged = decode_snapshot(&inner.read().await.unwrap().data).unwrap();
    assert_eq!(merged.len(), 2);
    assert!(merged.contains_key("acct1|box-1"));
    assert!(merged.contains_key("acct2|box-2"));
}

#[tokio::test]
async fn racing_writers_on_same_key_keep_later_write() {
    let inner = InMemoryBackend::new();
    let rival = snapshot_of(vec![record("acct1", "box-1", started_2025(), 8.0)]);
    let backend = RacingBackend::new(inner.clone(), &rival);

    let registry = TaskRegistry::new(Box::new(backend));
    let ours = snapshot_of(vec![record("acct1", "box-1", started_2025(), 2.0)]);
    registry.save(&ours).await.unwrap();

    let merged = decode_snapshot(&inner.read().await.unwrap().data).unwrap();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged["acct1|box-1"].duration_hours, 2.0);
}

#[tokio::test]
async fn persistent_conflicts_exhaust_the_attempt_budget() {
    let (backend, writes) = AlwaysConflictBackend::new();
    let registry = TaskRegistry::new(Box::new(backend));

    let result = registry
        .save(&snapshot_of(vec![record("acct1", "box-1", Utc::now(), 4.0)]))
        .await;

    match result {
        Err(RegistryError::RetriesExhausted { attempts }) => assert_eq!(attempts, 3),
        other => panic!("expected RetriesExhausted, got: {other:?}"),
    }
    // Exactly the budget, no extra attempts.
    assert_eq!(writes.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn attempt_budget_is_configurable() {
    let (backend, writes) = AlwaysConflictBackend::new();
    let registry = TaskRegistry::new(Box::new(backend)).with_max_attempts(5);

    let result = registry
        .save(&snapshot_of(vec![record("acct1", "box-1", Utc::now(), 4.0)]))
        .await;

    match result {
        Err(RegistryError::RetriesExhausted { attempts }) => assert_eq!(attempts, 5),
        other => panic!("expected RetriesExhausted, got: {other:?}"),
    }
    assert_eq!(writes.load(Ordering::SeqCst), 5);
}

// ---- fatal errors are never retried ----

#[tokio::test]
async fn rejected_credentials_fail_after_a_single_attempt() {
    let (backend, writes) = UnauthorizedBackend::new();
    let registry = TaskRegistry::new(Box::new(backend));

    let result = registry
        .save(&snapshot_of(vec![record("acct1", "box-1", Utc::now(), 4.0)]))
        .await;

    assert!(matches!(
        result,
        Err(RegistryError::Store(StoreError::Unauthorized { status: 401 }))
    ));
    assert_eq!(writes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unreachable_store_fails_save() {
    let registry = TaskRegistry::new(Box::new(UnreachableBackend));
    let result = registry
        .save(&snapshot_of(vec![record("acct1", "box-1", Utc::now(), 4.0)]))
        .await;
    assert!(matches!(
        result,
        Err(RegistryError::Store(StoreError::Unreachable { .. }))
    ));
}

#[tokio::test]
async fn load_fails_open_on_unreachable_store() {
    let registry = TaskRegistry::new(Box::new(UnreachableBackend));
    assert!(registry.load().await.is_empty());
    assert!(matches!(
        registry.try_load().await,
        Err(RegistryError::Store(StoreError::Unreachable { .. }))
    ));
}

#[tokio::test]
async fn load_fails_open_on_corrupt_stored_object() {
    let backend = InMemoryBackend::new();
    backend.write(b"{ not json", None, "corrupt").await.unwrap();

    let registry = TaskRegistry::new(Box::new(backend));
    assert!(registry.load().await.is_empty());
    assert!(matches!(
        registry.try_load().await,
        Err(RegistryError::Codec(_))
    ));
}

#[tokio::test]
async fn save_repairs_a_corrupt_stored_object() {
    // A save needs only the version token, not a decodable payload, so
    // overwriting is the recovery path for a corrupt object.
    let backend = InMemoryBackend::new();
    backend.write(b"{ not json", None, "corrupt").await.unwrap();

    let registry = TaskRegistry::new(Box::new(backend.clone()));
    let snapshot = snapshot_of(vec![record("acct1", "box-1", Utc::now(), 4.0)]);
    registry.save(&snapshot).await.unwrap();

    assert_eq!(registry.load().await, snapshot);
    assert_eq!(
        decode_snapshot(&backend.read().await.unwrap().data).unwrap(),
        snapshot
    );
}

// ---- record-level conveniences ----

#[tokio::test]
async fn add_persists_and_get_returns_the_record() {
    let registry = TaskRegistry::new(Box::new(InMemoryBackend::new()));
    let rec = record("acct1", "box-1", Utc::now(), 4.0);
    registry.add(rec.clone()).await.unwrap();

    let found = registry.get("acct1", "box-1").await.unwrap();
    assert_eq!(found, Some(rec));
    assert_eq!(registry.get("acct1", "absent").await.unwrap(), None);
}

#[tokio::test]
async fn add_replaces_record_under_same_key() {
    let registry = TaskRegistry::new(Box::new(InMemoryBackend::new()));
    registry
        .add(record("acct1", "box-1", Utc::now(), 4.0))
        .await
        .unwrap();
    registry
        .add(record("acct1", "box-1", Utc::now(), 8.0))
        .await
        .unwrap();

    let found = registry.get("acct1", "box-1").await.unwrap().unwrap();
    assert_eq!(found.duration_hours, 8.0);
    assert_eq!(registry.load().await.len(), 1);
}

#[tokio::test]
async fn add_rejects_invalid_record_without_writing() {
    let backend = InMemoryBackend::new();
    let registry = TaskRegistry::new(Box::new(backend.clone()));

    let result = registry.add(record("", "box-1", Utc::now(), 4.0)).await;
    assert!(matches!(result, Err(RegistryError::InvalidRecord { .. })));
    assert!(backend.is_empty());
}

#[tokio::test]
async fn remove_deletes_and_reports_presence() {
    let backend = InMemoryBackend::new();
    let registry = TaskRegistry::new(Box::new(backend.clone()));
    registry
        .add(record("acct1", "box-1", Utc::now(), 4.0))
        .await
        .unwrap();

    assert!(registry.remove("acct1", "box-1").await.unwrap());
    assert_eq!(registry.get("acct1", "box-1").await.unwrap(), None);

    // Removing an absent key is a no-op and does not write.
    let version_before = backend.version();
    assert!(!registry.remove("acct1", "box-1").await.unwrap());
    assert_eq!(backend.version(), version_before);
}

#[tokio::test]
async fn get_does_not_return_expired_records() {
    let backend = InMemoryBackend::new();
    let stored = snapshot_of(vec![record("acct1", "box-1", started_2025(), 1.0)]);
    backend
        .write(&encode_snapshot(&stored).unwrap(), None, "seed")
        .await
        .unwrap();

    let registry = TaskRegistry::new(Box::new(backend));
    assert_eq!(registry.get("acct1", "box-1").await.unwrap(), None);
}

#[tokio::test]
async fn expired_record_does_not_block_duration_check() {
    // Sanity check on the boundary the registry relies on.
    let rec = record("acct1", "box-1", started_2025(), 4.0);
    let just_before = started_2025() + Duration::hours(4);
    let just_after = just_before + Duration::seconds(1);
    assert!(!rec.is_expired_at(just_before));
    assert!(rec.is_expired_at(just_after));
}
