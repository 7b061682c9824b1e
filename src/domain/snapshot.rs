//! Snapshot operations: codec, expiry pruning, and conflict merge.
//!
//! A [`Snapshot`] is the full mapping of task records at one point in time,
//! keyed by the composite `{owner_id}|{resource_id}` string. Snapshots are
//! serialized as pretty-printed JSON; the stored object is exactly the
//! mapping, with no envelope.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::domain::record::TaskRecord;

/// The full mapping of task records, keyed by `{owner_id}|{resource_id}`.
pub type Snapshot = BTreeMap<String, TaskRecord>;

/// Serializes a snapshot to the stored byte encoding.
pub fn encode_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec_pretty(snapshot)
}

/// Deserializes the stored byte encoding back into a snapshot.
///
/// An empty or whitespace-only object decodes to an empty snapshot, so a
/// truncated or just-created file is not treated as corrupt.
pub fn decode_snapshot(data: &[u8]) -> Result<Snapshot, serde_json::Error> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(Snapshot::new());
    }
    serde_json::from_slice(data)
}

/// Removes records that have expired as of `now`.
///
/// Pruning is a read-time filter: the stored object is not rewritten here.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use keepalive_store::{prune_expired, Snapshot, TaskRecord};
///
/// let started = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
/// let record = TaskRecord::new("acct1", "box-1", started, 4.0);
///
/// let mut snapshot = Snapshot::new();
/// snapshot.insert(record.key(), record);
///
/// let at_3h = Utc.with_ymd_and_hms(2025, 1, 1, 3, 0, 0).unwrap();
/// let at_5h = Utc.with_ymd_and_hms(2025, 1, 1, 5, 0, 0).unwrap();
/// assert_eq!(prune_expired(snapshot.clone(), at_3h).len(), 1);
/// assert_eq!(prune_expired(snapshot, at_5h).len(), 0);
/// ```
pub fn prune_expired(mut snapshot: Snapshot, now: DateTime<Utc>) -> Snapshot {
    snapshot.retain(|_, record| !record.is_expired_at(now));
    snapshot
}

/// Merges a remote snapshot with a locally intended one after a conflict.
///
/// Deterministic and pure: starts from `remote` as the base and overlays
/// every key present in `local`, replacing the remote entry whole. Two
/// writers introducing disjoint keys both survive the merge; on a shared
/// key the local entry wins.
///
/// Deletion is expressed only by key absence, and absence is
/// indistinguishable from "never knew about this key": a key deleted by one
/// process while another process concurrently rewrites without it may
/// reappear for one cycle.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use keepalive_store::{merge_snapshots, Snapshot, TaskRecord};
///
/// let theirs = TaskRecord::new("acct1", "box-1", Utc::now(), 4.0);
/// let ours = TaskRecord::new("acct2", "box-2", Utc::now(), 2.0);
///
/// let mut remote = Snapshot::new();
/// remote.insert(theirs.key(), theirs);
/// let mut local = Snapshot::new();
/// local.insert(ours.key(), ours);
///
/// let merged = merge_snapshots(&remote, &local);
/// assert_eq!(merged.len(), 2);
/// ```
pub fn merge_snapshots(remote: &Snapshot, local: &Snapshot) -> Snapshot {
    let mut merged = remote.clone();
    for (key, record) in local {
        merged.insert(key.clone(), record.clone());
    }
    merged
}
