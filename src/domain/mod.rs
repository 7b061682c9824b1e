//! Domain types: the persisted task record and snapshot operations.

pub mod record;
pub mod snapshot;

pub use record::{make_key, parse_key, TaskRecord};
pub use snapshot::{
    decode_snapshot, encode_snapshot, merge_snapshots, prune_expired, Snapshot,
};
