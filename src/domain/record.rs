//! Task record -- one keepalive task's persisted state.
//!
//! [`TaskRecord`] stores the owner, the managed resource, when the task
//! started, and how long it should live. The expiry instant is never stored:
//! it is recomputed from `started_at + duration_hours` so the two can never
//! diverge in the persisted object.
//!
//! # Key Structure
//!
//! Snapshot keys are composite strings in the format
//! `{owner_id}|{resource_id}`. Keys are built with [`make_key`] and split
//! with [`parse_key`], which splits on the first separator. Validation in
//! the registry rejects owner identifiers containing the separator so the
//! round trip is unambiguous.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::KEY_SEPARATOR;

/// Persisted state of a single keepalive task.
///
/// Records are replaced whole on update; there are no partial field writes.
/// Fields are public so backends and callers have full access.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use keepalive_store::TaskRecord;
///
/// let record = TaskRecord::new("acct1", "box-1", Utc::now(), 4.0);
/// assert_eq!(record.key(), "acct1|box-1");
/// assert!(!record.is_expired());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Identifier of the account that owns the resource.
    pub owner_id: String,

    /// Identifier of the managed resource.
    pub resource_id: String,

    /// When the task was created (UTC).
    pub started_at: DateTime<Utc>,

    /// Requested lifetime in hours. Must be positive and finite.
    pub duration_hours: f64,
}

impl TaskRecord {
    /// Creates a record for a task started at `started_at`.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use keepalive_store::TaskRecord;
    ///
    /// let started = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    /// let record = TaskRecord::new("acct1", "box-1", started, 4.0);
    /// assert_eq!(record.owner_id, "acct1");
    /// assert_eq!(record.duration_hours, 4.0);
    /// ```
    pub fn new(
        owner_id: impl Into<String>,
        resource_id: impl Into<String>,
        started_at: DateTime<Utc>,
        duration_hours: f64,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            resource_id: resource_id.into(),
            started_at,
            duration_hours,
        }
    }

    /// Returns the composite snapshot key for this record.
    pub fn key(&self) -> String {
        make_key(&self.owner_id, &self.resource_id)
    }

    /// Computes the absolute expiry instant.
    ///
    /// Returns `None` when the duration is non-positive, non-finite, or
    /// large enough to overflow the timestamp arithmetic.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ms = self.duration_hours * 3_600_000.0;
        if !ms.is_finite() || ms <= 0.0 {
            return None;
        }
        // Saturate instead of wrapping for durations beyond i64 milliseconds.
        if ms >= i64::MAX as f64 {
            return None;
        }
        let duration = Duration::try_milliseconds(ms as i64)?;
        self.started_at.checked_add_signed(duration)
    }

    /// Returns `true` if the task has outlived its duration as of `now`.
    ///
    /// A record with a non-positive or non-finite duration is always
    /// expired; a record whose expiry overflows the timestamp range never
    /// is.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use keepalive_store::TaskRecord;
    ///
    /// let started = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    /// let record = TaskRecord::new("acct1", "box-1", started, 4.0);
    ///
    /// let at_3h = Utc.with_ymd_and_hms(2025, 1, 1, 3, 0, 0).unwrap();
    /// let at_5h = Utc.with_ymd_and_hms(2025, 1, 1, 5, 0, 0).unwrap();
    /// assert!(!record.is_expired_at(at_3h));
    /// assert!(record.is_expired_at(at_5h));
    /// ```
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        if !(self.duration_hours > 0.0) || !self.duration_hours.is_finite() {
            return true;
        }
        match self.expires_at() {
            Some(expiry) => now > expiry,
            None => false,
        }
    }

    /// Returns `true` if the task has outlived its duration right now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Validates the record before it is written.
    ///
    /// Returns the first violation found: empty owner or resource, a
    /// separator inside the owner identifier, or a non-positive duration.
    pub fn validate(&self) -> Result<(), String> {
        if self.owner_id.is_empty() {
            return Err("owner_id is empty".to_string());
        }
        if self.resource_id.is_empty() {
            return Err("resource_id is empty".to_string());
        }
        if self.owner_id.contains(KEY_SEPARATOR) {
            return Err(format!(
                "owner_id contains the key separator '{KEY_SEPARATOR}'"
            ));
        }
        if !self.duration_hours.is_finite() || self.duration_hours <= 0.0 {
            return Err(format!(
                "duration_hours must be positive and finite, got {}",
                self.duration_hours
            ));
        }
        Ok(())
    }
}

/// Constructs a snapshot key from owner and resource identifiers.
///
/// # Examples
///
/// ```
/// use keepalive_store::make_key;
///
/// assert_eq!(make_key("acct1", "box-1"), "acct1|box-1");
/// ```
pub fn make_key(owner_id: &str, resource_id: &str) -> String {
    format!("{owner_id}{KEY_SEPARATOR}{resource_id}")
}

/// Parses a snapshot key into `(owner_id, resource_id)` components.
///
/// Splits on the first separator. Returns `None` if the key does not
/// contain one.
///
/// # Examples
///
/// ```
/// use keepalive_store::parse_key;
///
/// assert_eq!(parse_key("acct1|box-1"), Some(("acct1", "box-1")));
/// assert_eq!(parse_key("no-separator"), None);
/// ```
pub fn parse_key(key: &str) -> Option<(&str, &str)> {
    key.split_once(KEY_SEPARATOR)
}
