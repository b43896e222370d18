//! The keyed local record store.

use crate::error::{StoreError, StoreResult};
use carelog_protocol::{
    ChangeKind, ChangeLog, ChangeToken, Record, RecordKey, RecordType, SquashedChange, Timestamp,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

/// Persisted state of the store: records, change log, watermarks and the
/// last-sync timestamp.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct StoreInner {
    pub(crate) records: BTreeMap<RecordKey, Record>,
    pub(crate) log: ChangeLog,
    pub(crate) watermarks: BTreeMap<RecordType, Timestamp>,
    pub(crate) last_sync: Option<Timestamp>,
}

/// Durable keyed storage of current record state plus the change log.
///
/// Every local mutation appends its change-log entry inside the same
/// write-lock critical section as the record mutation itself: both land or
/// neither does. Application writes may race an in-flight sync run; uploader
/// reads take consistent snapshots under the read lock, and writes landing
/// mid-upload are picked up by the next batch.
#[derive(Debug)]
pub struct RecordStore {
    inner: RwLock<StoreInner>,
}

impl RecordStore {
    /// Creates an empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                records: BTreeMap::new(),
                log: ChangeLog::new(),
                watermarks: BTreeMap::new(),
                last_sync: None,
            }),
        }
    }

    pub(crate) fn from_inner(inner: StoreInner) -> Self {
        Self {
            inner: RwLock::new(inner),
        }
    }

    pub(crate) fn with_inner<R>(&self, f: impl FnOnce(&StoreInner) -> R) -> R {
        f(&self.inner.read())
    }

    /// Creates a record, assigning a fresh id when the record's id is empty.
    ///
    /// Returns the logical id of the created record.
    pub fn create(&self, mut record: Record) -> StoreResult<String> {
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        let now = Timestamp::now();
        record.last_updated = now;
        let key = record.key();

        let mut inner = self.inner.write();
        if inner.records.contains_key(&key) {
            return Err(StoreError::DuplicateRecord { key });
        }
        inner
            .log
            .append(key.clone(), ChangeKind::Insert, Some(record.payload.clone()), now);
        inner.records.insert(key, record.clone());
        Ok(record.id)
    }

    /// Returns the record for a key.
    pub fn get(&self, key: &RecordKey) -> StoreResult<Record> {
        self.inner
            .read()
            .records
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::RecordNotFound { key: key.clone() })
    }

    /// Replaces an existing record's payload.
    pub fn update(&self, mut record: Record) -> StoreResult<()> {
        let now = Timestamp::now();
        record.last_updated = now;
        let key = record.key();

        let mut inner = self.inner.write();
        if !inner.records.contains_key(&key) {
            return Err(StoreError::RecordNotFound { key });
        }
        inner
            .log
            .append(key.clone(), ChangeKind::Update, Some(record.payload.clone()), now);
        inner.records.insert(key, record);
        Ok(())
    }

    /// Deletes a record.
    ///
    /// A record that was created locally and never synced leaves no trace in
    /// the change log: the pending insert is cancelled instead of recording a
    /// delete the server has never heard of.
    pub fn delete(&self, key: &RecordKey) -> StoreResult<()> {
        let mut inner = self.inner.write();
        if inner.records.remove(key).is_none() {
            return Err(StoreError::RecordNotFound { key: key.clone() });
        }
        if !inner.log.cancel_local_insert(key) {
            inner
                .log
                .append(key.clone(), ChangeKind::Delete, None, Timestamp::now());
        }
        Ok(())
    }

    /// Removes a record locally without recording a change for upload.
    ///
    /// Refuses when uncommitted local changes exist unless `force` is set, in
    /// which case those changes are dropped as well.
    pub fn purge(&self, key: &RecordKey, force: bool) -> StoreResult<()> {
        let mut inner = self.inner.write();
        // Existence check comes first: an error return must leave the log
        // untouched, or a pending delete would silently never reach the
        // server.
        if !inner.records.contains_key(key) {
            return Err(StoreError::RecordNotFound { key: key.clone() });
        }
        if inner.log.has_pending(key) {
            if !force {
                return Err(StoreError::PendingChanges { key: key.clone() });
            }
            inner.log.remove_key(key);
        }
        inner.records.remove(key);
        debug!(key = %key, force, "purged record");
        Ok(())
    }

    /// Upserts a downloaded record without recording a local change.
    pub fn apply_remote(&self, record: Record) -> StoreResult<()> {
        let mut inner = self.inner.write();
        inner.records.insert(record.key(), record);
        Ok(())
    }

    /// Returns up to `limit` squashed changes in ascending sequence order.
    pub fn squashed_changes(&self, limit: usize) -> Vec<SquashedChange> {
        self.inner.read().log.squashed_changes(limit)
    }

    /// Returns the squashed local change for a record, if any.
    pub fn local_change(&self, key: &RecordKey) -> Option<SquashedChange> {
        self.inner.read().log.squashed_change_for(key)
    }

    /// Returns true if a record has uncommitted local changes.
    pub fn has_pending_change(&self, key: &RecordKey) -> bool {
        self.inner.read().log.has_pending(key)
    }

    /// Number of records with pending local changes.
    pub fn pending_change_count(&self) -> usize {
        self.inner.read().log.pending_len()
    }

    /// Deletes exactly the change-log entries a token covers. Idempotent.
    pub fn commit_upload(&self, token: &ChangeToken) {
        let mut inner = self.inner.write();
        inner.log.commit(token);
        debug!(upper_bound = ?token.upper_bound(), "committed upload token");
    }

    /// The download watermark for a record type, if one has been recorded.
    pub fn watermark(&self, record_type: &RecordType) -> Option<Timestamp> {
        self.inner.read().watermarks.get(record_type).copied()
    }

    /// Advances a type's watermark; never moves it backwards.
    pub fn advance_watermark(&self, record_type: &RecordType, timestamp: Timestamp) {
        let mut inner = self.inner.write();
        let entry = inner
            .watermarks
            .entry(record_type.clone())
            .or_insert(Timestamp::ZERO);
        if timestamp > *entry {
            *entry = timestamp;
        }
    }

    /// The timestamp of the last fully successful sync, if any.
    pub fn last_sync_time(&self) -> Option<Timestamp> {
        self.inner.read().last_sync
    }

    /// Records the timestamp of a fully successful sync.
    pub fn set_last_sync_time(&self, timestamp: Timestamp) {
        self.inner.write().last_sync = Some(timestamp);
    }

    /// Number of records currently stored.
    pub fn record_count(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Clears records, change log, watermarks and the last-sync timestamp.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        *inner = StoreInner {
            records: BTreeMap::new(),
            log: ChangeLog::new(),
            watermarks: BTreeMap::new(),
            last_sync: None,
        };
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}
