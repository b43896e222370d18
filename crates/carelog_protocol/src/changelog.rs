//! The append-only local change log.

use crate::change::{ChangeKind, LocalChange, SquashedChange};
use crate::record::{RecordKey, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// An opaque marker bounding which change-log entries an upload covered.
///
/// A token is created per acknowledged upload prefix and lists the exact raw
/// sequences it covers. Committing a token deletes only those entries, and
/// only ever entries at or below its upper bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeToken {
    sequences: Vec<u64>,
}

impl ChangeToken {
    /// Builds a token covering the raw sequences of the given squashed
    /// changes, in upload order.
    pub fn for_changes(changes: &[SquashedChange]) -> Self {
        let mut sequences: Vec<u64> = changes
            .iter()
            .flat_map(|c| c.sequences.iter().copied())
            .collect();
        sequences.sort_unstable();
        sequences.dedup();
        Self { sequences }
    }

    /// The highest sequence this token covers, if any.
    pub fn upper_bound(&self) -> Option<u64> {
        self.sequences.last().copied()
    }

    /// Returns true if this token covers the given sequence.
    pub fn covers(&self, sequence: u64) -> bool {
        self.sequences.binary_search(&sequence).is_ok()
    }

    /// Returns true if the token covers nothing.
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}

/// An append-only ledger of local mutations, ordered by sequence.
///
/// Raw entries are retained until an upload is acknowledged: squashing is
/// computed lazily at read time, so an upload failure never loses the
/// information needed for a full-fidelity retry. Deletion happens only
/// through [`ChangeLog::commit`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeLog {
    entries: VecDeque<LocalChange>,
    next_sequence: u64,
}

impl Default for ChangeLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeLog {
    /// Creates an empty change log.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            next_sequence: 1,
        }
    }

    /// Appends a change and returns its assigned sequence.
    pub fn append(
        &mut self,
        key: RecordKey,
        kind: ChangeKind,
        payload: Option<Vec<u8>>,
        timestamp: Timestamp,
    ) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.push_back(LocalChange {
            sequence,
            key,
            kind,
            payload,
            timestamp,
        });
        sequence
    }

    /// Returns up to `limit` squashed changes in ascending sequence order.
    ///
    /// At most one entry is returned per record key; raw edits to the same
    /// record collapse to their net effect. Net no-ops (a key whose pending
    /// insert was cancelled) never appear; the store cancels those pairs at
    /// write time via [`ChangeLog::cancel_local_insert`].
    pub fn squashed_changes(&self, limit: usize) -> Vec<SquashedChange> {
        let mut order: Vec<RecordKey> = Vec::new();
        let mut squashed: Vec<Option<SquashedChange>> = Vec::new();

        for entry in &self.entries {
            match order.iter().position(|k| *k == entry.key) {
                Some(idx) => {
                    squashed[idx] = squashed[idx].take().and_then(|s| s.fold(entry.clone()));
                }
                None => {
                    order.push(entry.key.clone());
                    squashed.push(Some(SquashedChange::from_raw(entry.clone())));
                }
            }
        }

        squashed.into_iter().flatten().take(limit).collect()
    }

    /// Returns the squashed change for a single record, if any.
    pub fn squashed_change_for(&self, key: &RecordKey) -> Option<SquashedChange> {
        let mut result: Option<SquashedChange> = None;
        for entry in self.entries.iter().filter(|e| e.key == *key) {
            result = match result {
                None => Some(SquashedChange::from_raw(entry.clone())),
                Some(s) => s.fold(entry.clone()),
            };
        }
        result
    }

    /// Deletes exactly the entries a token covers.
    ///
    /// Idempotent: committing a token twice, or a token whose entries are
    /// already gone, is a no-op rather than an error. Entries above the
    /// token's upper bound are never touched.
    pub fn commit(&mut self, token: &ChangeToken) {
        if token.is_empty() {
            return;
        }
        self.entries.retain(|e| !token.covers(e.sequence));
    }

    /// Returns true if a record has uncommitted local changes.
    pub fn has_pending(&self, key: &RecordKey) -> bool {
        self.entries.iter().any(|e| e.key == *key)
    }

    /// Drops all entries for a record whose net effect is a pending insert.
    ///
    /// A record created and then deleted before any sync never needs to reach
    /// the server; returns true if the entries were cancelled.
    pub fn cancel_local_insert(&mut self, key: &RecordKey) -> bool {
        let net_insert = self
            .squashed_change_for(key)
            .map(|s| s.change.kind == ChangeKind::Insert)
            .unwrap_or(false);
        if net_insert {
            self.entries.retain(|e| e.key != *key);
        }
        net_insert
    }

    /// Drops all entries for a record regardless of their kind.
    pub fn remove_key(&mut self, key: &RecordKey) {
        self.entries.retain(|e| e.key != *key);
    }

    /// Number of raw entries in the log.
    pub fn raw_len(&self) -> usize {
        self.entries.len()
    }

    /// Number of records with pending changes.
    pub fn pending_len(&self) -> usize {
        self.squashed_changes(usize::MAX).len()
    }

    /// Returns true if the log has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The sequence the next appended change will receive.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }
}
