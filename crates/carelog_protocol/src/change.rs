//! Local changes and the squashing fold.

use crate::record::{RecordKey, Timestamp};
use serde::{Deserialize, Serialize};

/// The kind of a local mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// Record was created locally.
    Insert,
    /// Record was updated locally.
    Update,
    /// Record was deleted locally.
    Delete,
}

impl ChangeKind {
    /// Folds two consecutive kinds for the same record into the net kind.
    ///
    /// Returns `None` when the pair cancels out entirely (a record created
    /// and then deleted before ever reaching the server).
    ///
    /// | first  | second | net    |
    /// |--------|--------|--------|
    /// | Insert | Update | Insert |
    /// | Insert | Delete | —      |
    /// | Update | Update | Update |
    /// | Update | Delete | Delete |
    /// | Delete | Insert | Update |
    pub fn fold(first: ChangeKind, second: ChangeKind) -> Option<ChangeKind> {
        match (first, second) {
            (ChangeKind::Insert, ChangeKind::Delete) => None,
            (ChangeKind::Insert, _) => Some(ChangeKind::Insert),
            (ChangeKind::Delete, ChangeKind::Insert) => Some(ChangeKind::Update),
            (_, second) => Some(second),
        }
    }
}

/// A single entry in the local change log.
///
/// Entries are ordered by `sequence`, which increases monotonically per store
/// instance and is the ordering key for both squashing and upload order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalChange {
    /// Ordering key, assigned by the change log.
    pub sequence: u64,
    /// Identity of the changed record.
    pub key: RecordKey,
    /// What happened to the record.
    pub kind: ChangeKind,
    /// The record payload after the change; `None` for deletes.
    pub payload: Option<Vec<u8>>,
    /// When the change was made locally.
    pub timestamp: Timestamp,
}

impl LocalChange {
    /// Folds a later change for the same record into this one.
    ///
    /// The result carries the net kind, the latest payload and the timestamp
    /// of the last contributing change (latest-write-wins locally). Returns
    /// `None` when the pair is a net no-op.
    pub fn squash(self, later: LocalChange) -> Option<LocalChange> {
        debug_assert_eq!(self.key, later.key);
        debug_assert!(self.sequence < later.sequence);

        let kind = ChangeKind::fold(self.kind, later.kind)?;
        let payload = match kind {
            ChangeKind::Delete => None,
            _ => later.payload.or(self.payload),
        };
        Some(LocalChange {
            sequence: later.sequence,
            key: later.key,
            kind,
            payload,
            timestamp: later.timestamp,
        })
    }
}

/// The net effect of one or more raw changes to a single record.
///
/// Carries the raw sequences it covers so that a successful upload can commit
/// exactly those change-log entries, even when entries for other records are
/// interleaved between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SquashedChange {
    /// The net change; its `sequence` is that of the last raw contributor.
    pub change: LocalChange,
    /// Raw change-log sequences folded into this entry, ascending.
    pub sequences: Vec<u64>,
}

impl SquashedChange {
    /// Wraps a single raw change.
    pub fn from_raw(change: LocalChange) -> Self {
        let sequences = vec![change.sequence];
        Self { change, sequences }
    }

    /// Folds a later raw change into this squashed entry.
    ///
    /// Returns `None` when the result is a net no-op; the covered sequences
    /// are returned to the caller through the dropped entry.
    pub fn fold(mut self, later: LocalChange) -> Option<Self> {
        self.sequences.push(later.sequence);
        let change = self.change.squash(later)?;
        Some(Self {
            change,
            sequences: self.sequences,
        })
    }
}
