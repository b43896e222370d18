//! Records and their identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A millisecond-precision timestamp used for conflict ordering.
///
/// Timestamps are opaque to everything except ordering: the engine never
/// interprets them beyond "newer than" comparisons and watermark bounds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The zero timestamp, used as the "download everything" watermark.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Returns the current wall-clock time.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Timestamp(millis)
    }

    /// Returns the timestamp as milliseconds since the Unix epoch.
    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// The type of a record, e.g. `Patient` or `Observation`.
///
/// Record types partition the store and the download watermarks; the engine
/// handles every type identically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordType(String);

impl RecordType {
    /// Creates a record type from a name.
    pub fn new(name: impl Into<String>) -> Self {
        RecordType(name.into())
    }

    /// Returns the type name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordType {
    fn from(name: &str) -> Self {
        RecordType::new(name)
    }
}

impl From<String> for RecordType {
    fn from(name: String) -> Self {
        RecordType(name)
    }
}

/// The identity of a record: (type, id).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    /// The record type.
    pub record_type: RecordType,
    /// The logical id, unique within the type.
    pub id: String,
}

impl RecordKey {
    /// Creates a new record key.
    pub fn new(record_type: impl Into<RecordType>, id: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.record_type, self.id)
    }
}

/// A typed, identified payload with a last-updated timestamp.
///
/// The payload bytes are opaque to the sync engine; only `last_updated` is
/// ever inspected, for conflict ordering and watermark advancement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// The record type.
    pub record_type: RecordType,
    /// The logical id.
    pub id: String,
    /// Opaque content bytes.
    pub payload: Vec<u8>,
    /// When the record was last updated.
    pub last_updated: Timestamp,
}

impl Record {
    /// Creates a new record.
    pub fn new(
        record_type: impl Into<RecordType>,
        id: impl Into<String>,
        payload: Vec<u8>,
        last_updated: Timestamp,
    ) -> Self {
        Self {
            record_type: record_type.into(),
            id: id.into(),
            payload,
            last_updated,
        }
    }

    /// Returns the identity of this record.
    pub fn key(&self) -> RecordKey {
        RecordKey {
            record_type: self.record_type.clone(),
            id: self.id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_ordering() {
        assert!(Timestamp(5) > Timestamp(4));
        assert!(Timestamp::ZERO < Timestamp(1));
        assert!(Timestamp::now() > Timestamp::ZERO);
    }

    #[test]
    fn record_key_display() {
        let key = RecordKey::new("Patient", "p1");
        assert_eq!(key.to_string(), "Patient/p1");
    }

    #[test]
    fn record_key_identity() {
        let a = Record::new("Patient", "p1", vec![1], Timestamp(10));
        let b = Record::new("Patient", "p1", vec![2], Timestamp(20));
        assert_eq!(a.key(), b.key());

        let c = Record::new("Observation", "p1", vec![1], Timestamp(10));
        assert_ne!(a.key(), c.key());
    }
}
