//! Wire messages exchanged with the remote sync endpoint.
//!
//! Messages are CBOR-encoded via serde. The engine only requires the minimal
//! contract here: an upload endpoint returning per-entry acceptance results
//! and a download endpoint returning records changed since a timestamp.

use crate::change::LocalChange;
use crate::error::{ProtocolError, ProtocolResult};
use crate::record::{Record, RecordKey, RecordType, Timestamp};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

fn encode_cbor<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(buf)
}

fn decode_cbor<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}

/// An ordered batch of squashed local changes submitted for upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    /// Squashed changes in log order, at most one per record.
    pub changes: Vec<LocalChange>,
}

impl UploadRequest {
    /// Creates a new upload request.
    pub fn new(changes: Vec<LocalChange>) -> Self {
        Self { changes }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode_cbor(self)
    }

    /// Decodes from CBOR.
    ///
    /// A batch carries the net change per record, so a decoded request with
    /// two changes for the same record is structurally invalid.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let request: Self = decode_cbor(bytes)?;
        let mut seen: Vec<&RecordKey> = Vec::with_capacity(request.changes.len());
        for change in &request.changes {
            if seen.contains(&&change.key) {
                return Err(ProtocolError::InvalidMessage(format!(
                    "duplicate change for {} in upload batch",
                    change.key
                )));
            }
            seen.push(&change.key);
        }
        Ok(request)
    }
}

/// The sink's verdict on a single uploaded entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum UploadStatus {
    /// The sink durably accepted the entry.
    Accepted {
        /// Id assigned by the server, when it differs from the local id.
        server_id: Option<String>,
    },
    /// The sink rejected the entry; it stays in the local log.
    Rejected {
        /// Why the entry was rejected.
        reason: String,
    },
}

/// Per-entry outcome, in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadEntryOutcome {
    /// Identity of the entry this outcome refers to.
    pub key: RecordKey,
    /// Acceptance or rejection.
    pub status: UploadStatus,
}

/// Response to an [`UploadRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    /// One outcome per submitted entry, in request order.
    pub outcomes: Vec<UploadEntryOutcome>,
}

impl UploadResponse {
    /// Builds a response accepting every entry of a request.
    pub fn accept_all(request: &UploadRequest) -> Self {
        Self {
            outcomes: request
                .changes
                .iter()
                .map(|c| UploadEntryOutcome {
                    key: c.key.clone(),
                    status: UploadStatus::Accepted { server_id: None },
                })
                .collect(),
        }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode_cbor(bytes)
    }
}

/// A request for one page of remote records newer than a watermark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// The record type to download.
    pub record_type: RecordType,
    /// Return only records with `last_updated > since`.
    pub since: Timestamp,
    /// Maximum number of records per page.
    pub page_size: u32,
}

impl DownloadRequest {
    /// Creates a new download request.
    pub fn new(record_type: impl Into<RecordType>, since: Timestamp, page_size: u32) -> Self {
        Self {
            record_type: record_type.into(),
            since,
            page_size,
        }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode_cbor(bytes)
    }
}

/// One page of downloaded records.
///
/// End of pages is signalled explicitly by `has_more = false`; an empty page
/// with `has_more = false` is the normal terminal signal, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadResponse {
    /// Records in ascending `last_updated` order.
    pub records: Vec<Record>,
    /// Whether further pages exist.
    pub has_more: bool,
}

impl DownloadResponse {
    /// Creates a new download response.
    pub fn new(records: Vec<Record>, has_more: bool) -> Self {
        Self { records, has_more }
    }

    /// An empty terminal page.
    pub fn done() -> Self {
        Self {
            records: Vec::new(),
            has_more: false,
        }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode_cbor(bytes)
    }
}
