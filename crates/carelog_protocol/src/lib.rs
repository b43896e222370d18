//! # CareLog Sync Protocol
//!
//! Record, change-log and sync wire types for CareLog.
//!
//! This crate provides:
//! - `Record` for typed, identified payloads
//! - `LocalChange` and the squashing fold
//! - `ChangeLog` for tracking local mutations to be synced
//! - `ChangeToken` for acknowledged-prefix commits
//! - Wire messages (Upload, Download) with CBOR codecs
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod changelog;
mod error;
mod messages;
mod record;

pub use change::{ChangeKind, LocalChange, SquashedChange};
pub use changelog::{ChangeLog, ChangeToken};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    DownloadRequest, DownloadResponse, UploadEntryOutcome, UploadRequest, UploadResponse,
    UploadStatus,
};
pub use record::{Record, RecordKey, RecordType, Timestamp};
