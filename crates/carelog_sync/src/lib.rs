//! # CareLog Sync Engine
//!
//! Bidirectional sync engine and state machine for CareLog.
//!
//! This crate provides:
//! - Sync state machine (`NotStarted → Started → InProgress* → terminal`)
//! - Uploader with per-batch atomicity and token-based acknowledgement
//! - Downloader with per-type watermarks and conflict deferral
//! - Transport abstraction over the remote endpoint
//!
//! ## Architecture
//!
//! One invocation of [`Synchronizer::run`] performs a **single fixed pass**:
//! download remote updates, then upload pending local changes (order is
//! configurable). The engine never retries internally; retry cadence and
//! backoff belong to the external scheduler that triggers it.
//!
//! ## Key invariants
//!
//! - Change-log entries are deleted only after the sink acknowledged them
//! - Watermarks never advance past a deferred remote record
//! - Remote upserts are idempotent, so re-applying a page is safe
//! - A cancelled run leaves the store and log in a valid state

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod download;
mod engine;
mod error;
mod state;
mod transport;
mod upload;

pub use config::{DownloadConflictPolicy, SyncConfig, SyncOrder};
pub use download::DownloadSummary;
pub use engine::{SyncOutcome, Synchronizer};
pub use error::{SyncError, SyncResult};
pub use state::{StateNotifier, SyncState};
pub use transport::{MockTransport, SyncTransport};
pub use upload::UploadSummary;
