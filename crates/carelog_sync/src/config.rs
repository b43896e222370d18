//! Configuration for the sync engine.

use carelog_protocol::RecordType;
use std::time::Duration;

/// Which direction runs first within a sync pass.
///
/// Download-first is the default: remote state lands before local changes are
/// pushed, and the two phases never observe a half-squashed log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncOrder {
    /// Download remote updates, then upload local changes.
    #[default]
    DownloadFirst,
    /// Upload local changes, then download remote updates.
    UploadFirst,
}

/// What to do when a downloaded record collides with an uncommitted local
/// change for the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadConflictPolicy {
    /// Skip the remote record this cycle; it is retried after the local
    /// change has been uploaded. Never loses an edit in flight.
    #[default]
    DeferLocal,
    /// Apply the remote record unconditionally, discarding nothing from the
    /// change log (the local change still uploads later).
    RemoteWins,
}

/// Configuration for sync runs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Record types to download, in order.
    pub record_types: Vec<RecordType>,
    /// Maximum squashed changes per upload batch.
    pub upload_batch_size: usize,
    /// Maximum records per download page.
    pub download_page_size: u32,
    /// Timeout handed to the transport for every network call.
    pub timeout: Duration,
    /// Phase ordering within a pass.
    pub order: SyncOrder,
    /// Conflict policy for downloads racing local edits.
    pub download_conflict: DownloadConflictPolicy,
}

impl SyncConfig {
    /// Creates a configuration for the given record types.
    pub fn new(record_types: impl IntoIterator<Item = RecordType>) -> Self {
        Self {
            record_types: record_types.into_iter().collect(),
            upload_batch_size: 100,
            download_page_size: 100,
            timeout: Duration::from_secs(30),
            order: SyncOrder::default(),
            download_conflict: DownloadConflictPolicy::default(),
        }
    }

    /// Sets the upload batch size.
    pub fn with_upload_batch_size(mut self, size: usize) -> Self {
        self.upload_batch_size = size;
        self
    }

    /// Sets the download page size.
    pub fn with_download_page_size(mut self, size: u32) -> Self {
        self.download_page_size = size;
        self
    }

    /// Sets the network timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the phase ordering.
    pub fn with_order(mut self, order: SyncOrder) -> Self {
        self.order = order;
        self
    }

    /// Sets the download conflict policy.
    pub fn with_download_conflict(mut self, policy: DownloadConflictPolicy) -> Self {
        self.download_conflict = policy;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new([])
    }
}
