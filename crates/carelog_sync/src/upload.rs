//! Uploader: drains squashed local changes to the remote sink.

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use carelog_protocol::{ChangeToken, RecordKey, UploadRequest, UploadStatus};
use carelog_store::RecordStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Aggregated result of the upload phase.
#[derive(Debug, Clone, Default)]
pub struct UploadSummary {
    /// Entries acknowledged by the sink and removed from the log.
    pub uploaded: u64,
    /// Entries the sink rejected; they remain in the log for retry.
    pub rejected: Vec<(RecordKey, String)>,
    /// Squashed entries pending when the phase began.
    pub total: u64,
}

/// Drains squashed changes in log order, committing each batch's
/// acknowledged prefix.
///
/// Entries are never removed speculatively: deletion happens only after the
/// sink has acknowledged them, via a token covering the contiguous accepted
/// prefix of the batch. A rejection ends the phase so the rejected change is
/// preserved for a later retry; a network error leaves the whole batch
/// untouched and propagates.
pub(crate) fn run_upload<T: SyncTransport>(
    store: &RecordStore,
    transport: &T,
    batch_size: usize,
    timeout: Duration,
    cancelled: &AtomicBool,
    mut progress: impl FnMut(u64, u64),
) -> SyncResult<UploadSummary> {
    let total = store.pending_change_count() as u64;
    let mut summary = UploadSummary {
        total,
        ..UploadSummary::default()
    };

    loop {
        if cancelled.load(Ordering::SeqCst) {
            return Err(SyncError::Cancelled);
        }

        let batch = store.squashed_changes(batch_size);
        if batch.is_empty() {
            break;
        }
        debug!(batch = batch.len(), "uploading change batch");

        let request = UploadRequest::new(batch.iter().map(|s| s.change.clone()).collect());
        let response = transport.upload(&request, timeout)?;

        if response.outcomes.len() != batch.len() {
            return Err(SyncError::Protocol(format!(
                "sink returned {} outcomes for a batch of {}",
                response.outcomes.len(),
                batch.len()
            )));
        }

        // The committable prefix ends at the first rejection; everything the
        // sink rejected stays in the log.
        let mut prefix = 0;
        let mut batch_rejected = false;
        for (outcome, squashed) in response.outcomes.iter().zip(&batch) {
            match &outcome.status {
                UploadStatus::Accepted { .. } if !batch_rejected => prefix += 1,
                UploadStatus::Accepted { .. } => {}
                UploadStatus::Rejected { reason } => {
                    warn!(key = %squashed.change.key, reason = %reason, "sink rejected change");
                    batch_rejected = true;
                    summary
                        .rejected
                        .push((squashed.change.key.clone(), reason.clone()));
                }
            }
        }

        if prefix > 0 {
            let token = ChangeToken::for_changes(&batch[..prefix]);
            store.commit_upload(&token);
            summary.uploaded += prefix as u64;
            progress(summary.uploaded, total);
        }

        if batch_rejected {
            break;
        }
    }

    Ok(summary)
}
