//! Downloader: pulls remote updates newer than the per-type watermarks.

use crate::config::DownloadConflictPolicy;
use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use carelog_protocol::{DownloadRequest, RecordType, Timestamp};
use carelog_store::RecordStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Aggregated result of the download phase.
#[derive(Debug, Clone, Default)]
pub struct DownloadSummary {
    /// Remote records upserted into the store.
    pub applied: u64,
    /// Remote records skipped because of an in-flight local change; not an
    /// error, retried on a later cycle.
    pub deferred: u64,
    /// Page fetch failures, one entry per halted type.
    pub errors: Vec<String>,
    /// Records received across all types.
    pub total: u64,
}

/// Pulls pages of remote records per type and applies them with upsert
/// semantics.
///
/// The durable watermark for a type only advances through records applied
/// before the first deferral, so a deferred record is re-downloaded on the
/// next cycle. Pagination within the run uses a separate cursor, so one
/// deferral does not stall the rest of the pass. Re-downloading an already
/// applied page is safe because upsert is idempotent.
pub(crate) fn run_download<T: SyncTransport>(
    store: &RecordStore,
    transport: &T,
    types: &[RecordType],
    page_size: u32,
    timeout: Duration,
    policy: DownloadConflictPolicy,
    cancelled: &AtomicBool,
    mut progress: impl FnMut(u64, u64),
) -> SyncResult<DownloadSummary> {
    let mut summary = DownloadSummary::default();

    for record_type in types {
        let mut cursor = store.watermark(record_type).unwrap_or(Timestamp::ZERO);
        let mut deferral_seen = false;

        loop {
            if cancelled.load(Ordering::SeqCst) {
                return Err(SyncError::Cancelled);
            }

            let request = DownloadRequest::new(record_type.clone(), cursor, page_size);
            let page = match transport.download(&request, timeout) {
                Ok(page) => page,
                Err(
                    e @ (SyncError::Cancelled
                    | SyncError::Authentication(_)
                    | SyncError::Storage(_)),
                ) => return Err(e),
                Err(e) => {
                    warn!(record_type = %record_type, error = %e, "page fetch failed, halting type");
                    summary.errors.push(format!("{record_type}: {e}"));
                    break;
                }
            };
            debug!(
                record_type = %record_type,
                records = page.records.len(),
                has_more = page.has_more,
                "applying download page"
            );

            let mut durable_advance: Option<Timestamp> = None;
            for record in page.records {
                summary.total += 1;
                if record.last_updated > cursor {
                    cursor = record.last_updated;
                }

                let pending =
                    policy == DownloadConflictPolicy::DeferLocal
                        && store.has_pending_change(&record.key());
                if pending {
                    debug!(key = %record.key(), "deferring remote update over local change");
                    summary.deferred += 1;
                    deferral_seen = true;
                    continue;
                }

                let last_updated = record.last_updated;
                store.apply_remote(record)?;
                summary.applied += 1;
                if !deferral_seen {
                    durable_advance = Some(last_updated);
                }
            }

            // The page is applied; only now may the watermark move.
            if let Some(ts) = durable_advance {
                store.advance_watermark(record_type, ts);
            }
            if summary.applied > 0 {
                progress(summary.applied, summary.applied);
            }

            if !page.has_more {
                break;
            }
        }
    }

    Ok(summary)
}
