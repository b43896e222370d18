//! The synchronizer: one observable sync pass over download and upload.

use crate::config::{SyncConfig, SyncOrder};
use crate::download::{run_download, DownloadSummary};
use crate::error::{SyncError, SyncResult};
use crate::state::{StateNotifier, SyncState};
use crate::transport::SyncTransport;
use crate::upload::{run_upload, UploadSummary};
use carelog_protocol::Timestamp;
use carelog_store::RecordStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::{info, warn};

/// The aggregated result of one sync pass.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// Download phase summary.
    pub download: DownloadSummary,
    /// Upload phase summary.
    pub upload: UploadSummary,
    /// The terminal state the pass ended in.
    pub terminal: SyncState,
}

impl SyncOutcome {
    /// Returns true if the pass finished with zero unresolved failures.
    pub fn is_success(&self) -> bool {
        matches!(self.terminal, SyncState::Finished { .. })
    }
}

/// Orchestrates one full sync attempt and publishes its state transitions.
///
/// The synchronizer is a fixed single pass per invocation: it never retries
/// internally. Retry cadence and backoff belong to whatever scheduler calls
/// [`Synchronizer::run`], which also guarantees at most one in-flight run;
/// the `running` flag here is only a safety net against misuse.
///
/// Collaborators are supplied explicitly at construction; there is no
/// process-wide engine instance.
pub struct Synchronizer<T: SyncTransport> {
    store: Arc<RecordStore>,
    transport: Arc<T>,
    config: SyncConfig,
    notifier: StateNotifier,
    cancelled: AtomicBool,
    running: AtomicBool,
}

impl<T: SyncTransport> Synchronizer<T> {
    /// Creates a synchronizer over the given store and transport.
    pub fn new(store: Arc<RecordStore>, transport: Arc<T>, config: SyncConfig) -> Self {
        Self {
            store,
            transport,
            config,
            notifier: StateNotifier::new(),
            cancelled: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }

    /// Returns the most recently published state.
    pub fn state(&self) -> SyncState {
        self.notifier.current()
    }

    /// Registers an observer of state transitions.
    pub fn subscribe(&self) -> Receiver<SyncState> {
        self.notifier.subscribe()
    }

    /// Requests cooperative cancellation of an in-flight run.
    ///
    /// The run stops at the next suspension point, leaves the store and log
    /// valid, and ends in `Failed` with a cancellation cause.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// The timestamp of the last fully successful sync, if any.
    pub fn last_sync_time(&self) -> Option<Timestamp> {
        self.store.last_sync_time()
    }

    /// Performs one sync pass and returns its outcome.
    ///
    /// `Started` is emitted before any network I/O; `InProgress` after each
    /// committed batch and applied page; exactly one terminal state ends the
    /// sequence. Per-entry rejections and per-page fetch failures aggregate
    /// into a `Glitch` terminal; fatal errors end the pass in `Failed`.
    pub fn run(&self) -> SyncOutcome {
        if self.running.swap(true, Ordering::SeqCst) {
            // Safety net only; the scheduler owns mutual exclusion.
            warn!("sync invoked while another run is in flight");
            return SyncOutcome {
                download: DownloadSummary::default(),
                upload: UploadSummary::default(),
                terminal: SyncState::Failed {
                    error: "sync already in progress".into(),
                    at: Timestamp::now(),
                },
            };
        }
        self.cancelled.store(false, Ordering::SeqCst);
        info!(types = self.config.record_types.len(), "starting sync pass");
        self.notifier.emit(SyncState::Started);

        let (download, upload, error) = self.execute();
        let outcome = match error {
            None => {
                let mut recoverable: Vec<String> = download.errors.clone();
                recoverable.extend(
                    upload
                        .rejected
                        .iter()
                        .map(|(key, reason)| format!("{key}: {reason}")),
                );

                let terminal = if recoverable.is_empty() {
                    let at = Timestamp::now();
                    self.store.set_last_sync_time(at);
                    info!(
                        applied = download.applied,
                        uploaded = upload.uploaded,
                        deferred = download.deferred,
                        "sync pass finished"
                    );
                    SyncState::Finished { at }
                } else {
                    warn!(failures = recoverable.len(), "sync pass completed with glitches");
                    SyncState::Glitch { recoverable }
                };

                SyncOutcome {
                    download,
                    upload,
                    terminal,
                }
            }
            Some(e) => {
                warn!(error = %e, "sync pass failed");
                SyncOutcome {
                    download,
                    upload,
                    terminal: SyncState::Failed {
                        error: e.to_string(),
                        at: Timestamp::now(),
                    },
                }
            }
        };

        self.notifier.emit(outcome.terminal.clone());
        self.running.store(false, Ordering::SeqCst);
        outcome
    }

    /// Runs the two phases in configured order, threading cumulative
    /// progress counters through the notifier.
    ///
    /// A fatal error ends the pass, but a phase that already completed keeps
    /// its summary so the outcome reflects the work that actually happened.
    fn execute(&self) -> (DownloadSummary, UploadSummary, Option<SyncError>) {
        match self.config.order {
            SyncOrder::DownloadFirst => {
                let download = match self.download_phase(0) {
                    Ok(download) => download,
                    Err(e) => {
                        return (DownloadSummary::default(), UploadSummary::default(), Some(e))
                    }
                };
                match self.upload_phase(download.applied) {
                    Ok(upload) => (download, upload, None),
                    Err(e) => (download, UploadSummary::default(), Some(e)),
                }
            }
            SyncOrder::UploadFirst => {
                let upload = match self.upload_phase(0) {
                    Ok(upload) => upload,
                    Err(e) => {
                        return (DownloadSummary::default(), UploadSummary::default(), Some(e))
                    }
                };
                match self.download_phase(upload.uploaded) {
                    Ok(download) => (download, upload, None),
                    Err(e) => (DownloadSummary::default(), upload, Some(e)),
                }
            }
        }
    }

    fn download_phase(&self, base: u64) -> SyncResult<DownloadSummary> {
        run_download(
            &self.store,
            self.transport.as_ref(),
            &self.config.record_types,
            self.config.download_page_size,
            self.config.timeout,
            self.config.download_conflict,
            &self.cancelled,
            |completed, total| {
                self.notifier.emit(SyncState::InProgress {
                    completed: base + completed,
                    total: base + total,
                });
            },
        )
    }

    fn upload_phase(&self, base: u64) -> SyncResult<UploadSummary> {
        run_upload(
            &self.store,
            self.transport.as_ref(),
            self.config.upload_batch_size,
            self.config.timeout,
            &self.cancelled,
            |completed, total| {
                self.notifier.emit(SyncState::InProgress {
                    completed: base + completed,
                    total: base + total,
                });
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use carelog_protocol::{DownloadResponse, Record, RecordType, UploadRequest, UploadResponse};
    use std::time::Duration;

    fn engine_with(
        store: Arc<RecordStore>,
        transport: Arc<MockTransport>,
    ) -> Synchronizer<MockTransport> {
        let config = SyncConfig::new([RecordType::new("Patient")]);
        Synchronizer::new(store, transport, config)
    }

    #[test]
    fn initial_state_is_not_started() {
        let engine = engine_with(Arc::new(RecordStore::new()), Arc::new(MockTransport::new()));
        assert_eq!(engine.state(), SyncState::NotStarted);
    }

    #[test]
    fn empty_run_finishes_and_records_last_sync() {
        let store = Arc::new(RecordStore::new());
        let transport = Arc::new(MockTransport::new());
        transport.push_download_response(Ok(DownloadResponse::done()));

        let engine = engine_with(Arc::clone(&store), transport);
        let outcome = engine.run();

        assert!(outcome.is_success());
        assert!(store.last_sync_time().is_some());
        assert!(engine.state().is_terminal());
    }

    #[test]
    fn fatal_download_error_fails_the_run() {
        let store = Arc::new(RecordStore::new());
        let transport = Arc::new(MockTransport::new());
        transport.push_download_response(Err(crate::SyncError::Authentication("nope".into())));

        let engine = engine_with(store, transport);
        let outcome = engine.run();

        assert!(matches!(outcome.terminal, SyncState::Failed { .. }));
    }

    #[test]
    fn page_error_surfaces_as_glitch() {
        let store = Arc::new(RecordStore::new());
        let transport = Arc::new(MockTransport::new());
        transport
            .push_download_response(Err(crate::SyncError::network_retryable("flaky link")));

        let engine = engine_with(Arc::clone(&store), transport);
        let outcome = engine.run();

        assert!(matches!(outcome.terminal, SyncState::Glitch { .. }));
        // A glitched run must not claim a fully successful sync.
        assert!(store.last_sync_time().is_none());
    }

    #[test]
    fn failed_upload_keeps_download_counters() {
        let store = Arc::new(RecordStore::new());
        store
            .create(Record::new(
                "Patient",
                "p1",
                b"v".to_vec(),
                Timestamp::ZERO,
            ))
            .unwrap();

        let transport = Arc::new(MockTransport::new());
        transport.push_download_response(Ok(DownloadResponse::new(
            vec![Record::new("Patient", "r2", b"remote".to_vec(), Timestamp(50))],
            false,
        )));
        transport.push_upload_response(Err(SyncError::network_retryable("link down")));

        let engine = engine_with(Arc::clone(&store), transport);
        let outcome = engine.run();

        assert!(matches!(outcome.terminal, SyncState::Failed { .. }));
        // The download completed before the upload died; its work shows.
        assert_eq!(outcome.download.applied, 1);
        assert_eq!(store.record_count(), 2);
    }

    #[test]
    fn configured_timeout_reaches_the_transport() {
        let transport = Arc::new(MockTransport::new());
        transport.push_download_response(Ok(DownloadResponse::done()));

        let config = SyncConfig::new([RecordType::new("Patient")])
            .with_timeout(Duration::from_secs(7));
        let engine = Synchronizer::new(Arc::new(RecordStore::new()), Arc::clone(&transport), config);
        engine.run();

        assert_eq!(transport.download_timeouts(), vec![Duration::from_secs(7)]);
    }

    #[test]
    fn cancel_sets_and_run_resets_the_flag() {
        let transport = Arc::new(MockTransport::new());
        transport.push_download_response(Ok(DownloadResponse::done()));
        let engine = engine_with(Arc::new(RecordStore::new()), transport);

        // cancel() is meant for stopping an in-flight run from another
        // thread; run() clears any stale request at the start of a pass.
        engine.cancel();
        assert!(engine.cancelled.load(Ordering::SeqCst));
        engine.run();
        assert!(!engine.cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn upload_first_order_runs_upload_before_download() {
        let store = Arc::new(RecordStore::new());
        store
            .create(Record::new(
                "Patient",
                "p1",
                b"v".to_vec(),
                carelog_protocol::Timestamp::ZERO,
            ))
            .unwrap();

        let transport = Arc::new(MockTransport::new());
        let batch = store.squashed_changes(10);
        transport.push_upload_response(Ok(UploadResponse::accept_all(&UploadRequest::new(
            batch.iter().map(|s| s.change.clone()).collect(),
        ))));
        transport.push_download_response(Ok(DownloadResponse::done()));

        let config = SyncConfig::new([RecordType::new("Patient")])
            .with_order(SyncOrder::UploadFirst);
        let engine = Synchronizer::new(Arc::clone(&store), transport, config);

        let outcome = engine.run();
        assert!(outcome.is_success());
        assert_eq!(outcome.upload.uploaded, 1);
        assert_eq!(store.pending_change_count(), 0);
    }
}
