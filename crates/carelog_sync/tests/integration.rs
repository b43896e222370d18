//! End-to-end scenarios for the sync engine.

use carelog_protocol::{
    ChangeKind, DownloadResponse, Record, RecordKey, RecordType, Timestamp, UploadEntryOutcome,
    UploadRequest, UploadResponse, UploadStatus,
};
use carelog_store::RecordStore;
use carelog_sync::{MockTransport, SyncConfig, SyncError, SyncState, Synchronizer};
use std::sync::Arc;

fn patient_engine(
    store: Arc<RecordStore>,
    transport: Arc<MockTransport>,
    batch_size: usize,
) -> Synchronizer<MockTransport> {
    let config =
        SyncConfig::new([RecordType::new("Patient")]).with_upload_batch_size(batch_size);
    Synchronizer::new(store, transport, config)
}

fn local(id: &str, payload: &[u8]) -> Record {
    Record::new("Patient", id, payload.to_vec(), Timestamp::ZERO)
}

fn accept_pending(transport: &MockTransport, store: &RecordStore, batch_size: usize) {
    let batch = store.squashed_changes(batch_size);
    let request = UploadRequest::new(batch.iter().map(|s| s.change.clone()).collect());
    transport.push_upload_response(Ok(UploadResponse::accept_all(&request)));
}

#[test]
fn create_then_sync_runs_started_inprogress_finished() {
    let store = Arc::new(RecordStore::new());
    store.create(local("p1", b"v1")).unwrap();

    // Exactly one INSERT is pending.
    let pending = store.squashed_changes(10);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].change.kind, ChangeKind::Insert);

    let transport = Arc::new(MockTransport::new());
    transport.push_download_response(Ok(DownloadResponse::done()));
    accept_pending(&transport, &store, 10);

    let engine = patient_engine(Arc::clone(&store), transport, 10);
    let states = engine.subscribe();
    let outcome = engine.run();

    assert!(outcome.is_success());
    assert_eq!(store.pending_change_count(), 0);
    // Nothing was downloaded, so the watermark is untouched.
    assert_eq!(store.watermark(&RecordType::new("Patient")), None);

    let seen: Vec<SyncState> = states.try_iter().collect();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0], SyncState::Started);
    assert_eq!(
        seen[1],
        SyncState::InProgress {
            completed: 1,
            total: 1
        }
    );
    assert!(matches!(seen[2], SyncState::Finished { .. }));
}

#[test]
fn three_updates_upload_as_one_change_with_third_payload() {
    let store = Arc::new(RecordStore::new());
    store.create(local("p1", b"v0")).unwrap();

    // Start from a synced record so the edits squash to a single UPDATE.
    let token = carelog_protocol::ChangeToken::for_changes(&store.squashed_changes(10));
    store.commit_upload(&token);

    store.update(local("p1", b"v1")).unwrap();
    store.update(local("p1", b"v2")).unwrap();
    store.update(local("p1", b"v3")).unwrap();

    let transport = Arc::new(MockTransport::new());
    transport.push_download_response(Ok(DownloadResponse::done()));
    accept_pending(&transport, &store, 10);

    let engine = patient_engine(Arc::clone(&store), Arc::clone(&transport), 10);
    let outcome = engine.run();
    assert!(outcome.is_success());

    let requests = transport.upload_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].changes.len(), 1);
    assert_eq!(requests[0].changes[0].kind, ChangeKind::Update);
    assert_eq!(requests[0].changes[0].payload, Some(b"v3".to_vec()));
}

#[test]
fn two_page_download_with_failing_second_page_glitches() {
    let store = Arc::new(RecordStore::new());
    let transport = Arc::new(MockTransport::new());

    transport.push_download_response(Ok(DownloadResponse::new(
        vec![
            Record::new("Patient", "r1", b"a".to_vec(), Timestamp(100)),
            Record::new("Patient", "r2", b"b".to_vec(), Timestamp(180)),
        ],
        true,
    )));
    transport.push_download_response(Err(SyncError::network_retryable("connection reset")));

    let engine = patient_engine(Arc::clone(&store), transport, 10);
    let outcome = engine.run();

    assert!(matches!(outcome.terminal, SyncState::Glitch { .. }));
    assert_eq!(outcome.download.applied, 2);
    assert_eq!(store.record_count(), 2);
    assert_eq!(
        store.watermark(&RecordType::new("Patient")),
        Some(Timestamp(180))
    );
}

#[test]
fn network_failure_mid_upload_keeps_unacknowledged_entries() {
    let store = Arc::new(RecordStore::new());
    store.create(local("p1", b"v1")).unwrap();
    store.create(local("p2", b"v2")).unwrap();

    let transport = Arc::new(MockTransport::new());
    transport.push_download_response(Ok(DownloadResponse::done()));
    // Batch size 1: first batch accepted, second batch hits the network error.
    accept_pending(&transport, &store, 1);
    transport.push_upload_response(Err(SyncError::network_retryable("link down")));

    let engine = patient_engine(Arc::clone(&store), transport, 1);
    let outcome = engine.run();

    assert!(matches!(outcome.terminal, SyncState::Failed { .. }));
    // Acknowledged entry absent, unacknowledged entry present.
    assert!(!store.has_pending_change(&RecordKey::new("Patient", "p1")));
    assert!(store.has_pending_change(&RecordKey::new("Patient", "p2")));
}

#[test]
fn uploaded_record_round_trips_through_download() {
    let store = Arc::new(RecordStore::new());
    store.create(local("p1", b"payload")).unwrap();

    // First pass: upload the record.
    let transport = Arc::new(MockTransport::new());
    transport.push_download_response(Ok(DownloadResponse::done()));
    accept_pending(&transport, &store, 10);
    let engine = patient_engine(Arc::clone(&store), Arc::clone(&transport), 10);
    assert!(engine.run().is_success());

    // Second pass: the server returns its copy of the same record.
    let server_copy = store.get(&RecordKey::new("Patient", "p1")).unwrap();
    transport.push_download_response(Ok(DownloadResponse::new(
        vec![server_copy.clone()],
        false,
    )));
    assert!(engine.run().is_success());

    // Upsert, not duplicate, and no drift.
    assert_eq!(store.record_count(), 1);
    let fetched = store.get(&RecordKey::new("Patient", "p1")).unwrap();
    assert_eq!(fetched, server_copy);
    assert_eq!(store.pending_change_count(), 0);
}

#[test]
fn download_never_overwrites_pending_local_change() {
    let store = Arc::new(RecordStore::new());
    store.create(local("p1", b"local-edit")).unwrap();

    let transport = Arc::new(MockTransport::new());
    transport.push_download_response(Ok(DownloadResponse::new(
        vec![Record::new("Patient", "p1", b"remote".to_vec(), Timestamp(500))],
        false,
    )));
    accept_pending(&transport, &store, 10);

    let engine = patient_engine(Arc::clone(&store), transport, 10);
    let outcome = engine.run();

    // Deferral is a statistic, not a failure.
    assert!(outcome.is_success());
    assert_eq!(outcome.download.deferred, 1);
    let record = store.get(&RecordKey::new("Patient", "p1")).unwrap();
    assert_eq!(record.payload, b"local-edit".to_vec());
}

#[test]
fn rejected_entry_glitches_and_stays_pending() {
    let store = Arc::new(RecordStore::new());
    store.create(local("p1", b"bad")).unwrap();

    let transport = Arc::new(MockTransport::new());
    transport.push_download_response(Ok(DownloadResponse::done()));
    transport.push_upload_response(Ok(UploadResponse {
        outcomes: vec![UploadEntryOutcome {
            key: RecordKey::new("Patient", "p1"),
            status: UploadStatus::Rejected {
                reason: "missing required field".into(),
            },
        }],
    }));

    let engine = patient_engine(Arc::clone(&store), transport, 10);
    let outcome = engine.run();

    match outcome.terminal {
        SyncState::Glitch { recoverable } => {
            assert_eq!(recoverable.len(), 1);
            assert!(recoverable[0].contains("missing required field"));
        }
        other => panic!("expected Glitch, got {other:?}"),
    }
    assert!(store.has_pending_change(&RecordKey::new("Patient", "p1")));
}

#[test]
fn consecutive_runs_reuse_the_engine() {
    let store = Arc::new(RecordStore::new());
    let transport = Arc::new(MockTransport::new());
    let engine = patient_engine(Arc::clone(&store), Arc::clone(&transport), 10);

    transport.push_download_response(Ok(DownloadResponse::done()));
    assert!(engine.run().is_success());

    store.create(local("p9", b"v")).unwrap();
    transport.push_download_response(Ok(DownloadResponse::done()));
    accept_pending(&transport, &store, 10);
    assert!(engine.run().is_success());
    assert_eq!(store.pending_change_count(), 0);
}
