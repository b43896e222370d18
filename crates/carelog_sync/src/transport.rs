//! Transport layer abstraction for sync runs.

use crate::error::{SyncError, SyncResult};
use carelog_protocol::{DownloadRequest, DownloadResponse, UploadRequest, UploadResponse};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

/// Network communication with the remote sync endpoint.
///
/// Implementations own timeout enforcement: the engine hands them the
/// configured deadline, and an elapsed deadline surfaces as
/// [`SyncError::Timeout`], which the engine treats as a network failure.
/// Calls into the transport are the only suspension points of a sync run.
pub trait SyncTransport: Send + Sync {
    /// Submits an ordered batch of squashed changes to the remote sink.
    fn upload(&self, request: &UploadRequest, timeout: Duration) -> SyncResult<UploadResponse>;

    /// Fetches one page of remote records newer than the request watermark.
    fn download(
        &self,
        request: &DownloadRequest,
        timeout: Duration,
    ) -> SyncResult<DownloadResponse>;
}

/// A scripted transport for tests.
///
/// Responses are queued per endpoint and consumed in FIFO order; requests are
/// recorded for assertions. An exhausted queue yields a protocol error so a
/// test that issues more calls than it scripted fails loudly.
#[derive(Default)]
pub struct MockTransport {
    upload_responses: Mutex<VecDeque<SyncResult<UploadResponse>>>,
    download_responses: Mutex<VecDeque<SyncResult<DownloadResponse>>>,
    upload_requests: Mutex<Vec<UploadRequest>>,
    download_requests: Mutex<Vec<DownloadRequest>>,
    upload_timeouts: Mutex<Vec<Duration>>,
    download_timeouts: Mutex<Vec<Duration>>,
}

impl MockTransport {
    /// Creates a transport with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response for the next unscripted upload call.
    pub fn push_upload_response(&self, response: SyncResult<UploadResponse>) {
        self.upload_responses.lock().push_back(response);
    }

    /// Queues a response for the next unscripted download call.
    pub fn push_download_response(&self, response: SyncResult<DownloadResponse>) {
        self.download_responses.lock().push_back(response);
    }

    /// Upload requests seen so far, in call order.
    pub fn upload_requests(&self) -> Vec<UploadRequest> {
        self.upload_requests.lock().clone()
    }

    /// Download requests seen so far, in call order.
    pub fn download_requests(&self) -> Vec<DownloadRequest> {
        self.download_requests.lock().clone()
    }

    /// Timeouts handed to upload calls, in call order.
    pub fn upload_timeouts(&self) -> Vec<Duration> {
        self.upload_timeouts.lock().clone()
    }

    /// Timeouts handed to download calls, in call order.
    pub fn download_timeouts(&self) -> Vec<Duration> {
        self.download_timeouts.lock().clone()
    }
}

impl SyncTransport for MockTransport {
    fn upload(&self, request: &UploadRequest, timeout: Duration) -> SyncResult<UploadResponse> {
        self.upload_requests.lock().push(request.clone());
        self.upload_timeouts.lock().push(timeout);
        self.upload_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::Protocol("no scripted upload response".into())))
    }

    fn download(
        &self,
        request: &DownloadRequest,
        timeout: Duration,
    ) -> SyncResult<DownloadResponse> {
        self.download_requests.lock().push(request.clone());
        self.download_timeouts.lock().push(timeout);
        self.download_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::Protocol("no scripted download response".into())))
    }
}
