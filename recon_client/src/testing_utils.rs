//! A scripted in-memory [`ReconstructionClient`] for tests of code built on top of the client.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use progress_tracking::upload_tracking::UploadProgressTracker;
use progress_tracking::UploadProgressUpdater;
use recon_types::{HealthResponse, ModelInfo, ResultsResponse, SessionId, StartRequest, StartResponse, StatusResponse, UploadResponse};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{ReconClientError, Result};
use crate::interface::{ReconstructionClient, UploadPart};

/// Record of one call made against the mock.
#[derive(Clone, Debug, PartialEq)]
pub enum MockCall {
    Health,
    Upload { file_names: Vec<String> },
    Start { session_id: SessionId, request: StartRequest },
    Status(SessionId),
    Results(SessionId),
    Model(SessionId),
    Delete(SessionId),
    DownloadZip(SessionId),
    DownloadFile { session_id: SessionId, filename: String },
}

/// Each operation pops its next scripted response.  An empty script answers with
/// [`ReconClientError::UnexpectedResponse`], except delete, which succeeds.
pub struct MockReconstructionClient {
    endpoint: String,
    latency: Mutex<Duration>,
    uploads: Mutex<VecDeque<Result<UploadResponse>>>,
    starts: Mutex<VecDeque<Result<StartResponse>>>,
    statuses: Mutex<VecDeque<Result<StatusResponse>>>,
    results: Mutex<VecDeque<Result<ResultsResponse>>>,
    models: Mutex<VecDeque<Result<ModelInfo>>>,
    deletes: Mutex<VecDeque<Result<()>>>,
    blobs: Mutex<HashMap<String, Bytes>>,
    calls: Mutex<Vec<MockCall>>,
}

impl Default for MockReconstructionClient {
    fn default() -> Self {
        Self::new("http://localhost:5000")
    }
}

impl MockReconstructionClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            latency: Mutex::new(Duration::ZERO),
            uploads: Default::default(),
            starts: Default::default(),
            statuses: Default::default(),
            results: Default::default(),
            models: Default::default(),
            deletes: Default::default(),
            blobs: Default::default(),
            calls: Default::default(),
        }
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Every call sleeps this long (on the tokio clock) before answering.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn push_upload(&self, response: Result<UploadResponse>) {
        self.uploads.lock().push_back(response);
    }

    pub fn push_start(&self, response: Result<StartResponse>) {
        self.starts.lock().push_back(response);
    }

    pub fn push_status(&self, response: Result<StatusResponse>) {
        self.statuses.lock().push_back(response);
    }

    pub fn push_results(&self, response: Result<ResultsResponse>) {
        self.results.lock().push_back(response);
    }

    pub fn push_model(&self, response: Result<ModelInfo>) {
        self.models.lock().push_back(response);
    }

    pub fn push_delete(&self, response: Result<()>) {
        self.deletes.lock().push_back(response);
    }

    /// Content served by the download calls; the zip bundle is keyed by `"<session_id>.zip"`.
    pub fn set_blob(&self, key: impl Into<String>, data: impl Into<Bytes>) {
        self.blobs.lock().insert(key.into(), data.into());
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    pub fn count_calls(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    pub fn upload_calls(&self) -> usize {
        self.count_calls(|c| matches!(c, MockCall::Upload { .. }))
    }

    pub fn start_calls(&self) -> usize {
        self.count_calls(|c| matches!(c, MockCall::Start { .. }))
    }

    pub fn status_calls(&self) -> usize {
        self.count_calls(|c| matches!(c, MockCall::Status(_)))
    }

    pub fn results_calls(&self) -> usize {
        self.count_calls(|c| matches!(c, MockCall::Results(_)))
    }

    pub fn model_calls(&self) -> usize {
        self.count_calls(|c| matches!(c, MockCall::Model(_)))
    }

    pub fn delete_calls(&self) -> usize {
        self.count_calls(|c| matches!(c, MockCall::Delete(_)))
    }

    async fn answer<T>(&self, call: MockCall, script: &Mutex<VecDeque<Result<T>>>, name: &str) -> Result<T> {
        self.calls.lock().push(call);
        self.wait().await;
        let next = script.lock().pop_front();
        next.unwrap_or_else(|| Err(ReconClientError::UnexpectedResponse(format!("no scripted {name} response"))))
    }

    async fn wait(&self) {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    async fn serve_blob(&self, key: &str, writer: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64> {
        self.wait().await;
        let blob = self.blobs.lock().get(key).cloned();
        let Some(data) = blob else {
            return Err(ReconClientError::Status {
                status: 404,
                message: format!("File not found: {key}"),
            });
        };
        writer.write_all(&data).await?;
        writer.flush().await?;
        Ok(data.len() as u64)
    }
}

#[async_trait::async_trait]
impl ReconstructionClient for MockReconstructionClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn health_check(&self) -> Result<HealthResponse> {
        self.calls.lock().push(MockCall::Health);
        self.wait().await;
        Ok(HealthResponse {
            status: "ok".to_owned(),
            timestamp: None,
        })
    }

    async fn upload_images(
        &self,
        parts: Vec<UploadPart>,
        progress: Arc<dyn UploadProgressUpdater>,
    ) -> Result<UploadResponse> {
        let file_names = parts.iter().map(|p| p.file_name.clone()).collect();
        let tracker = UploadProgressTracker::new(parts.iter().map(UploadPart::len).sum(), progress);
        for part in &parts {
            tracker.register_bytes_sent(part.len());
        }

        let response = self.answer(MockCall::Upload { file_names }, &self.uploads, "upload").await;
        if response.is_ok() {
            tracker.complete();
        }
        response
    }

    async fn start_reconstruction(&self, session_id: &SessionId, request: StartRequest) -> Result<StartResponse> {
        let call = MockCall::Start {
            session_id: session_id.clone(),
            request,
        };
        self.answer(call, &self.starts, "start").await
    }

    async fn get_status(&self, session_id: &SessionId) -> Result<StatusResponse> {
        self.answer(MockCall::Status(session_id.clone()), &self.statuses, "status").await
    }

    async fn get_results(&self, session_id: &SessionId) -> Result<ResultsResponse> {
        self.answer(MockCall::Results(session_id.clone()), &self.results, "results").await
    }

    async fn get_model_info(&self, session_id: &SessionId) -> Result<ModelInfo> {
        self.answer(MockCall::Model(session_id.clone()), &self.models, "model").await
    }

    async fn delete_session(&self, session_id: &SessionId) -> Result<()> {
        self.calls.lock().push(MockCall::Delete(session_id.clone()));
        self.wait().await;
        let next = self.deletes.lock().pop_front();
        next.unwrap_or(Ok(()))
    }

    async fn download_zip(&self, session_id: &SessionId, writer: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64> {
        self.calls.lock().push(MockCall::DownloadZip(session_id.clone()));
        self.serve_blob(&format!("{session_id}.zip"), writer).await
    }

    async fn download_file(
        &self,
        session_id: &SessionId,
        filename: &str,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64> {
        self.calls.lock().push(MockCall::DownloadFile {
            session_id: session_id.clone(),
            filename: filename.to_owned(),
        });
        self.serve_blob(filename, writer).await
    }
}
