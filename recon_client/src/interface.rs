use std::sync::Arc;

use bytes::Bytes;
use progress_tracking::UploadProgressUpdater;
use recon_types::{HealthResponse, ModelInfo, ResultsResponse, SessionId, StartRequest, StartResponse, StatusResponse, UploadResponse};
use tokio::io::AsyncWrite;

use crate::error::Result;

/// One image of an upload batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadPart {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl UploadPart {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A client to the reconstruction service.  One method per HTTP operation; none of them
/// retry, and each is bounded by its own timeout.
#[async_trait::async_trait]
pub trait ReconstructionClient: Send + Sync {
    /// Base URL of the service.  Relative URLs returned by the service resolve against it.
    fn endpoint(&self) -> &str;

    /// Checks that the service is reachable and answering.
    async fn health_check(&self) -> Result<HealthResponse>;

    /// Sends the whole batch as one multipart request.  `progress` sees byte-level
    /// progress across all parts and reaches 100% once the service has answered.
    async fn upload_images(
        &self,
        parts: Vec<UploadPart>,
        progress: Arc<dyn UploadProgressUpdater>,
    ) -> Result<UploadResponse>;

    async fn start_reconstruction(&self, session_id: &SessionId, request: StartRequest) -> Result<StartResponse>;

    async fn get_status(&self, session_id: &SessionId) -> Result<StatusResponse>;

    async fn get_results(&self, session_id: &SessionId) -> Result<ResultsResponse>;

    async fn get_model_info(&self, session_id: &SessionId) -> Result<ModelInfo>;

    async fn delete_session(&self, session_id: &SessionId) -> Result<()>;

    /// Streams the zip bundle of every result file into `writer`, returning the byte count.
    async fn download_zip(&self, session_id: &SessionId, writer: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64>;

    /// Streams one result file into `writer`, returning the byte count.
    async fn download_file(
        &self,
        session_id: &SessionId,
        filename: &str,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64>;
}
