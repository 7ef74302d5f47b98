use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use progress_tracking::upload_tracking::UploadProgressTracker;
use progress_tracking::UploadProgressUpdater;
use recon_config::groups::client;
use recon_config::ReconConfig;
use error_printer::ErrorPrinter;
use recon_types::{
    ErrorBody, HealthResponse, ModelInfo, ResultsResponse, SessionId, StartRequest, StartResponse, StatusResponse, UploadResponse,
};
use reqwest::{Response, Url};
use reqwest_middleware::ClientWithMiddleware;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, instrument};

use crate::error::{ReconClientError, Result};
use crate::http_client::build_http_client;
use crate::interface::{ReconstructionClient, UploadPart};
use crate::multipart::{build_upload_form, total_upload_bytes};

/// Talks to the reconstruction service over HTTP.
pub struct RemoteClient {
    client: ClientWithMiddleware,
    endpoint: Url,
    endpoint_str: String,
    upload_timeout: Duration,
    start_timeout: Duration,
    poll_timeout: Duration,
    request_timeout: Duration,
}

impl RemoteClient {
    pub fn new(config: &client::ConfigValueGroup) -> Result<Self> {
        let client = build_http_client(config)?;
        Self::with_http_client(client, config)
    }

    pub fn from_config(config: &ReconConfig) -> Result<Self> {
        Self::new(&config.client)
    }

    /// Uses an already built client; the timeouts and endpoint still come from `config`.
    pub fn with_http_client(client: ClientWithMiddleware, config: &client::ConfigValueGroup) -> Result<Self> {
        let endpoint_str = config.endpoint.trim_end_matches('/').to_owned();
        let endpoint = Url::parse(&endpoint_str)?;
        if endpoint.cannot_be_a_base() {
            return Err(ReconClientError::UnexpectedResponse(format!("endpoint {endpoint_str} cannot be a base URL")));
        }

        Ok(Self {
            client,
            endpoint,
            endpoint_str,
            upload_timeout: config.upload_timeout,
            start_timeout: config.start_timeout,
            poll_timeout: config.poll_timeout,
            request_timeout: config.request_timeout,
        })
    }

    /// `<endpoint>/<segments...>`, with each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| ReconClientError::UnexpectedResponse(format!("endpoint {} cannot be a base URL", self.endpoint)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// `<endpoint>/api/<segments...>`.
    fn api_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.url(&["api"])?;
        url.path_segments_mut()
            .map_err(|_| ReconClientError::UnexpectedResponse(format!("endpoint {} cannot be a base URL", self.endpoint)))?
            .extend(segments);
        Ok(url)
    }

    async fn download_to(&self, url: Url, writer: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64> {
        let response = self.client.get(url).timeout(self.request_timeout).send().await?;
        let response = check_response(response).await?;

        let mut n_bytes = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            n_bytes += chunk.len() as u64;
        }
        writer.flush().await?;

        Ok(n_bytes)
    }
}

/// Turns a non-2xx response into [`ReconClientError::Status`], preferring the service's `{error}` body.
async fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .bytes()
        .await
        .debug_error(format!("reading body of {status} response"))
        .unwrap_or_default();
    let message = serde_json::from_slice::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.message())
        .unwrap_or_else(|| {
            let text = String::from_utf8_lossy(&body).trim().to_owned();
            if text.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_owned()
            } else {
                text
            }
        });

    Err(ReconClientError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let response = check_response(response).await?;
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

#[async_trait]
impl ReconstructionClient for RemoteClient {
    fn endpoint(&self) -> &str {
        &self.endpoint_str
    }

    async fn health_check(&self) -> Result<HealthResponse> {
        let url = self.url(&["health"])?;
        let response = self.client.get(url).timeout(self.request_timeout).send().await?;
        parse_json(response).await
    }

    #[instrument(skip_all, name = "RemoteClient::upload_images", fields(num_files = parts.len()))]
    async fn upload_images(
        &self,
        parts: Vec<UploadPart>,
        progress: Arc<dyn UploadProgressUpdater>,
    ) -> Result<UploadResponse> {
        let url = self.api_url(&["upload"])?;
        let total_bytes = total_upload_bytes(&parts);
        let tracker = UploadProgressTracker::new(total_bytes, progress);
        let form = build_upload_form(parts, &tracker)?;

        let response = self
            .client
            .post(url)
            .multipart(form)
            .timeout(self.upload_timeout)
            .send()
            .await?;
        let upload: UploadResponse = parse_json(response).await?;

        tracker.complete();
        info!(session_id = %upload.session_id, total_bytes, "upload accepted");
        Ok(upload)
    }

    async fn start_reconstruction(&self, session_id: &SessionId, request: StartRequest) -> Result<StartResponse> {
        let url = self.api_url(&["reconstruct", session_id.as_str()])?;
        debug!(%session_id, quality = %request.quality, method = %request.method, "starting reconstruction");

        let response = self
            .client
            .post(url)
            .json(&request)
            .timeout(self.start_timeout)
            .send()
            .await?;
        parse_json(response).await
    }

    async fn get_status(&self, session_id: &SessionId) -> Result<StatusResponse> {
        let url = self.api_url(&["status", session_id.as_str()])?;
        let response = self.client.get(url).timeout(self.poll_timeout).send().await?;
        parse_json(response).await
    }

    async fn get_results(&self, session_id: &SessionId) -> Result<ResultsResponse> {
        let url = self.api_url(&["results", session_id.as_str()])?;
        let response = self.client.get(url).timeout(self.request_timeout).send().await?;
        parse_json(response).await
    }

    async fn get_model_info(&self, session_id: &SessionId) -> Result<ModelInfo> {
        let url = self.api_url(&["model", session_id.as_str()])?;
        let response = self.client.get(url).timeout(self.request_timeout).send().await?;
        parse_json(response).await
    }

    async fn delete_session(&self, session_id: &SessionId) -> Result<()> {
        let url = self.api_url(&["delete", session_id.as_str()])?;
        let response = self.client.delete(url).timeout(self.request_timeout).send().await?;
        check_response(response).await?;
        Ok(())
    }

    async fn download_zip(&self, session_id: &SessionId, writer: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64> {
        let url = self.api_url(&["download-zip", session_id.as_str()])?;
        self.download_to(url, writer).await
    }

    async fn download_file(
        &self,
        session_id: &SessionId,
        filename: &str,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64> {
        let url = self.api_url(&["download", session_id.as_str(), filename])?;
        self.download_to(url, writer).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(endpoint: &str) -> RemoteClient {
        let config = ReconConfig::default().with_endpoint(endpoint);
        RemoteClient::from_config(&config).unwrap()
    }

    #[test]
    fn test_api_urls() {
        let client = client_for("http://localhost:5000/");
        assert_eq!(client.endpoint(), "http://localhost:5000");

        let id = SessionId::from("abc");
        assert_eq!(client.api_url(&["status", id.as_str()]).unwrap().as_str(), "http://localhost:5000/api/status/abc");
        assert_eq!(
            client.api_url(&["download", "abc", "model v2.obj"]).unwrap().as_str(),
            "http://localhost:5000/api/download/abc/model%20v2.obj"
        );
    }

    #[test]
    fn test_endpoint_with_path_prefix() {
        let client = client_for("https://example.com/recon");
        assert_eq!(client.api_url(&["upload"]).unwrap().as_str(), "https://example.com/recon/api/upload");
        assert_eq!(client.url(&["health"]).unwrap().as_str(), "https://example.com/recon/health");
    }

    #[test]
    fn test_bad_endpoint_is_rejected() {
        let config = ReconConfig::default().with_endpoint("not a url");
        assert!(matches!(RemoteClient::from_config(&config), Err(ReconClientError::Url(_))));
    }
}
