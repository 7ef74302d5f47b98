use std::time::Instant;

use http::Extensions;
use recon_config::groups::client;
use reqwest::{Request, Response};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Middleware, Next};
use tracing::{debug, info};

use crate::error::Result;

/// Builds the client used for every call to the reconstruction service.
pub fn build_http_client(config: &client::ConfigValueGroup) -> Result<ClientWithMiddleware> {
    let reqwest_client = reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .pool_idle_timeout(config.idle_connection_timeout)
        .build()?;

    Ok(ClientBuilder::new(reqwest_client).with(RequestLogMiddleware).build())
}

/// Logs every request with its outcome and latency.
pub struct RequestLogMiddleware;

#[async_trait::async_trait]
impl Middleware for RequestLogMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let method = req.method().clone();
        let url = req.url().clone();
        let start = Instant::now();

        let result = next.run(req, extensions).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => debug!(%method, %url, status = response.status().as_u16(), elapsed_ms, "request finished"),
            Err(e) => info!(%method, %url, elapsed_ms, error = %e, "request failed"),
        }

        result
    }
}
