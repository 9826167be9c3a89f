//! REST API client for a ComfyUI-Connect deployment.
//!
//! Wraps the three HTTP endpoints the result-acquisition protocol needs
//! (workflow submission, history listing, output retrieval) using
//! [`reqwest`]. The [`WorkflowBackend`] trait is the seam the submitter
//! and resolver talk to, so they can run against an in-memory backend in
//! tests.

use std::time::Duration;

use async_trait::async_trait;

use crate::history::OutputFile;

/// Default timeout for workflow submission. Connect runs the workflow
/// synchronously and may only answer once generation has finished.
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(600);

/// Timeout for history and view requests, which are cheap reads.
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Operations the result-acquisition protocol needs from the remote
/// workflow service.
#[async_trait]
pub trait WorkflowBackend: Send + Sync {
    /// Submit a workflow request body and return the JSON response.
    async fn submit_workflow(
        &self,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ComfyUIApiError>;

    /// Fetch the full execution history listing.
    async fn get_history(&self) -> Result<serde_json::Value, ComfyUIApiError>;

    /// Download the raw bytes of a produced output file.
    async fn view(&self, file: &OutputFile) -> Result<Vec<u8>, ComfyUIApiError>;
}

/// Connection settings for a ComfyUI-Connect instance.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base HTTP URL, e.g. `http://host:8188`.
    pub base_url: String,
    /// Name of the Connect workflow to run, e.g. `api-video`.
    pub workflow: String,
    /// Optional bearer token sent with every request.
    pub api_token: Option<String>,
    /// Timeout for the submission request.
    pub submit_timeout: Duration,
}

/// HTTP client for a single ComfyUI-Connect instance.
pub struct ComfyUIConnectApi {
    client: reqwest::Client,
    config: ApiConfig,
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A 2xx response whose body is not valid JSON.
    #[error("Failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ComfyUIConnectApi {
    /// Create a new API client for a ComfyUI-Connect instance.
    pub fn new(config: ApiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (useful for connection pooling across multiple instances).
    pub fn with_client(client: reqwest::Client, config: ApiConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// URL of the Connect workflow endpoint.
    pub fn workflow_url(&self) -> String {
        format!(
            "{}/api/connect/workflows/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.workflow
        )
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body.
    ///
    /// The body is read in full before decoding so that a malformed body
    /// surfaces as [`ComfyUIApiError::Decode`] rather than a transport error.
    async fn parse_json(response: reqwest::Response) -> Result<serde_json::Value, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl WorkflowBackend for ComfyUIConnectApi {
    /// Sends `POST /api/connect/workflows/{workflow}` with the long
    /// submission timeout.
    async fn submit_workflow(
        &self,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ComfyUIApiError> {
        let response = self
            .authorize(self.client.post(self.workflow_url()))
            .timeout(self.config.submit_timeout)
            .json(body)
            .send()
            .await?;

        Self::parse_json(response).await
    }

    /// Sends `GET /history`.
    async fn get_history(&self) -> Result<serde_json::Value, ComfyUIApiError> {
        let response = self
            .authorize(self.client.get(self.url("/history")))
            .timeout(READ_TIMEOUT)
            .send()
            .await?;

        Self::parse_json(response).await
    }

    /// Sends `GET /view?filename=..&type=..&subfolder=..`.
    async fn view(&self, file: &OutputFile) -> Result<Vec<u8>, ComfyUIApiError> {
        let response = self
            .authorize(self.client.get(self.url("/view")))
            .query(&[
                ("filename", file.filename.as_str()),
                ("type", file.folder_type.as_str()),
                ("subfolder", file.subfolder.as_str()),
            ])
            .timeout(READ_TIMEOUT)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}
