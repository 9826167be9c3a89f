//! Job submission to the Connect workflow endpoint.
//!
//! The submitter encodes the image, names the upload after the job's
//! correlation token, sends it once, and classifies the response into a
//! [`SubmissionResult`]. It never retries; that decision belongs to the
//! caller.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;

use clipforge_core::correlation::CorrelationToken;

use crate::api::{ComfyUIApiError, WorkflowBackend};
use crate::payload::{InlineExtractor, InlinePayload};

/// Default name of the workflow node that receives the uploaded image.
pub const DEFAULT_IMAGE_NODE: &str = "image";

/// How a submission turned out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionResult {
    /// The response already carries result candidates.
    InlineResult(InlinePayload),
    /// Accepted, but the result must be fetched through history.
    NeedsPolling,
    /// The request failed outright (network error or non-2xx status).
    SubmissionFailed(String),
}

/// Build the Connect request body for one job.
///
/// ```json
/// {
///   "<image_node>": {"image": {"type": "file", "content": "<base64>", "name": "input_<token>.jpg"}},
///   "client_id": "<token>"
/// }
/// ```
pub fn build_submission_body(
    image_node: &str,
    image_bytes: &[u8],
    token: &CorrelationToken,
) -> Value {
    let mut body = serde_json::Map::new();
    body.insert(
        image_node.to_string(),
        serde_json::json!({
            "image": {
                "type": "file",
                "content": STANDARD.encode(image_bytes),
                "name": token.input_filename(),
            }
        }),
    );
    body.insert("client_id".to_string(), Value::String(token.to_string()));
    Value::Object(body)
}

/// Sends job-creation requests to the remote workflow service.
pub struct JobSubmitter {
    backend: Arc<dyn WorkflowBackend>,
    image_node: String,
    extractor: InlineExtractor,
}

impl JobSubmitter {
    pub fn new(
        backend: Arc<dyn WorkflowBackend>,
        image_node: impl Into<String>,
        extractor: InlineExtractor,
    ) -> Self {
        Self {
            backend,
            image_node: image_node.into(),
            extractor,
        }
    }

    /// Submit `image_bytes` for the job identified by `token`.
    pub async fn submit(&self, image_bytes: &[u8], token: &CorrelationToken) -> SubmissionResult {
        let body = build_submission_body(&self.image_node, image_bytes, token);

        tracing::info!(
            correlation_token = %token,
            image_len = image_bytes.len(),
            "Submitting workflow",
        );

        match self.backend.submit_workflow(&body).await {
            Ok(response) => self.classify(&response, token),
            Err(ComfyUIApiError::Decode(e)) => {
                tracing::warn!(
                    correlation_token = %token,
                    error = %e,
                    "Submission accepted with undecodable body, falling back to history",
                );
                SubmissionResult::NeedsPolling
            }
            Err(e) => {
                tracing::error!(correlation_token = %token, error = %e, "Submission failed");
                SubmissionResult::SubmissionFailed(e.to_string())
            }
        }
    }

    fn classify(&self, response: &Value, token: &CorrelationToken) -> SubmissionResult {
        log_response_shape(response, token);

        match self.extractor.locate(response) {
            Some(payload) => {
                tracing::info!(
                    correlation_token = %token,
                    candidates = payload.candidates.len(),
                    "Submission response carries inline result",
                );
                SubmissionResult::InlineResult(payload)
            }
            None => {
                tracing::info!(
                    correlation_token = %token,
                    "No inline result in submission response",
                );
                SubmissionResult::NeedsPolling
            }
        }
    }
}

/// Log each top-level key with a short description of its value.
fn log_response_shape(response: &Value, token: &CorrelationToken) {
    let Some(object) = response.as_object() else {
        tracing::debug!(correlation_token = %token, "Submission response is not an object");
        return;
    };

    for (key, value) in object {
        let shape = match value {
            Value::String(s) => format!("string len={}", s.len()),
            Value::Array(items) => format!("list items={}", items.len()),
            Value::Object(map) => format!("object keys={:?}", map.keys().collect::<Vec<_>>()),
            other => other.to_string(),
        };
        tracing::debug!(correlation_token = %token, key = %key, shape = %shape, "Response field");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_names_upload_after_token() {
        let token = CorrelationToken::from_raw("telegram_42_1700000000");
        let body = build_submission_body("image", b"jpeg-bytes", &token);

        assert_eq!(body["client_id"], "telegram_42_1700000000");
        assert_eq!(body["image"]["image"]["type"], "file");
        assert_eq!(body["image"]["image"]["name"], "input_telegram_42_1700000000.jpg");
        assert_eq!(body["image"]["image"]["content"], STANDARD.encode(b"jpeg-bytes"));
    }

    #[test]
    fn body_uses_configured_node_name() {
        let token = CorrelationToken::from_raw("telegram_1_1");
        let body = build_submission_body("load-photo", b"x", &token);

        assert!(body.get("image").is_none());
        assert_eq!(body["load-photo"]["image"]["name"], "input_telegram_1_1.jpg");
    }
}
