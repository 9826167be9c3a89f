//! Turning a submission into the final result bytes.
//!
//! The inline path decodes a result straight out of the submission
//! response. When that is absent or unusable the resolver polls the
//! instance history on a fixed interval, looking only for the entry that
//! carries this job's correlation token, until a deadline passes.
//!
//! Many resolvers may poll the same history at once. Each filters by its
//! own token and shares no state with the others.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use clipforge_core::correlation::CorrelationToken;

use crate::api::WorkflowBackend;
use crate::history::{find_job_output, HistoryMatch, OutputFile};
use crate::payload::{decode_payload, InlinePayload};
use crate::submission::SubmissionResult;

/// Default delay between history polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Default time allowed for the polling fallback.
pub const DEFAULT_POLL_DEADLINE: Duration = Duration::from_secs(60);

/// Tunable parameters for the polling fallback.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Delay between history polls.
    pub poll_interval: Duration,
    /// Total time allowed for polling, measured from its first query.
    pub deadline: Duration,
    /// Give up after this many history failures in a row. `None` keeps
    /// polling through failures until the deadline.
    pub max_consecutive_errors: Option<u32>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            deadline: DEFAULT_POLL_DEADLINE,
            max_consecutive_errors: None,
        }
    }
}

/// Terminal failures of result resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// The submission itself failed; nothing to resolve.
    #[error("Submission failed: {0}")]
    SubmissionFailed(String),

    /// No matching history entry appeared before the deadline.
    #[error("Timed out after {}s waiting for the result", .waited.as_secs())]
    Timeout { waited: Duration },

    /// The matched output could not be downloaded.
    #[error("Failed to fetch result: {0}")]
    FetchError(String),

    /// History queries kept failing.
    #[error("History unavailable after {attempts} consecutive failures")]
    HistoryUnavailable { attempts: u32 },
}

/// Resolves one submission to its result bytes.
pub struct ResultResolver {
    backend: Arc<dyn WorkflowBackend>,
    config: ResolverConfig,
}

impl ResultResolver {
    pub fn new(backend: Arc<dyn WorkflowBackend>, config: ResolverConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve `submission` for the job identified by `token`, using the
    /// configured polling deadline.
    pub async fn resolve(
        &self,
        submission: SubmissionResult,
        token: &CorrelationToken,
    ) -> Result<Vec<u8>, ResolveError> {
        self.resolve_within(submission, token, self.config.deadline)
            .await
    }

    /// Resolve `submission` with an explicit polling deadline.
    pub async fn resolve_within(
        &self,
        submission: SubmissionResult,
        token: &CorrelationToken,
        deadline: Duration,
    ) -> Result<Vec<u8>, ResolveError> {
        match submission {
            SubmissionResult::SubmissionFailed(reason) => {
                Err(ResolveError::SubmissionFailed(reason))
            }
            SubmissionResult::InlineResult(payload) => match try_inline(&payload, token) {
                Some(bytes) => Ok(bytes),
                None => {
                    tracing::info!(
                        correlation_token = %token,
                        "Inline result unusable, falling back to history",
                    );
                    self.poll_history(token, deadline).await
                }
            },
            SubmissionResult::NeedsPolling => self.poll_history(token, deadline).await,
        }
    }

    /// Poll the history until this job's output appears or `deadline`
    /// elapses.
    ///
    /// Failed history queries are absorbed. Once the job's output is
    /// found, a single download is attempted and its failure is final.
    pub async fn poll_history(
        &self,
        token: &CorrelationToken,
        deadline: Duration,
    ) -> Result<Vec<u8>, ResolveError> {
        let started = Instant::now();
        let deadline_at = started + deadline;
        let mut attempt = 0u32;
        let mut consecutive_errors = 0u32;

        tracing::info!(
            correlation_token = %token,
            deadline_secs = deadline.as_secs(),
            "Polling history for result",
        );

        loop {
            attempt += 1;

            match tokio::time::timeout_at(deadline_at, self.backend.get_history()).await {
                Ok(Ok(history)) => match find_job_output(&history, token) {
                    Ok(HistoryMatch::Completed { prompt_id, output }) => {
                        tracing::info!(
                            correlation_token = %token,
                            prompt_id = %prompt_id,
                            filename = %output.filename,
                            attempt,
                            "Found job output in history",
                        );
                        return self.fetch_output(&output, token).await;
                    }
                    Ok(HistoryMatch::Pending { prompt_id }) => {
                        consecutive_errors = 0;
                        tracing::debug!(
                            correlation_token = %token,
                            prompt_id = %prompt_id,
                            attempt,
                            "Job found in history, outputs not ready",
                        );
                    }
                    Ok(HistoryMatch::NotFound) => {
                        consecutive_errors = 0;
                        tracing::debug!(correlation_token = %token, attempt, "Job not in history yet");
                    }
                    Err(e) => {
                        consecutive_errors += 1;
                        tracing::warn!(correlation_token = %token, attempt, error = %e, "Unusable history response");
                    }
                },
                Ok(Err(e)) => {
                    consecutive_errors += 1;
                    tracing::warn!(correlation_token = %token, attempt, error = %e, "History query failed");
                }
                Err(_) => {
                    tracing::warn!(correlation_token = %token, attempt, "History query outlived the deadline");
                }
            }

            if let Some(max) = self.config.max_consecutive_errors {
                if consecutive_errors >= max {
                    tracing::error!(correlation_token = %token, attempts = consecutive_errors, "Giving up on history");
                    return Err(ResolveError::HistoryUnavailable {
                        attempts: consecutive_errors,
                    });
                }
            }

            let now = Instant::now();
            if now >= deadline_at {
                tracing::error!(correlation_token = %token, attempt, "No result before deadline");
                return Err(ResolveError::Timeout {
                    waited: now - started,
                });
            }

            tokio::time::sleep_until((now + self.config.poll_interval).min(deadline_at)).await;
        }
    }

    async fn fetch_output(
        &self,
        output: &OutputFile,
        token: &CorrelationToken,
    ) -> Result<Vec<u8>, ResolveError> {
        let bytes = self
            .backend
            .view(output)
            .await
            .map_err(|e| ResolveError::FetchError(e.to_string()))?;

        if bytes.is_empty() {
            return Err(ResolveError::FetchError(format!(
                "'{}' is empty",
                output.filename
            )));
        }

        tracing::info!(correlation_token = %token, len = bytes.len(), "Downloaded job output");
        Ok(bytes)
    }
}

/// Decode the first usable inline candidate.
fn try_inline(payload: &InlinePayload, token: &CorrelationToken) -> Option<Vec<u8>> {
    payload
        .candidates
        .iter()
        .find_map(|locator| match decode_payload(locator) {
            Ok(bytes) => {
                tracing::info!(
                    correlation_token = %token,
                    path = %locator.path,
                    len = bytes.len(),
                    "Using inline result",
                );
                Some(bytes)
            }
            Err(e) => {
                tracing::debug!(correlation_token = %token, error = %e, "Skipping inline candidate");
                None
            }
        })
}
