//! Per-job state machine: submit, wait for the result while reporting
//! progress, record the duration and hand the outcome to the sink.
//!
//! ```text
//! Submitting ──► AwaitingResult ──► Finalizing ──► Done
//!     │                │
//!     └────────────────┴──► Failed(reason)
//! ```
//!
//! Every job ends in `Done` or `Failed`, and exactly one of
//! [`JobSink::deliver_result`] / [`JobSink::deliver_error`] is called.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use clipforge_comfyui::api::WorkflowBackend;
use clipforge_comfyui::payload::InlineExtractor;
use clipforge_comfyui::resolver::{ResolveError, ResultResolver};
use clipforge_comfyui::submission::{JobSubmitter, SubmissionResult};
use clipforge_core::correlation::{CorrelationToken, TokenIssuer};
use clipforge_core::format::format_duration;
use clipforge_core::types::{Timestamp, UserId};

use crate::config::PipelineConfig;
use crate::duration::{DurationSummary, DurationTracker};
use crate::progress;
use crate::sink::{push_progress, JobSink};
use crate::stats;

/// Status shown while the submission request is in flight.
pub const SUBMITTING_TEXT: &str = "📤 Sending to server...";

/// Lifecycle of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Submitting,
    AwaitingResult,
    Finalizing,
    Done,
    Failed(ResolveError),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed(_))
    }
}

/// What the chat layer hands over for a new job.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub user_id: UserId,
    pub image_bytes: Vec<u8>,
}

/// An accepted job. Immutable once created.
#[derive(Debug, Clone)]
pub struct Job {
    pub correlation_token: CorrelationToken,
    pub submitted_at: Timestamp,
    pub image_bytes: Vec<u8>,
}

/// Final report for one job.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub correlation_token: CorrelationToken,
    /// Always terminal.
    pub state: JobState,
    pub elapsed: Duration,
    /// Every state the job passed through, in order, ending with `state`.
    pub transitions: Vec<JobState>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.state == JobState::Done
    }
}

/// Runs jobs end to end. Shared by all concurrent jobs.
pub struct Orchestrator {
    issuer: TokenIssuer,
    submitter: JobSubmitter,
    resolver: ResultResolver,
    tracker: Arc<DurationTracker>,
    progress_interval: Duration,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn WorkflowBackend>, config: &PipelineConfig) -> Self {
        let extractor = InlineExtractor::new(config.metadata_keys.iter().cloned());
        Self {
            issuer: TokenIssuer::new(config.token_prefix.clone()),
            submitter: JobSubmitter::new(backend.clone(), config.image_node.clone(), extractor),
            resolver: ResultResolver::new(backend, config.resolver.clone()),
            tracker: Arc::new(DurationTracker::new(config.history_capacity)),
            progress_interval: config.progress_interval,
        }
    }

    pub fn tracker(&self) -> &Arc<DurationTracker> {
        &self.tracker
    }

    pub async fn summary(&self) -> DurationSummary {
        self.tracker.summary().await
    }

    pub async fn stats_text(&self) -> String {
        stats::stats_text(&self.summary().await)
    }

    pub async fn welcome_text(&self) -> String {
        stats::welcome_text(&self.summary().await)
    }

    /// Accept a request and assign it a fresh correlation token.
    pub fn create_job(&self, request: JobRequest) -> Job {
        let submitted_at = Utc::now();
        Job {
            correlation_token: self.issuer.issue(request.user_id, submitted_at),
            submitted_at,
            image_bytes: request.image_bytes,
        }
    }

    /// Run one job to completion.
    pub async fn run_job(&self, request: JobRequest, sink: Arc<dyn JobSink>) -> JobOutcome {
        let job = self.create_job(request);
        self.run(job, sink).await
    }

    /// Run an already created job to completion.
    pub async fn run(&self, job: Job, sink: Arc<dyn JobSink>) -> JobOutcome {
        let started = Instant::now();
        let token = job.correlation_token;
        let mut transitions = vec![JobState::Submitting];

        tracing::info!(
            correlation_token = %token,
            submitted_at = %job.submitted_at,
            image_len = job.image_bytes.len(),
            "Job started",
        );

        push_progress(sink.as_ref(), SUBMITTING_TEXT).await;
        let submission = self.submitter.submit(&job.image_bytes, &token).await;

        if let SubmissionResult::SubmissionFailed(reason) = submission {
            let error = ResolveError::SubmissionFailed(reason);
            return self
                .fail(token, error, started, transitions, sink.as_ref())
                .await;
        }

        transitions.push(JobState::AwaitingResult);
        tracing::info!(correlation_token = %token, "Awaiting result");

        let reporter = progress::run(
            token.clone(),
            Arc::clone(&self.tracker),
            Arc::clone(&sink),
            self.progress_interval,
            started,
        );
        let result = self.resolver.resolve(submission, &token).await;
        let shown = reporter.stop().await;
        tracing::debug!(correlation_token = %token, shown, "Progress reporter stopped");

        match result {
            Ok(bytes) => {
                transitions.push(JobState::Finalizing);
                let elapsed = started.elapsed();
                self.tracker.record(elapsed.as_secs_f64()).await;

                push_progress(sink.as_ref(), &success_text(elapsed)).await;
                if let Err(e) = sink.deliver_result(bytes).await {
                    tracing::error!(correlation_token = %token, error = %e, "Failed to deliver result");
                }

                transitions.push(JobState::Done);
                tracing::info!(
                    correlation_token = %token,
                    elapsed_secs = elapsed.as_secs_f64(),
                    "Job completed",
                );
                JobOutcome {
                    correlation_token: token,
                    state: JobState::Done,
                    elapsed,
                    transitions,
                }
            }
            Err(error) => {
                self.fail(token, error, started, transitions, sink.as_ref())
                    .await
            }
        }
    }

    async fn fail(
        &self,
        token: CorrelationToken,
        error: ResolveError,
        started: Instant,
        mut transitions: Vec<JobState>,
        sink: &dyn JobSink,
    ) -> JobOutcome {
        let elapsed = started.elapsed();
        tracing::error!(
            correlation_token = %token,
            error = %error,
            elapsed_secs = elapsed.as_secs_f64(),
            "Job failed",
        );

        if let Err(e) = sink.deliver_error(&failure_text(&error, elapsed)).await {
            tracing::error!(correlation_token = %token, error = %e, "Failed to deliver error");
        }

        let state = JobState::Failed(error);
        transitions.push(state.clone());
        JobOutcome {
            correlation_token: token,
            state,
            elapsed,
            transitions,
        }
    }
}

/// Final status text for a finished job.
pub fn success_text(elapsed: Duration) -> String {
    format!("✅ Done in {}!", format_duration(elapsed.as_secs_f64()))
}

/// Message delivered to the user when a job fails.
pub fn failure_text(error: &ResolveError, elapsed: Duration) -> String {
    format!(
        "❌ {error}\n⏱ Time: {}\n\nPlease try again later.",
        format_duration(elapsed.as_secs_f64())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_text_reports_total_time() {
        assert_eq!(success_text(Duration::from_secs(125)), "✅ Done in 2m 5s!");
    }

    #[test]
    fn failure_text_includes_reason_and_time() {
        let text = failure_text(&ResolveError::FetchError("404".into()), Duration::from_secs(12));
        assert!(text.starts_with("❌ Failed to fetch result: 404"), "{text}");
        assert!(text.contains("⏱ Time: 12s"));
    }

    #[test]
    fn only_done_and_failed_are_terminal() {
        assert!(!JobState::Submitting.is_terminal());
        assert!(!JobState::AwaitingResult.is_terminal());
        assert!(!JobState::Finalizing.is_terminal());
        assert!(JobState::Done.is_terminal());
        assert!(JobState::Failed(ResolveError::SubmissionFailed("x".into())).is_terminal());
    }
}
