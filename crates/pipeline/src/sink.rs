//! Outbound surface toward the chat layer.
//!
//! A [`JobSink`] is whatever shows the user their job: typically one
//! editable status message plus a final reply carrying the video. The
//! pipeline only ever talks to it through this trait.

use std::time::Duration;

use async_trait::async_trait;

/// Attempts made by [`push_progress`] before giving up on one update.
pub const MAX_PROGRESS_ATTEMPTS: u32 = 3;

/// Pause between attempts after an unclassified failure.
pub const PROGRESS_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Errors reported by a sink.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The surface asked us to slow down.
    #[error("Rate limited, retry after {}s", .0.as_secs())]
    RateLimited(Duration),

    /// The update was identical to what is already shown.
    #[error("Message is not modified")]
    NotModified,

    /// The status surface was deleted or can no longer be edited.
    #[error("Message can no longer be edited")]
    Gone,

    #[error("Sink error: {0}")]
    Other(String),
}

/// Receives progress text and the final outcome of one job.
#[async_trait]
pub trait JobSink: Send + Sync {
    /// Replace the job's status text in place.
    async fn update_progress(&self, text: &str) -> Result<(), SinkError>;

    /// Hand over the finished video.
    async fn deliver_result(&self, payload: Vec<u8>) -> Result<(), SinkError>;

    /// Tell the user the job failed.
    async fn deliver_error(&self, message: &str) -> Result<(), SinkError>;
}

/// Push a status update on a best-effort basis.
///
/// Rate limits are waited out, an unchanged message counts as delivered
/// and a deleted surface stops immediately. Returns whether the update
/// is now showing. Failures are logged, never returned.
pub async fn push_progress(sink: &dyn JobSink, text: &str) -> bool {
    for attempt in 1..=MAX_PROGRESS_ATTEMPTS {
        match sink.update_progress(text).await {
            Ok(()) | Err(SinkError::NotModified) => return true,
            Err(SinkError::Gone) => {
                tracing::debug!("Status message is gone, skipping update");
                return false;
            }
            Err(SinkError::RateLimited(wait)) => {
                tracing::warn!(attempt, wait_secs = wait.as_secs(), "Progress update rate limited");
                tokio::time::sleep(wait).await;
            }
            Err(e) => {
                tracing::error!(attempt, error = %e, "Failed to update progress");
                if attempt < MAX_PROGRESS_ATTEMPTS {
                    tokio::time::sleep(PROGRESS_RETRY_DELAY).await;
                }
            }
        }
    }
    false
}
