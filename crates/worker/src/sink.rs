//! Local stand-in for the chat surface: status text goes to the log,
//! the finished video goes to disk.

use std::path::PathBuf;

use async_trait::async_trait;

use clipforge_pipeline::sink::{JobSink, SinkError};

pub struct FileSink {
    label: String,
    output_path: PathBuf,
}

impl FileSink {
    pub fn new(label: impl Into<String>, output_path: PathBuf) -> Self {
        Self {
            label: label.into(),
            output_path,
        }
    }
}

#[async_trait]
impl JobSink for FileSink {
    async fn update_progress(&self, text: &str) -> Result<(), SinkError> {
        let status = text.lines().find(|l| !l.trim().is_empty()).unwrap_or(text);
        tracing::info!(job = %self.label, status, "Progress");
        Ok(())
    }

    async fn deliver_result(&self, payload: Vec<u8>) -> Result<(), SinkError> {
        tokio::fs::write(&self.output_path, &payload)
            .await
            .map_err(|e| SinkError::Other(e.to_string()))?;
        tracing::info!(
            job = %self.label,
            path = %self.output_path.display(),
            size = payload.len(),
            "Video written",
        );
        Ok(())
    }

    async fn deliver_error(&self, message: &str) -> Result<(), SinkError> {
        tracing::error!(job = %self.label, message, "Job failed");
        Ok(())
    }
}
