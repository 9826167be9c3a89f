//! `clipforge-worker` -- runs image-to-video jobs for local files.
//!
//! Each input image is submitted to the configured ComfyUI-Connect
//! workflow concurrently once every input has been read; results are
//! written next to each other in the output directory. Pipeline settings
//! come from the variables documented on `PipelineConfig::from_env`.
//!
//! # Environment variables
//!
//! | Variable       | Required | Default | Description                         |
//! |----------------|----------|---------|-------------------------------------|
//! | `INPUT_IMAGES` | yes      | --      | Comma-separated image paths         |
//! | `OUTPUT_DIR`   | no       | `.`     | Where `<index>_<image stem>.mp4` is written |
//! | `USER_ID`      | no       | `0`     | Requester id used in job tokens     |

mod sink;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clipforge_comfyui::api::ComfyUIConnectApi;
use clipforge_core::types::UserId;
use clipforge_pipeline::config::PipelineConfig;
use clipforge_pipeline::orchestrator::{JobRequest, Orchestrator};

use sink::FileSink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "clipforge_worker=info,clipforge_pipeline=info,clipforge_comfyui=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PipelineConfig::from_env().context("Invalid pipeline configuration")?;

    let inputs: Vec<PathBuf> = std::env::var("INPUT_IMAGES")
        .context("INPUT_IMAGES environment variable is required")?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect();
    anyhow::ensure!(!inputs.is_empty(), "INPUT_IMAGES lists no files");

    let output_dir = PathBuf::from(std::env::var("OUTPUT_DIR").unwrap_or_else(|_| ".".into()));
    let user_id: UserId = match std::env::var("USER_ID") {
        Ok(raw) => raw.parse().context("USER_ID must be a valid integer")?,
        Err(_) => 0,
    };

    tracing::info!(
        base_url = %config.api.base_url,
        workflow = %config.api.workflow,
        jobs = inputs.len(),
        "Starting clipforge-worker",
    );

    let api = Arc::new(ComfyUIConnectApi::new(config.api.clone()));
    let orchestrator = Arc::new(Orchestrator::new(api, &config));

    let images = read_inputs(&inputs).await?;

    let mut handles = Vec::with_capacity(inputs.len());
    for (index, (input, image_bytes)) in inputs.iter().zip(images).enumerate() {
        let sink = Arc::new(FileSink::new(
            input.display().to_string(),
            output_path(&output_dir, input, index),
        ));
        let orchestrator = Arc::clone(&orchestrator);
        handles.push(tokio::spawn(async move {
            orchestrator
                .run_job(JobRequest { user_id, image_bytes }, sink)
                .await
        }));
    }

    let mut failed = 0usize;
    for handle in handles {
        let outcome = handle.await.context("Job task panicked")?;
        if !outcome.is_success() {
            failed += 1;
        }
    }

    tracing::info!(stats = %orchestrator.stats_text().await, "All jobs finished");
    anyhow::ensure!(failed == 0, "{failed} job(s) failed");
    Ok(())
}

/// Read every input before any job starts, so a bad path aborts cleanly.
async fn read_inputs(inputs: &[PathBuf]) -> anyhow::Result<Vec<Vec<u8>>> {
    let mut images = Vec::with_capacity(inputs.len());
    for input in inputs {
        let image_bytes = tokio::fs::read(input)
            .await
            .with_context(|| format!("Failed to read {}", input.display()))?;
        images.push(image_bytes);
    }
    Ok(images)
}

/// `<dir>/<index>_<stem>.mp4`; the index keeps same-named inputs apart.
fn output_path(dir: &Path, input: &Path, index: usize) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".into());
    dir.join(format!("{index}_{stem}.mp4"))
}
