//! Periodic status updates while a job is waiting for its result.
//!
//! [`run`] spawns a task that, every tick, renders a status line from the
//! elapsed time and the duration estimate and pushes it to the job's
//! sink. The task stops when its [`ProgressHandle`] is stopped or dropped,
//! and once [`ProgressHandle::stop`] returns no further update is sent.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};

use clipforge_core::correlation::CorrelationToken;
use clipforge_core::format::format_duration;

use crate::duration::DurationTracker;
use crate::sink::{push_progress, JobSink};

/// Default delay between status updates.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

/// Spinner animation, one frame per tick.
pub const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Number of cells in the progress bar.
pub const BAR_WIDTH: usize = 20;

/// Width of the sliding block in an indeterminate bar.
const INDETERMINATE_BLOCK: usize = 4;

/// The bar never claims more than this until the result is in.
pub const MAX_KNOWN_FRACTION: f64 = 0.95;

/// Remaining-time text when there is no history to estimate from.
pub const ESTIMATING_TEXT: &str = "estimating…";

/// Label of the waiting phase.
pub const GENERATING_PHASE: &str = "Generating video";

const FILLED: char = '▓';
const EMPTY: char = '░';

/// Per-tick view of one job's progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressState {
    pub elapsed: f64,
    /// Expected total run time, when there is history to go on.
    pub estimated_total: Option<f64>,
    pub frame_index: usize,
}

impl ProgressState {
    pub fn remaining(&self) -> Option<f64> {
        self.estimated_total
            .map(|total| (total - self.elapsed).max(0.0))
    }

    /// Completed fraction, capped at [`MAX_KNOWN_FRACTION`].
    pub fn fraction(&self) -> Option<f64> {
        self.estimated_total.map(|total| {
            if total <= 0.0 {
                MAX_KNOWN_FRACTION
            } else {
                (self.elapsed / total).clamp(0.0, MAX_KNOWN_FRACTION)
            }
        })
    }

    pub fn spinner(&self) -> &'static str {
        SPINNER_FRAMES[self.frame_index % SPINNER_FRAMES.len()]
    }
}

/// Render the multi-line status text for `state`.
pub fn render_status(state: &ProgressState, phase: &str) -> String {
    let (bar, remaining) = match (state.fraction(), state.remaining()) {
        (Some(fraction), Some(remaining)) => (
            format!("[{}] {}%", determinate_bar(fraction), (fraction * 100.0) as u32),
            format!("~{}", format_duration(remaining)),
        ),
        _ => (
            format!("[{}]", indeterminate_bar(state.frame_index)),
            ESTIMATING_TEXT.to_string(),
        ),
    };

    format!(
        "{} {phase}...\n\n📊 {bar}\n⏱ Elapsed: {}\n🎯 Remaining: {remaining}",
        state.spinner(),
        format_duration(state.elapsed),
    )
}

fn determinate_bar(fraction: f64) -> String {
    let filled = ((fraction * BAR_WIDTH as f64) as usize).min(BAR_WIDTH);
    std::iter::repeat(FILLED)
        .take(filled)
        .chain(std::iter::repeat(EMPTY).take(BAR_WIDTH - filled))
        .collect()
}

/// A block of [`INDETERMINATE_BLOCK`] cells that slides one cell per
/// frame and wraps around.
fn indeterminate_bar(frame_index: usize) -> String {
    let start = frame_index % BAR_WIDTH;
    (0..BAR_WIDTH)
        .map(|cell| {
            if (cell + BAR_WIDTH - start) % BAR_WIDTH < INDETERMINATE_BLOCK {
                FILLED
            } else {
                EMPTY
            }
        })
        .collect()
}

/// Handle to a running progress task.
///
/// Dropping the handle cancels the task, so a job abandoned mid-wait
/// stops reporting.
pub struct ProgressHandle {
    cancel: CancellationToken,
    _guard: DropGuard,
    task: tokio::task::JoinHandle<usize>,
}

impl ProgressHandle {
    /// Stop the task and wait for it to exit.
    ///
    /// Returns how many updates were shown. After this returns the task
    /// has finished, so it cannot overwrite anything sent afterwards.
    pub async fn stop(self) -> usize {
        self.cancel.cancel();
        match self.task.await {
            Ok(shown) => shown,
            Err(e) => {
                tracing::error!(error = %e, "Progress task panicked");
                0
            }
        }
    }
}

/// Start reporting progress for the job identified by `token`.
///
/// The first update goes out one `interval` after the call; `started_at`
/// is when the job began, so elapsed time includes submission.
pub fn run(
    token: CorrelationToken,
    tracker: Arc<DurationTracker>,
    sink: Arc<dyn JobSink>,
    interval: Duration,
    started_at: Instant,
) -> ProgressHandle {
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();
    let guard = cancel.clone().drop_guard();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut frame_index = 0usize;
        let mut shown = 0usize;

        loop {
            tokio::select! {
                biased;
                _ = task_cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let elapsed = started_at.elapsed().as_secs_f64();
            let remaining = tracker.estimate_remaining(elapsed).await;
            let state = ProgressState {
                elapsed,
                estimated_total: remaining.map(|r| elapsed + r),
                frame_index,
            };
            frame_index = frame_index.wrapping_add(1);

            let text = render_status(&state, GENERATING_PHASE);

            tokio::select! {
                biased;
                _ = task_cancel.cancelled() => break,
                delivered = push_progress(sink.as_ref(), &text) => {
                    if delivered {
                        shown += 1;
                    }
                }
            }
        }

        tracing::debug!(correlation_token = %token, shown, "Progress reporting stopped");
        shown
    });

    ProgressHandle {
        cancel,
        _guard: guard,
        task,
    }
}
