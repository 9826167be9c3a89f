//! Rolling job-duration history and remaining-time estimation.
//!
//! The tracker keeps the last [`DEFAULT_HISTORY_CAPACITY`] completed-job
//! durations and estimates how long a running job has left as the plain
//! mean of those samples minus the time already spent. It is the only
//! state shared between concurrently running jobs.

use std::collections::VecDeque;

use tokio::sync::RwLock;

/// Number of samples kept before the oldest is evicted.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Number of most recent samples behind [`DurationSummary::recent_avg`].
pub const RECENT_WINDOW: usize = 10;

/// Read-only snapshot of the duration history.
///
/// All values are in seconds and are zero when the history is empty.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct DurationSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    /// Mean of the last [`RECENT_WINDOW`] samples.
    pub recent_avg: f64,
}

impl DurationSummary {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Bounded FIFO of completed-job durations, safe to share across jobs.
#[derive(Debug)]
pub struct DurationTracker {
    samples: RwLock<VecDeque<f64>>,
    capacity: usize,
}

impl DurationTracker {
    /// Create a tracker keeping at most `capacity` samples (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record the duration of a successfully completed job.
    ///
    /// Append and eviction happen under one write lock, so concurrent
    /// completions never leave the history over capacity. Negative or
    /// non-finite durations are dropped.
    pub async fn record(&self, duration_secs: f64) {
        if !duration_secs.is_finite() || duration_secs < 0.0 {
            tracing::warn!(duration_secs, "Ignoring invalid duration sample");
            return;
        }

        let mut samples = self.samples.write().await;
        samples.push_back(duration_secs);
        while samples.len() > self.capacity {
            samples.pop_front();
        }
        tracing::debug!(duration_secs, count = samples.len(), "Recorded job duration");
    }

    /// Mean of all recorded durations, or `None` when there are none.
    pub async fn average(&self) -> Option<f64> {
        mean(self.samples.read().await.iter().copied())
    }

    /// Estimated seconds left for a job that has been running `elapsed`
    /// seconds: `max(0, mean - elapsed)`, or `None` with no history.
    pub async fn estimate_remaining(&self, elapsed_secs: f64) -> Option<f64> {
        self.average()
            .await
            .map(|avg| (avg - elapsed_secs).max(0.0))
    }

    pub async fn summary(&self) -> DurationSummary {
        let samples = self.samples.read().await;
        if samples.is_empty() {
            return DurationSummary {
                count: 0,
                min: 0.0,
                max: 0.0,
                avg: 0.0,
                recent_avg: 0.0,
            };
        }

        let skip = samples.len().saturating_sub(RECENT_WINDOW);
        DurationSummary {
            count: samples.len(),
            min: samples.iter().copied().fold(f64::INFINITY, f64::min),
            max: samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            avg: mean(samples.iter().copied()).unwrap_or(0.0),
            recent_avg: mean(samples.iter().skip(skip).copied()).unwrap_or(0.0),
        }
    }

    /// Recorded durations, oldest first.
    pub async fn samples(&self) -> Vec<f64> {
        self.samples.read().await.iter().copied().collect()
    }
}

impl Default for DurationTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}
