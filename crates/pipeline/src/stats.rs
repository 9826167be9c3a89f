//! User-facing texts built from the duration history.

use clipforge_core::format::format_duration;

use crate::duration::{DurationSummary, RECENT_WINDOW};

/// Shown when no job has completed yet.
pub const EMPTY_STATS_TEXT: &str = "📊 No statistics yet.\nSend a photo to get started!";

/// Processing statistics for a `/stats`-style request.
pub fn stats_text(summary: &DurationSummary) -> String {
    if summary.is_empty() {
        return EMPTY_STATS_TEXT.to_string();
    }

    format!(
        "📊 Processing statistics ({} videos):\n\n\
         ⚡ Fastest: {}\n\
         📈 Average: {}\n\
         🐌 Slowest: {}\n\
         🔄 Last {RECENT_WINDOW}: {}",
        summary.count,
        format_duration(summary.min),
        format_duration(summary.avg),
        format_duration(summary.max),
        format_duration(summary.recent_avg),
    )
}

/// Greeting for new users, mentioning the typical wait once known.
pub fn welcome_text(summary: &DurationSummary) -> String {
    let average = if summary.is_empty() {
        String::new()
    } else {
        format!("\n\n📊 Average time: {}", format_duration(summary.recent_avg))
    };

    format!(
        "👋 Hi! I turn photos into videos.\n\n\
         📸 Just send any image and I will animate it!{average}\n\n\
         💡 /stats shows processing statistics"
    )
}
