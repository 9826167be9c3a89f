//! Human-readable duration formatting for status messages.

/// Seconds per minute (60.0).
pub const SECS_PER_MINUTE: f64 = 60.0;
/// Seconds per hour (3600.0).
pub const SECS_PER_HOUR: f64 = 3600.0;

/// Format a duration in seconds as `45s`, `2m 5s` or `1h 3m`.
///
/// Fractional seconds are truncated. Negative and non-finite inputs are
/// rendered as `0s`.
pub fn format_duration(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };

    if seconds < SECS_PER_MINUTE {
        format!("{}s", seconds as u64)
    } else if seconds < SECS_PER_HOUR {
        let minutes = (seconds / SECS_PER_MINUTE) as u64;
        let secs = (seconds % SECS_PER_MINUTE) as u64;
        format!("{minutes}m {secs}s")
    } else {
        let hours = (seconds / SECS_PER_HOUR) as u64;
        let minutes = ((seconds % SECS_PER_HOUR) / SECS_PER_MINUTE) as u64;
        format!("{hours}h {minutes}m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_only() {
        assert_eq!(format_duration(0.0), "0s");
        assert_eq!(format_duration(45.9), "45s");
    }

    #[test]
    fn minutes_and_seconds() {
        assert_eq!(format_duration(60.0), "1m 0s");
        assert_eq!(format_duration(125.0), "2m 5s");
    }

    #[test]
    fn hours_and_minutes() {
        assert_eq!(format_duration(3600.0), "1h 0m");
        assert_eq!(format_duration(3780.0), "1h 3m");
    }

    #[test]
    fn negative_and_nan_clamp_to_zero() {
        assert_eq!(format_duration(-5.0), "0s");
        assert_eq!(format_duration(f64::NAN), "0s");
    }
}
