//! Formatting utilities for countdown and score display.

/// Format remaining milliseconds as `M:SS`, rounding up to the next second.
///
/// Rounding up keeps `0:00` for the instant the deadline actually passes.
pub fn format_countdown(ms: u64) -> String {
    let secs = ms.div_ceil(1000);
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Format a score delta as `+N`.
pub fn format_delta(delta: u64) -> String {
    format!("+{}", delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_countdown_seconds() {
        assert_eq!(format_countdown(5000), "0:05");
    }

    #[test]
    fn test_format_countdown_rounds_up() {
        assert_eq!(format_countdown(9_001), "0:10");
        assert_eq!(format_countdown(1), "0:01");
    }

    #[test]
    fn test_format_countdown_minutes() {
        assert_eq!(format_countdown(135_000), "2:15");
    }

    #[test]
    fn test_format_countdown_zero() {
        assert_eq!(format_countdown(0), "0:00");
    }

    #[test]
    fn test_format_delta() {
        assert_eq!(format_delta(0), "+0");
        assert_eq!(format_delta(1500), "+1500");
    }
}
