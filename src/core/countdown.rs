//! Countdown rendering
//!
//! Pure mapping from (remaining, total) to what the countdown should look
//! like. Holds no state; callers re-render every frame.

use super::format::format_countdown;

/// How close the deadline is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Calm,
    Warning,
    Critical,
    Expired,
}

/// Fractions at which the countdown changes urgency
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CountdownThresholds {
    /// At or below this fraction the countdown is `Warning`
    pub warning_fraction: f64,
    /// At or below this fraction the countdown is `Critical`
    pub critical_fraction: f64,
}

impl Default for CountdownThresholds {
    fn default() -> Self {
        Self {
            warning_fraction: 0.5,
            critical_fraction: 0.2,
        }
    }
}

/// Visual progress for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct CountdownView {
    pub remaining_ms: u64,
    /// Share of the bar still filled, in `[0, 1]`
    pub fraction: f64,
    /// `M:SS` label
    pub label: String,
    pub urgency: Urgency,
    pub filled_cells: usize,
    pub total_cells: usize,
}

impl CountdownView {
    /// Bar made of `filled` and `empty` cells
    pub fn bar(&self, filled: char, empty: char) -> String {
        let mut bar = String::with_capacity(self.total_cells * filled.len_utf8());
        for i in 0..self.total_cells {
            bar.push(if i < self.filled_cells { filled } else { empty });
        }
        bar
    }
}

/// Render a countdown `width` cells wide
///
/// A non-zero remaining time always fills at least one cell so the bar never
/// looks finished early.
pub fn render_countdown(
    remaining_ms: u64,
    total_ms: u64,
    width: usize,
    thresholds: &CountdownThresholds,
) -> CountdownView {
    let remaining_ms = remaining_ms.min(total_ms);
    let fraction = if total_ms == 0 {
        0.0
    } else {
        (remaining_ms as f64 / total_ms as f64).clamp(0.0, 1.0)
    };

    let filled_cells = if remaining_ms == 0 {
        0
    } else {
        ((fraction * width as f64).ceil() as usize).max(1).min(width)
    };

    let urgency = if remaining_ms == 0 {
        Urgency::Expired
    } else if fraction <= thresholds.critical_fraction {
        Urgency::Critical
    } else if fraction <= thresholds.warning_fraction {
        Urgency::Warning
    } else {
        Urgency::Calm
    };

    CountdownView {
        remaining_ms,
        fraction,
        label: format_countdown(remaining_ms),
        urgency,
        filled_cells,
        total_cells: width,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(remaining: u64, total: u64) -> CountdownView {
        render_countdown(remaining, total, 10, &CountdownThresholds::default())
    }

    #[test]
    fn test_full_countdown() {
        let view = render(10_000, 10_000);
        assert_eq!(view.fraction, 1.0);
        assert_eq!(view.filled_cells, 10);
        assert_eq!(view.urgency, Urgency::Calm);
        assert_eq!(view.label, "0:10");
        assert_eq!(view.bar('#', '.'), "##########");
    }

    #[test]
    fn test_urgency_levels() {
        assert_eq!(render(6_000, 10_000).urgency, Urgency::Calm);
        assert_eq!(render(5_000, 10_000).urgency, Urgency::Warning);
        assert_eq!(render(2_000, 10_000).urgency, Urgency::Critical);
        assert_eq!(render(0, 10_000).urgency, Urgency::Expired);
    }

    #[test]
    fn test_partial_bar_rounds_up() {
        let view = render(4_100, 10_000);
        assert_eq!(view.filled_cells, 5);
        assert_eq!(view.bar('#', '.'), "#####.....");
    }

    #[test]
    fn test_tiny_remaining_keeps_one_cell() {
        let view = render(10, 10_000);
        assert_eq!(view.filled_cells, 1);
        assert_eq!(view.label, "0:01");
    }

    #[test]
    fn test_expired_bar_is_empty() {
        let view = render(0, 10_000);
        assert_eq!(view.filled_cells, 0);
        assert_eq!(view.bar('#', '.'), "..........");
        assert_eq!(view.label, "0:00");
    }

    #[test]
    fn test_zero_total() {
        let view = render(0, 0);
        assert_eq!(view.fraction, 0.0);
        assert_eq!(view.urgency, Urgency::Expired);
    }

    #[test]
    fn test_remaining_above_total_is_clamped() {
        let view = render(20_000, 10_000);
        assert_eq!(view.remaining_ms, 10_000);
        assert_eq!(view.fraction, 1.0);
    }

    #[test]
    fn test_zero_width() {
        let view = render_countdown(5_000, 10_000, 0, &CountdownThresholds::default());
        assert_eq!(view.filled_cells, 0);
        assert_eq!(view.bar('#', '.'), "");
    }
}
