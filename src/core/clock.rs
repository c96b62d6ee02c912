//! Clock reconciliation
//!
//! The local clock is never trusted to agree with the server. Instead, each
//! question captures one [`ClockSample`] pairing the server's epoch time with
//! a local monotonic reading, and every later local reading is translated
//! into an estimated server time relative to that anchor:
//!
//! ```text
//! server_now ≈ sample.server_epoch_ms + (now_local - sample.local_monotonic_ms)
//! ```
//!
//! Drift only accumulates within one question; the next question installs a
//! fresh sample.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use super::types::ActiveQuestion;

// =============================================================================
// MONOTONIC CLOCK
// =============================================================================

/// Source of local monotonic milliseconds
pub trait MonotonicClock {
    /// Milliseconds since an arbitrary fixed origin; never goes backwards
    fn now_ms(&self) -> u64;
}

/// Monotonic clock backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Hand-driven clock for deterministic tests and replays
///
/// Clones share the same reading, so a test can keep one handle while the
/// session owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Rc::new(Cell::new(start_ms)),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }

    /// Set the reading; ignored if it would move backwards
    pub fn set(&self, ms: u64) {
        if ms >= self.now.get() {
            self.now.set(ms);
        }
    }
}

impl MonotonicClock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

// =============================================================================
// CLOCK SAMPLE
// =============================================================================

/// A (server time, local time) pair captured when an event arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSample {
    pub server_epoch_ms: i64,
    pub local_monotonic_ms: u64,
}

impl ClockSample {
    /// Pair `server_epoch_ms` with the clock's current reading
    pub fn capture<C: MonotonicClock + ?Sized>(server_epoch_ms: i64, clock: &C) -> Self {
        Self {
            server_epoch_ms,
            local_monotonic_ms: clock.now_ms(),
        }
    }

    /// Estimated server epoch time at local reading `now_local`
    pub fn estimate_server_now(&self, now_local: u64) -> i64 {
        let elapsed = now_local.saturating_sub(self.local_monotonic_ms);
        self.server_epoch_ms
            .saturating_add(i64::try_from(elapsed).unwrap_or(i64::MAX))
    }
}

// =============================================================================
// RECONCILER
// =============================================================================

/// Countdown state at one local instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Remaining {
    /// Milliseconds until the deadline, clamped to `[0, window]`
    pub remaining_ms: u64,
    /// `remaining_ms / window`, clamped to `[0, 1]`
    pub fraction: f64,
    /// Estimated milliseconds past the deadline (0 while running)
    pub overdue_ms: u64,
}

impl Remaining {
    pub fn is_expired(&self) -> bool {
        self.remaining_ms == 0
    }
}

/// Turns local monotonic readings into remaining time for one question
///
/// Immutable: re-anchoring produces a new reconciler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockReconciler {
    sample: ClockSample,
    ends_at: i64,
    window_ms: i64,
}

impl ClockReconciler {
    /// Reconciler for a freshly issued question
    ///
    /// The window is `ends_at - sample.server_epoch_ms`, which equals the
    /// question's issue window when `sample` comes from its own event.
    pub fn new(sample: ClockSample, question: &ActiveQuestion) -> Self {
        Self {
            sample,
            ends_at: question.ends_at,
            window_ms: question.ends_at.saturating_sub(sample.server_epoch_ms),
        }
    }

    /// Same deadline and window, new anchor
    pub fn reanchor(&self, sample: ClockSample) -> Self {
        Self { sample, ..*self }
    }

    pub fn sample(&self) -> ClockSample {
        self.sample
    }

    pub fn ends_at(&self) -> i64 {
        self.ends_at
    }

    /// Total countdown window in ms (0 for malformed questions)
    pub fn window_ms(&self) -> u64 {
        self.window_ms.max(0) as u64
    }

    pub fn remaining(&self, now_local: u64) -> Remaining {
        let estimated = self.sample.estimate_server_now(now_local);
        let window = self.window_ms();
        let raw = self.ends_at.saturating_sub(estimated);

        let remaining_ms = (raw.max(0) as u64).min(window);
        let overdue_ms = if raw < 0 { raw.unsigned_abs() } else { 0 };
        let fraction = if self.window_ms <= 0 {
            0.0
        } else {
            (remaining_ms as f64 / window as f64).clamp(0.0, 1.0)
        };

        Remaining {
            remaining_ms,
            fraction,
            overdue_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::QuestionPayload;

    fn question(ends_at: i64, server_now: i64) -> ActiveQuestion {
        ActiveQuestion::from_payload(
            QuestionPayload {
                id: "q1".to_string(),
                prompt: String::new(),
                options: vec![],
            },
            ends_at,
            server_now,
        )
    }

    fn reconciler_at(clock: &ManualClock, ends_at: i64, server_now: i64) -> ClockReconciler {
        let q = question(ends_at, server_now);
        ClockReconciler::new(ClockSample::capture(server_now, clock), &q)
    }

    // -------------------------------------------------------------------------
    // Clock tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(100);
        let other = clock.clone();
        clock.advance(50);
        assert_eq!(other.now_ms(), 150);
    }

    #[test]
    fn test_manual_clock_never_goes_backwards() {
        let clock = ManualClock::new(500);
        clock.set(200);
        assert_eq!(clock.now_ms(), 500);
        clock.set(800);
        assert_eq!(clock.now_ms(), 800);
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }

    // -------------------------------------------------------------------------
    // Sample tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_sample_estimates_server_time() {
        let clock = ManualClock::new(5_000);
        let sample = ClockSample::capture(1_700_000_000_000, &clock);
        assert_eq!(sample.local_monotonic_ms, 5_000);
        assert_eq!(sample.estimate_server_now(7_500), 1_700_000_002_500);
    }

    #[test]
    fn test_sample_ignores_reads_before_anchor() {
        let sample = ClockSample {
            server_epoch_ms: 1_000,
            local_monotonic_ms: 500,
        };
        assert_eq!(sample.estimate_server_now(100), 1_000);
    }

    // -------------------------------------------------------------------------
    // Remaining tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_remaining_at_issue_is_full() {
        let clock = ManualClock::new(0);
        let r = reconciler_at(&clock, 10_000, 0).remaining(clock.now_ms());
        assert_eq!(r.remaining_ms, 10_000);
        assert_eq!(r.fraction, 1.0);
        assert_eq!(r.overdue_ms, 0);
        assert!(!r.is_expired());
    }

    #[test]
    fn test_remaining_halfway() {
        let clock = ManualClock::new(1_000);
        let rec = reconciler_at(&clock, 1_700_000_010_000, 1_700_000_000_000);
        clock.advance(5_000);
        let r = rec.remaining(clock.now_ms());
        assert_eq!(r.remaining_ms, 5_000);
        assert!((r.fraction - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_remaining_past_deadline_clamps_to_zero() {
        let clock = ManualClock::new(0);
        let rec = reconciler_at(&clock, 10_000, 0);
        clock.advance(10_500);
        let r = rec.remaining(clock.now_ms());
        assert_eq!(r.remaining_ms, 0);
        assert_eq!(r.fraction, 0.0);
        assert_eq!(r.overdue_ms, 500);
        assert!(r.is_expired());
    }

    #[test]
    fn test_remaining_bounded_by_window() {
        let clock = ManualClock::new(0);
        let rec = reconciler_at(&clock, 8_000, 0);
        for step in 0..20 {
            let r = rec.remaining(clock.now_ms());
            assert!(r.remaining_ms <= 8_000, "step {}", step);
            assert!((0.0..=1.0).contains(&r.fraction));
            clock.advance(733);
        }
    }

    #[test]
    fn test_malformed_window_gives_zero_fraction() {
        let clock = ManualClock::new(0);
        let rec = reconciler_at(&clock, 5_000, 6_000);
        let r = rec.remaining(clock.now_ms());
        assert_eq!(rec.window_ms(), 0);
        assert_eq!(r.remaining_ms, 0);
        assert_eq!(r.fraction, 0.0);
        assert_eq!(r.overdue_ms, 1_000);
    }

    #[test]
    fn test_extreme_timestamps_saturate() {
        let clock = ManualClock::new(0);
        let rec = reconciler_at(&clock, i64::MAX, -10);
        assert_eq!(rec.window_ms(), i64::MAX as u64);
        clock.advance(1_000);
        let r = rec.remaining(clock.now_ms());
        assert!(r.remaining_ms <= rec.window_ms());
        assert!(!r.is_expired());

        let rec = reconciler_at(&clock, i64::MIN, i64::MAX);
        assert_eq!(rec.window_ms(), 0);
        assert!(rec.remaining(clock.now_ms()).is_expired());
    }

    #[test]
    fn test_reanchor_keeps_window_and_deadline() {
        let clock = ManualClock::new(0);
        let rec = reconciler_at(&clock, 10_000, 0);
        clock.advance(3_000);

        // Server says it is later than we estimated (local clock running slow)
        let anchored = rec.reanchor(ClockSample::capture(4_000, &clock));
        assert_eq!(anchored.ends_at(), 10_000);
        assert_eq!(anchored.window_ms(), 10_000);
        assert_eq!(anchored.sample().server_epoch_ms, 4_000);

        let r = anchored.remaining(clock.now_ms());
        assert_eq!(r.remaining_ms, 6_000);
        assert!((r.fraction - 0.6).abs() < 1e-9);

        // Original reconciler unchanged
        assert_eq!(rec.remaining(clock.now_ms()).remaining_ms, 7_000);
    }

    #[test]
    fn test_reanchor_earlier_than_issue_still_bounded() {
        let clock = ManualClock::new(0);
        let rec = reconciler_at(&clock, 10_000, 0);
        let anchored = rec.reanchor(ClockSample::capture(-5_000, &clock));
        let r = anchored.remaining(clock.now_ms());
        assert_eq!(r.remaining_ms, 10_000);
        assert_eq!(r.fraction, 1.0);
    }
}
