//! Engine constants - timing defaults and queue sizes

use std::time::Duration;

// =============================================================================
// COUNTDOWN
// =============================================================================

/// How long past the deadline the client waits for `question_lock` before
/// locking locally
pub const DEFAULT_FALLBACK_GRACE_MS: u64 = 250;

/// Render-loop cadence (~60 fps)
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;

/// Countdown bar width in cells
pub const DEFAULT_BAR_WIDTH: usize = 30;

// =============================================================================
// CONNECTION
// =============================================================================

/// First reconnect delay; doubles on each failure
pub const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Upper bound for the reconnect delay
pub const DEFAULT_MAX_RECONNECT_DELAY_SECS: u64 = 30;

/// Connection is considered dead after this long without a server ping
pub const DEFAULT_PING_TIMEOUT_SECS: u64 = 60;

/// Capacity of the channels between the socket thread and the session
pub const CHANNEL_CAPACITY: usize = 128;

/// Sleep between socket polls in the connection thread
pub const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(10);
