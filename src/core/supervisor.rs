//! Connection-status supervisor
//!
//! Tracks `connected | retrying | disconnected` for the UI and decides when
//! the countdown has run out without a server lock. Status changes are
//! informational: nothing here ever changes the view by itself, the session
//! applies the fallback lock when told to.

use tracing::{debug, info};

use super::clock::Remaining;
use super::transport::ConnectionStatus;
use super::types::ViewState;

/// What the deadline watch concluded for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineVerdict {
    /// Not in the question view, or time remains
    Running,
    /// Deadline passed, still inside the grace window
    AwaitingLock,
    /// Grace window exhausted without a server lock: lock locally
    FallbackLock,
}

#[derive(Debug, Clone)]
pub struct ConnectionSupervisor {
    status: ConnectionStatus,
    ever_connected: bool,
    reconnects: u32,
    resync_pending: bool,
    grace_ms: u64,
    awaiting_logged: bool,
}

impl ConnectionSupervisor {
    pub fn new(grace_ms: u64) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            ever_connected: false,
            reconnects: 0,
            resync_pending: false,
            grace_ms,
            awaiting_logged: false,
        }
    }

    /// Fresh state for a new session, waiting for the first connection
    pub fn reset(&mut self) {
        *self = Self {
            status: ConnectionStatus::Retrying,
            ..Self::new(self.grace_ms)
        };
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn grace_ms(&self) -> u64 {
        self.grace_ms
    }

    /// Successful reconnects since the session was joined
    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }

    /// Record a status report; returns the new status if it changed
    pub fn observe_status(&mut self, status: ConnectionStatus) -> Option<ConnectionStatus> {
        if status == self.status {
            return None;
        }
        let previous = self.status;
        self.status = status;

        if status == ConnectionStatus::Connected {
            if self.ever_connected {
                self.reconnects += 1;
                self.resync_pending = true;
                info!(
                    reconnects = self.reconnects,
                    "[SUPERVISOR] Reconnected, accepting resync"
                );
            }
            self.ever_connected = true;
        }

        info!(from = %previous, to = %status, "[SUPERVISOR] Connection status");
        Some(status)
    }

    /// A reconnect happened and no question has been installed since
    pub fn resync_pending(&self) -> bool {
        self.resync_pending
    }

    pub fn clear_resync(&mut self) {
        self.resync_pending = false;
    }

    /// Decide whether the question view must lock locally
    pub fn watch_deadline(&mut self, view: ViewState, remaining: &Remaining) -> DeadlineVerdict {
        if view != ViewState::Question || !remaining.is_expired() {
            self.awaiting_logged = false;
            return DeadlineVerdict::Running;
        }

        if remaining.overdue_ms >= self.grace_ms {
            self.awaiting_logged = false;
            return DeadlineVerdict::FallbackLock;
        }

        if !self.awaiting_logged {
            debug!(
                overdue_ms = remaining.overdue_ms,
                grace_ms = self.grace_ms,
                "[SUPERVISOR] Countdown expired, waiting for server lock"
            );
            self.awaiting_logged = true;
        }
        DeadlineVerdict::AwaitingLock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remaining(remaining_ms: u64, overdue_ms: u64) -> Remaining {
        Remaining {
            remaining_ms,
            fraction: 0.0,
            overdue_ms,
        }
    }

    // -------------------------------------------------------------------------
    // Status tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_reset_starts_retrying() {
        let mut sup = ConnectionSupervisor::new(250);
        assert_eq!(sup.status(), ConnectionStatus::Disconnected);
        sup.reset();
        assert_eq!(sup.status(), ConnectionStatus::Retrying);
        assert_eq!(sup.grace_ms(), 250);
    }

    #[test]
    fn test_observe_reports_only_changes() {
        let mut sup = ConnectionSupervisor::new(250);
        sup.reset();
        assert_eq!(
            sup.observe_status(ConnectionStatus::Connected),
            Some(ConnectionStatus::Connected)
        );
        assert_eq!(sup.observe_status(ConnectionStatus::Connected), None);
    }

    #[test]
    fn test_first_connect_is_not_a_resync() {
        let mut sup = ConnectionSupervisor::new(250);
        sup.reset();
        sup.observe_status(ConnectionStatus::Connected);
        assert!(!sup.resync_pending());
        assert_eq!(sup.reconnects(), 0);
    }

    #[test]
    fn test_reconnect_sets_resync() {
        let mut sup = ConnectionSupervisor::new(250);
        sup.reset();
        sup.observe_status(ConnectionStatus::Connected);
        sup.observe_status(ConnectionStatus::Retrying);
        assert!(!sup.resync_pending());
        sup.observe_status(ConnectionStatus::Connected);
        assert!(sup.resync_pending());
        assert_eq!(sup.reconnects(), 1);

        sup.clear_resync();
        assert!(!sup.resync_pending());
    }

    #[test]
    fn test_reset_clears_history() {
        let mut sup = ConnectionSupervisor::new(250);
        sup.reset();
        sup.observe_status(ConnectionStatus::Connected);
        sup.observe_status(ConnectionStatus::Retrying);
        sup.observe_status(ConnectionStatus::Connected);
        sup.reset();
        assert!(!sup.resync_pending());
        assert_eq!(sup.reconnects(), 0);
    }

    // -------------------------------------------------------------------------
    // Deadline tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_deadline_running_while_time_remains() {
        let mut sup = ConnectionSupervisor::new(250);
        assert_eq!(
            sup.watch_deadline(ViewState::Question, &remaining(1, 0)),
            DeadlineVerdict::Running
        );
    }

    #[test]
    fn test_deadline_awaits_lock_within_grace() {
        let mut sup = ConnectionSupervisor::new(250);
        assert_eq!(
            sup.watch_deadline(ViewState::Question, &remaining(0, 100)),
            DeadlineVerdict::AwaitingLock
        );
    }

    #[test]
    fn test_deadline_fallback_after_grace() {
        let mut sup = ConnectionSupervisor::new(250);
        assert_eq!(
            sup.watch_deadline(ViewState::Question, &remaining(0, 250)),
            DeadlineVerdict::FallbackLock
        );
    }

    #[test]
    fn test_zero_grace_locks_at_deadline() {
        let mut sup = ConnectionSupervisor::new(0);
        assert_eq!(
            sup.watch_deadline(ViewState::Question, &remaining(0, 0)),
            DeadlineVerdict::FallbackLock
        );
    }

    #[test]
    fn test_deadline_ignored_outside_question() {
        let mut sup = ConnectionSupervisor::new(0);
        for view in [ViewState::Locked, ViewState::Lobby, ViewState::Feedback] {
            assert_eq!(
                sup.watch_deadline(view, &remaining(0, 5_000)),
                DeadlineVerdict::Running
            );
        }
    }

    #[test]
    fn test_status_never_affects_deadline() {
        let mut sup = ConnectionSupervisor::new(250);
        sup.reset();
        sup.observe_status(ConnectionStatus::Disconnected);
        assert_eq!(
            sup.watch_deadline(ViewState::Question, &remaining(3_000, 0)),
            DeadlineVerdict::Running
        );
    }
}
