//! Transport adapter contract
//!
//! The session state machine talks to the server only through
//! [`TransportAdapter`], so a scripted double can drive every scenario in
//! tests without real network timing.
//!
//! Delivery is cooperative: a transport may receive traffic on any thread,
//! but handlers only run inside [`TransportAdapter::dispatch_pending`], on
//! the thread that owns the session.

use super::protocol::{EventKind, ServerEvent};

// =============================================================================
// CONNECTION STATUS
// =============================================================================

/// Connection status, independent of the quiz view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Connected and joined
    Connected,
    /// Connection lost or not yet established, attempting to (re)connect
    Retrying,
    /// Not connected and not trying
    Disconnected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Retrying => "retrying",
            ConnectionStatus::Disconnected => "disconnected",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

/// Token returned by `on`/`on_status`, needed to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callback for one protocol event kind
pub type EventHandler = Box<dyn FnMut(&ServerEvent)>;

/// Callback for connection status changes
pub type StatusHandler = Box<dyn FnMut(ConnectionStatus)>;

/// Subscription bookkeeping shared by transport implementations
#[derive(Default)]
pub struct HandlerRegistry {
    next_id: u64,
    event_handlers: Vec<(SubscriptionId, EventKind, EventHandler)>,
    status_handlers: Vec<(SubscriptionId, StatusHandler)>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }

    pub fn subscribe(&mut self, kind: EventKind, handler: EventHandler) -> SubscriptionId {
        let id = self.allocate_id();
        self.event_handlers.push((id, kind, handler));
        id
    }

    /// Remove a handler; false if `id` was not registered for `kind`
    pub fn unsubscribe(&mut self, kind: EventKind, id: SubscriptionId) -> bool {
        let before = self.event_handlers.len();
        self.event_handlers
            .retain(|(sub_id, sub_kind, _)| !(*sub_id == id && *sub_kind == kind));
        self.event_handlers.len() != before
    }

    pub fn subscribe_status(&mut self, handler: StatusHandler) -> SubscriptionId {
        let id = self.allocate_id();
        self.status_handlers.push((id, handler));
        id
    }

    pub fn unsubscribe_status(&mut self, id: SubscriptionId) -> bool {
        let before = self.status_handlers.len();
        self.status_handlers.retain(|(sub_id, _)| *sub_id != id);
        self.status_handlers.len() != before
    }

    /// Invoke every handler registered for the event's kind
    ///
    /// Returns the number of handlers invoked.
    pub fn emit(&mut self, event: &ServerEvent) -> usize {
        let kind = event.kind();
        let mut invoked = 0;
        for (_, sub_kind, handler) in self.event_handlers.iter_mut() {
            if *sub_kind == kind {
                handler(event);
                invoked += 1;
            }
        }
        invoked
    }

    pub fn emit_status(&mut self, status: ConnectionStatus) -> usize {
        for (_, handler) in self.status_handlers.iter_mut() {
            handler(status);
        }
        self.status_handlers.len()
    }

    /// Total registered handlers (events + status)
    pub fn handler_count(&self) -> usize {
        self.event_handlers.len() + self.status_handlers.len()
    }
}

// =============================================================================
// TRANSPORT ADAPTER
// =============================================================================

/// Everything the session state machine needs from a transport
pub trait TransportAdapter {
    /// Open the connection and join the session
    ///
    /// Failures are reported through status handlers, never returned.
    fn connect(&mut self, session_id: &str, participant_id: &str, display_name: &str);

    /// Close the connection; no more events are delivered afterwards
    fn disconnect(&mut self);

    /// Register a handler for one event kind
    fn on(&mut self, kind: EventKind, handler: EventHandler) -> SubscriptionId;

    /// Unregister a handler registered with `on`
    fn off(&mut self, kind: EventKind, id: SubscriptionId) -> bool;

    /// Register a handler for connection status changes
    fn on_status(&mut self, handler: StatusHandler) -> SubscriptionId;

    /// Unregister a handler registered with `on_status`
    fn off_status(&mut self, id: SubscriptionId) -> bool;

    /// Send an answer upstream (fire-and-forget)
    fn send_answer(&mut self, option_key: &str);

    /// Deliver queued inbound traffic to the registered handlers
    ///
    /// Returns the number of items delivered.
    fn dispatch_pending(&mut self) -> usize;
}
