//! Scripted transport
//!
//! Deterministic [`TransportAdapter`] with no network behind it. A
//! [`ScriptHandle`] (cloned before the transport is moved into a session)
//! lets the caller push server events and status changes, and inspect what
//! the session sent.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use super::protocol::{EventKind, ServerEvent};
use super::transport::{
    ConnectionStatus, EventHandler, HandlerRegistry, StatusHandler, SubscriptionId,
    TransportAdapter,
};

/// A `connect` call as seen by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRecord {
    pub session_id: String,
    pub participant_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq)]
enum Scripted {
    Event(ServerEvent),
    Status(ConnectionStatus),
}

#[derive(Debug, Default)]
struct ScriptState {
    queue: VecDeque<Scripted>,
    connects: Vec<ConnectRecord>,
    disconnects: usize,
    connected: bool,
    sent_answers: Vec<String>,
    handler_count: usize,
}

/// Transport double driven by a [`ScriptHandle`]
pub struct ScriptedTransport {
    shared: Rc<RefCell<ScriptState>>,
    registry: HandlerRegistry,
    /// Report `Connected` as soon as `connect` is called
    auto_connect: bool,
}

/// Test-side view of a [`ScriptedTransport`]
#[derive(Clone)]
pub struct ScriptHandle {
    shared: Rc<RefCell<ScriptState>>,
}

impl ScriptedTransport {
    /// Transport that reports `Connected` on every `connect`
    pub fn pair() -> (Self, ScriptHandle) {
        Self::build(true)
    }

    /// Transport that stays silent on `connect`; status must be scripted
    pub fn pair_manual_status() -> (Self, ScriptHandle) {
        Self::build(false)
    }

    fn build(auto_connect: bool) -> (Self, ScriptHandle) {
        let shared = Rc::new(RefCell::new(ScriptState::default()));
        let transport = Self {
            shared: Rc::clone(&shared),
            registry: HandlerRegistry::new(),
            auto_connect,
        };
        (transport, ScriptHandle { shared })
    }

    fn sync_handler_count(&self) {
        self.shared.borrow_mut().handler_count = self.registry.handler_count();
    }
}

impl TransportAdapter for ScriptedTransport {
    fn connect(&mut self, session_id: &str, participant_id: &str, display_name: &str) {
        let mut state = self.shared.borrow_mut();
        state.connects.push(ConnectRecord {
            session_id: session_id.to_string(),
            participant_id: participant_id.to_string(),
            display_name: display_name.to_string(),
        });
        state.connected = true;
        if self.auto_connect {
            state
                .queue
                .push_back(Scripted::Status(ConnectionStatus::Connected));
        }
    }

    fn disconnect(&mut self) {
        let mut state = self.shared.borrow_mut();
        state.disconnects += 1;
        state.connected = false;
        state.queue.clear();
    }

    fn on(&mut self, kind: EventKind, handler: EventHandler) -> SubscriptionId {
        let id = self.registry.subscribe(kind, handler);
        self.sync_handler_count();
        id
    }

    fn off(&mut self, kind: EventKind, id: SubscriptionId) -> bool {
        let removed = self.registry.unsubscribe(kind, id);
        self.sync_handler_count();
        removed
    }

    fn on_status(&mut self, handler: StatusHandler) -> SubscriptionId {
        let id = self.registry.subscribe_status(handler);
        self.sync_handler_count();
        id
    }

    fn off_status(&mut self, id: SubscriptionId) -> bool {
        let removed = self.registry.unsubscribe_status(id);
        self.sync_handler_count();
        removed
    }

    fn send_answer(&mut self, option_key: &str) {
        self.shared
            .borrow_mut()
            .sent_answers
            .push(option_key.to_string());
    }

    fn dispatch_pending(&mut self) -> usize {
        let mut delivered = 0;
        loop {
            // Release the borrow before running handlers
            let next = self.shared.borrow_mut().queue.pop_front();
            match next {
                Some(Scripted::Event(event)) => {
                    self.registry.emit(&event);
                }
                Some(Scripted::Status(status)) => {
                    self.registry.emit_status(status);
                }
                None => break,
            }
            delivered += 1;
        }
        delivered
    }
}

impl ScriptHandle {
    /// Queue a server event for the next dispatch
    pub fn push_event(&self, event: ServerEvent) {
        self.shared
            .borrow_mut()
            .queue
            .push_back(Scripted::Event(event));
    }

    /// Queue a connection status change for the next dispatch
    pub fn push_status(&self, status: ConnectionStatus) {
        self.shared
            .borrow_mut()
            .queue
            .push_back(Scripted::Status(status));
    }

    pub fn sent_answers(&self) -> Vec<String> {
        self.shared.borrow().sent_answers.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.shared.borrow().connects.len()
    }

    pub fn last_connect(&self) -> Option<ConnectRecord> {
        self.shared.borrow().connects.last().cloned()
    }

    pub fn disconnect_count(&self) -> usize {
        self.shared.borrow().disconnects
    }

    pub fn is_connected(&self) -> bool {
        self.shared.borrow().connected
    }

    /// Handlers currently registered on the transport
    pub fn active_handlers(&self) -> usize {
        self.shared.borrow().handler_count
    }

    pub fn pending(&self) -> usize {
        self.shared.borrow().queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_records_and_reports_status() {
        let (mut transport, handle) = ScriptedTransport::pair();
        let statuses = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&statuses);
        transport.on_status(Box::new(move |s| sink.borrow_mut().push(s)));

        transport.connect("S1", "p1", "Alice");
        assert!(handle.is_connected());
        assert_eq!(
            handle.last_connect(),
            Some(ConnectRecord {
                session_id: "S1".to_string(),
                participant_id: "p1".to_string(),
                display_name: "Alice".to_string(),
            })
        );

        assert_eq!(transport.dispatch_pending(), 1);
        assert_eq!(*statuses.borrow(), vec![ConnectionStatus::Connected]);
    }

    #[test]
    fn test_manual_status_stays_silent() {
        let (mut transport, handle) = ScriptedTransport::pair_manual_status();
        transport.connect("S1", "p1", "Alice");
        assert_eq!(handle.pending(), 0);
    }

    #[test]
    fn test_events_dispatched_in_order() {
        let (mut transport, handle) = ScriptedTransport::pair();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for kind in EventKind::ALL {
            let sink = Rc::clone(&seen);
            transport.on(kind, Box::new(move |e| sink.borrow_mut().push(e.kind())));
        }

        handle.push_event(ServerEvent::SessionStarted);
        handle.push_event(ServerEvent::SessionEnd);
        assert_eq!(transport.dispatch_pending(), 2);
        assert_eq!(
            *seen.borrow(),
            vec![EventKind::SessionStarted, EventKind::SessionEnd]
        );
        assert_eq!(transport.dispatch_pending(), 0);
    }

    #[test]
    fn test_handler_count_tracks_on_off() {
        let (mut transport, handle) = ScriptedTransport::pair();
        let id = transport.on(EventKind::Question, Box::new(|_| {}));
        let status_id = transport.on_status(Box::new(|_| {}));
        assert_eq!(handle.active_handlers(), 2);

        assert!(transport.off(EventKind::Question, id));
        assert!(transport.off_status(status_id));
        assert_eq!(handle.active_handlers(), 0);
    }

    #[test]
    fn test_disconnect_drops_queue() {
        let (mut transport, handle) = ScriptedTransport::pair();
        transport.connect("S1", "p1", "Alice");
        handle.push_event(ServerEvent::SessionEnd);
        transport.disconnect();
        assert_eq!(handle.pending(), 0);
        assert_eq!(handle.disconnect_count(), 1);
        assert!(!handle.is_connected());
    }

    #[test]
    fn test_send_answer_recorded() {
        let (mut transport, handle) = ScriptedTransport::pair();
        transport.send_answer("b");
        assert_eq!(handle.sent_answers(), vec!["b".to_string()]);
    }
}
