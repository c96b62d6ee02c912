//! WebSocket transport for the live quiz server
//!
//! Owns a background connection thread. The session thread only ever sees
//! the crossbeam channels: outgoing answers go down, parsed events and
//! status changes come up and are handed to handlers in `dispatch_pending`.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{connect, Message, WebSocket};

use super::config::ServerSettings;
use crate::core::constants::{CHANNEL_CAPACITY, INITIAL_RECONNECT_DELAY, SOCKET_POLL_INTERVAL};
use crate::core::protocol::{
    parse_server_frame, ClientMessage, ControlMessage, EventKind, ServerEvent, ServerFrame,
};
use crate::core::transport::{
    ConnectionStatus, EventHandler, HandlerRegistry, StatusHandler, SubscriptionId,
    TransportAdapter,
};

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(#[source] tungstenite::Error),
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("socket error: {0}")]
    Socket(#[source] tungstenite::Error),
    #[error("server closed the connection")]
    Closed,
    #[error("no ping from server for {0:?}")]
    PingTimeout(Duration),
    #[error("outgoing channel disconnected")]
    ChannelClosed,
}

/// Who is joining; resent on every reconnect
#[derive(Debug, Clone)]
struct JoinParams {
    session_id: String,
    participant_id: String,
    display_name: String,
}

/// Outgoing messages (session thread -> WS thread)
#[derive(Debug)]
enum Outgoing {
    Answer(String),
    Shutdown,
}

/// Incoming messages (WS thread -> session thread)
#[derive(Debug)]
enum Incoming {
    Event(ServerEvent),
    Status(ConnectionStatus),
}

// =============================================================================
// WEBSOCKET TRANSPORT
// =============================================================================

pub struct WebSocketTransport {
    settings: ServerSettings,
    registry: HandlerRegistry,
    tx: Option<Sender<Outgoing>>,
    rx: Option<Receiver<Incoming>>,
    thread_handle: Option<JoinHandle<()>>,
    shutdown_flag: Arc<AtomicBool>,
}

impl WebSocketTransport {
    pub fn new(settings: ServerSettings) -> Self {
        Self {
            settings,
            registry: HandlerRegistry::new(),
            tx: None,
            rx: None,
            thread_handle: None,
            shutdown_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some()
    }

    pub fn handler_count(&self) -> usize {
        self.registry.handler_count()
    }
}

impl TransportAdapter for WebSocketTransport {
    fn connect(&mut self, session_id: &str, participant_id: &str, display_name: &str) {
        if self.thread_handle.is_some() {
            warn!("[WS] Already running, restarting connection");
            self.disconnect();
        }

        let (outgoing_tx, outgoing_rx) = bounded::<Outgoing>(CHANNEL_CAPACITY);
        let (incoming_tx, incoming_rx) = bounded::<Incoming>(CHANNEL_CAPACITY);

        self.tx = Some(outgoing_tx);
        self.rx = Some(incoming_rx);
        self.shutdown_flag.store(false, Ordering::SeqCst);

        let shutdown_flag = Arc::clone(&self.shutdown_flag);
        let settings = self.settings.clone();
        let join = JoinParams {
            session_id: session_id.to_string(),
            participant_id: participant_id.to_string(),
            display_name: display_name.to_string(),
        };

        let handle = thread::spawn(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                connection_thread(settings, join, outgoing_rx, incoming_tx.clone(), shutdown_flag);
            }));

            if let Err(panic_info) = result {
                let msg = panic_info
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(panic = %msg, "[WS] Connection thread panicked");
                let _ = incoming_tx.send(Incoming::Status(ConnectionStatus::Disconnected));
            }
        });

        self.thread_handle = Some(handle);
    }

    fn disconnect(&mut self) {
        self.shutdown_flag.store(true, Ordering::SeqCst);
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(Outgoing::Shutdown);
        }
        // Unblock a thread waiting on a full incoming channel
        self.rx = None;
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
        self.tx = None;
    }

    fn on(&mut self, kind: EventKind, handler: EventHandler) -> SubscriptionId {
        self.registry.subscribe(kind, handler)
    }

    fn off(&mut self, kind: EventKind, id: SubscriptionId) -> bool {
        self.registry.unsubscribe(kind, id)
    }

    fn on_status(&mut self, handler: StatusHandler) -> SubscriptionId {
        self.registry.subscribe_status(handler)
    }

    fn off_status(&mut self, id: SubscriptionId) -> bool {
        self.registry.unsubscribe_status(id)
    }

    fn send_answer(&mut self, option_key: &str) {
        let Some(tx) = &self.tx else {
            warn!(option_key, "[WS] Not connected, answer dropped");
            return;
        };
        if let Err(e) = tx.try_send(Outgoing::Answer(option_key.to_string())) {
            warn!(error = %e, "[WS] Failed to queue answer");
        }
    }

    fn dispatch_pending(&mut self) -> usize {
        let mut delivered = 0;
        loop {
            let Some(rx) = &self.rx else {
                break;
            };
            match rx.try_recv() {
                Ok(Incoming::Event(event)) => {
                    self.registry.emit(&event);
                }
                Ok(Incoming::Status(status)) => {
                    self.registry.emit_status(status);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.rx = None;
                    break;
                }
            }
            delivered += 1;
        }
        delivered
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// =============================================================================
// CONNECTION THREAD
// =============================================================================

/// Map an http(s) base URL onto ws(s) and append the session endpoint
pub fn websocket_url(base: &str, session_id: &str) -> String {
    let base = base.trim_end_matches('/');
    let ws_base = if base.starts_with("https://") {
        base.replacen("https://", "wss://", 1)
    } else if base.starts_with("http://") {
        base.replacen("http://", "ws://", 1)
    } else {
        base.to_string()
    };
    format!("{}/ws/{}", ws_base, session_id)
}

fn connection_thread(
    settings: ServerSettings,
    join: JoinParams,
    outgoing_rx: Receiver<Outgoing>,
    incoming_tx: Sender<Incoming>,
    shutdown_flag: Arc<AtomicBool>,
) {
    let mut reconnect_delay = INITIAL_RECONNECT_DELAY;
    let max_delay = settings.max_reconnect_delay();
    let url = websocket_url(&settings.url, &join.session_id);

    loop {
        if shutdown_flag.load(Ordering::SeqCst) {
            break;
        }

        info!(url = %url, "[WS] Connecting...");
        match open_and_join(&url, &join) {
            Ok(mut socket) => {
                info!(session_id = %join.session_id, "[WS] Connected and joined");
                let _ = incoming_tx.send(Incoming::Status(ConnectionStatus::Connected));
                reconnect_delay = INITIAL_RECONNECT_DELAY;

                let result = message_loop(
                    &mut socket,
                    &outgoing_rx,
                    &incoming_tx,
                    &shutdown_flag,
                    settings.ping_timeout(),
                );
                let _ = socket.close(None);
                match result {
                    Ok(()) => break,
                    Err(e) => info!(error = %e, "[WS] Disconnected"),
                }
            }
            Err(e) => {
                error!(error = %e, "[WS] Connection failed");
            }
        }

        if shutdown_flag.load(Ordering::SeqCst) || !settings.auto_reconnect {
            break;
        }

        let _ = incoming_tx.send(Incoming::Status(ConnectionStatus::Retrying));
        info!(delay = reconnect_delay.as_secs(), "[WS] Reconnecting...");
        sleep_unless_shutdown(reconnect_delay, &shutdown_flag);
        reconnect_delay = (reconnect_delay * 2).min(max_delay);
    }

    let _ = incoming_tx.send(Incoming::Status(ConnectionStatus::Disconnected));
}

fn sleep_unless_shutdown(delay: Duration, shutdown_flag: &AtomicBool) {
    let deadline = Instant::now() + delay;
    while Instant::now() < deadline {
        if shutdown_flag.load(Ordering::SeqCst) {
            return;
        }
        thread::sleep(SOCKET_POLL_INTERVAL * 10);
    }
}

fn send_json(socket: &mut Socket, msg: &ClientMessage) -> Result<(), TransportError> {
    let json = serde_json::to_string(msg)?;
    socket
        .send(Message::Text(json))
        .map_err(TransportError::Socket)
}

fn open_and_join(url: &str, join: &JoinParams) -> Result<Socket, TransportError> {
    let (mut socket, _) = connect(url).map_err(TransportError::Connect)?;

    let msg = ClientMessage::Join {
        session_id: join.session_id.clone(),
        participant_id: join.participant_id.clone(),
        display_name: join.display_name.clone(),
    };
    send_json(&mut socket, &msg)?;
    Ok(socket)
}

fn message_loop(
    socket: &mut Socket,
    outgoing_rx: &Receiver<Outgoing>,
    incoming_tx: &Sender<Incoming>,
    shutdown_flag: &AtomicBool,
    ping_timeout: Duration,
) -> Result<(), TransportError> {
    let mut last_ping_received = Instant::now();

    match socket.get_ref() {
        MaybeTlsStream::Plain(tcp) => {
            let _ = tcp.set_nonblocking(true);
        }
        MaybeTlsStream::NativeTls(tls) => {
            let _ = tls.get_ref().set_nonblocking(true);
        }
        _ => {}
    }

    loop {
        if shutdown_flag.load(Ordering::SeqCst) {
            return Ok(());
        }

        if last_ping_received.elapsed() > ping_timeout {
            return Err(TransportError::PingTimeout(ping_timeout));
        }

        // Handle outgoing
        match outgoing_rx.try_recv() {
            Ok(Outgoing::Answer(option_key)) => {
                debug!(option_key = %option_key, "[WS] Sending answer");
                send_json(socket, &ClientMessage::Answer { option_key })?;
            }
            Ok(Outgoing::Shutdown) => return Ok(()),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => return Err(TransportError::ChannelClosed),
        }

        // Handle incoming
        match socket.read() {
            Ok(Message::Text(text)) => match parse_server_frame(&text) {
                Ok(ServerFrame::Event(event)) => {
                    if incoming_tx.send(Incoming::Event(event)).is_err() {
                        return Err(TransportError::ChannelClosed);
                    }
                }
                Ok(ServerFrame::Control(ControlMessage::Ping)) => {
                    last_ping_received = Instant::now();
                    send_json(socket, &ClientMessage::Pong)?;
                }
                Ok(ServerFrame::Control(ControlMessage::Error { message })) => {
                    warn!(message = %message, "[WS] Server error");
                }
                Err(e) => {
                    debug!(error = %e, "[WS] Ignoring unrecognized frame");
                }
            },
            Ok(Message::Close(_)) => return Err(TransportError::Closed),
            Err(tungstenite::Error::Io(ref e)) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(TransportError::Socket(e)),
            _ => {}
        }

        thread::sleep(SOCKET_POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn transport() -> WebSocketTransport {
        WebSocketTransport::new(ServerSettings {
            url: "ws://127.0.0.1:9".to_string(),
            session_id: "S1".to_string(),
            display_name: "Alice".to_string(),
            ..ServerSettings::default()
        })
    }

    #[test]
    fn test_websocket_url_schemes() {
        assert_eq!(
            websocket_url("https://quiz.example.com/", "S1"),
            "wss://quiz.example.com/ws/S1"
        );
        assert_eq!(
            websocket_url("http://localhost:8000", "S1"),
            "ws://localhost:8000/ws/S1"
        );
        assert_eq!(
            websocket_url("wss://quiz.example.com", "abc"),
            "wss://quiz.example.com/ws/abc"
        );
    }

    #[test]
    fn test_idle_transport_dispatches_nothing() {
        let mut t = transport();
        assert!(!t.is_running());
        assert_eq!(t.dispatch_pending(), 0);
        // Dropped with a warning, never panics
        t.send_answer("a");
    }

    #[test]
    fn test_dispatch_delivers_channel_traffic() {
        let mut t = transport();
        let (tx, rx) = bounded(8);
        t.rx = Some(rx);

        let events = Rc::new(RefCell::new(Vec::new()));
        let statuses = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        t.on(
            EventKind::SessionEnd,
            Box::new(move |e| sink.borrow_mut().push(e.kind())),
        );
        let sink = Rc::clone(&statuses);
        t.on_status(Box::new(move |s| sink.borrow_mut().push(s)));

        tx.send(Incoming::Status(ConnectionStatus::Connected)).unwrap();
        tx.send(Incoming::Event(ServerEvent::SessionEnd)).unwrap();
        assert_eq!(t.dispatch_pending(), 2);
        assert_eq!(*statuses.borrow(), vec![ConnectionStatus::Connected]);
        assert_eq!(*events.borrow(), vec![EventKind::SessionEnd]);

        // Sender gone: channel dropped quietly
        drop(tx);
        assert_eq!(t.dispatch_pending(), 0);
        assert!(t.rx.is_none());
    }

    #[test]
    fn test_on_off_symmetry() {
        let mut t = transport();
        let ids: Vec<_> = EventKind::ALL
            .iter()
            .map(|kind| (*kind, t.on(*kind, Box::new(|_| {}))))
            .collect();
        let status_id = t.on_status(Box::new(|_| {}));
        assert_eq!(t.handler_count(), 7);

        for (kind, id) in ids {
            assert!(t.off(kind, id));
        }
        assert!(t.off_status(status_id));
        assert_eq!(t.handler_count(), 0);
    }

    #[test]
    fn test_send_answer_queues_when_connected() {
        let mut t = transport();
        let (tx, rx) = bounded(8);
        t.tx = Some(tx);
        t.send_answer("b");
        assert!(matches!(rx.try_recv(), Ok(Outgoing::Answer(key)) if key == "b"));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            TransportError::PingTimeout(Duration::from_secs(60)).to_string(),
            "no ping from server for 60s"
        );
        assert_eq!(
            TransportError::Closed.to_string(),
            "server closed the connection"
        );
    }
}
