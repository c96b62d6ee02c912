//! WebSocket protocol types
//!
//! This module contains the JSON message types exchanged between the client
//! and the live quiz server. These types are platform-independent and can be
//! tested without a network.
//!
//! Every frame carries a `type` tag in snake_case; payload fields are
//! camelCase (`endsAt`, `serverNow`, `scoreDelta`, ...).

use serde::{Deserialize, Serialize};

// =============================================================================
// DATA TYPES
// =============================================================================

/// One answer option as sent by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub key: String,
    pub label: String,
}

/// Question content carried by a `question` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionPayload {
    pub id: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
}

/// One row of a `leaderboard` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub name: String,
    pub score: i64,
}

// =============================================================================
// EVENT KINDS
// =============================================================================

/// The closed set of protocol event kinds a transport can deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SessionStarted,
    Question,
    QuestionLock,
    QuestionResult,
    Leaderboard,
    SessionEnd,
}

impl EventKind {
    /// Every kind, in protocol order
    pub const ALL: [EventKind; 6] = [
        EventKind::SessionStarted,
        EventKind::Question,
        EventKind::QuestionLock,
        EventKind::QuestionResult,
        EventKind::Leaderboard,
        EventKind::SessionEnd,
    ];

    /// Wire name of the kind (the `type` tag)
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SessionStarted => "session_started",
            EventKind::Question => "question",
            EventKind::QuestionLock => "question_lock",
            EventKind::QuestionResult => "question_result",
            EventKind::Leaderboard => "leaderboard",
            EventKind::SessionEnd => "session_end",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// SERVER EVENTS (server → client)
// =============================================================================

/// Protocol events consumed by the session state machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// The quiz run has started (participants stay in the lobby)
    SessionStarted,
    /// A new question was issued
    Question {
        question: QuestionPayload,
        /// Server epoch-ms deadline
        ends_at: i64,
        /// Server epoch-ms at issue time
        server_now: i64,
    },
    /// The server closed answering for the current question
    QuestionLock { server_now: i64 },
    /// Grading result for the current question
    QuestionResult {
        correct_option_key: String,
        score_delta: i64,
    },
    /// Standings snapshot, display only
    Leaderboard {
        #[serde(default)]
        top: Vec<LeaderboardEntry>,
        #[serde(default)]
        score: i64,
    },
    /// The quiz run is over
    SessionEnd,
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::SessionStarted => EventKind::SessionStarted,
            ServerEvent::Question { .. } => EventKind::Question,
            ServerEvent::QuestionLock { .. } => EventKind::QuestionLock,
            ServerEvent::QuestionResult { .. } => EventKind::QuestionResult,
            ServerEvent::Leaderboard { .. } => EventKind::Leaderboard,
            ServerEvent::SessionEnd => EventKind::SessionEnd,
        }
    }
}

/// Transport-level frames that never reach the state machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Keepalive (client should respond with Pong)
    Ping,
    /// Error message from server
    Error { message: String },
}

/// Anything the server can send on the socket
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Event(ServerEvent),
    Control(ControlMessage),
}

/// Parse one text frame received from the server
pub fn parse_server_frame(text: &str) -> Result<ServerFrame, serde_json::Error> {
    serde_json::from_str(text)
}

// =============================================================================
// CLIENT MESSAGES (client → server)
// =============================================================================

/// Messages sent to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Join (or re-join after reconnect) a quiz session
    Join {
        session_id: String,
        participant_id: String,
        display_name: String,
    },
    /// Submitted answer for the current question
    Answer { option_key: String },
    /// Pong response to server ping
    Pong,
}

// =============================================================================
// TESTS
// =============================================================================
