//! Core types - platform-independent data structures
//!
//! These types represent one participant's view of a live quiz run and are
//! used throughout the engine.

use std::fmt;

use tracing::warn;
use uuid::Uuid;

use super::protocol::{LeaderboardEntry, QuestionPayload};

// =============================================================================
// SESSION
// =============================================================================

/// One participant's membership in one quiz run
///
/// Immutable once created; a new `join` creates a new Session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub session_id: String,
    /// Locally generated, opaque
    pub participant_id: String,
    pub display_name: String,
}

impl Session {
    /// Create a session with a freshly generated participant id
    pub fn new(session_id: &str, display_name: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            participant_id: Uuid::new_v4().to_string(),
            display_name: display_name.to_string(),
        }
    }
}

// =============================================================================
// VIEW STATE
// =============================================================================

/// The six-way view of a live quiz session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewState {
    Lobby,
    Question,
    Locked,
    Feedback,
    Leaderboard,
    End,
}

impl ViewState {
    /// Views that show a running countdown
    pub fn is_timed(self) -> bool {
        matches!(self, ViewState::Question | ViewState::Locked)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ViewState::Lobby => "lobby",
            ViewState::Question => "question",
            ViewState::Locked => "locked",
            ViewState::Feedback => "feedback",
            ViewState::Leaderboard => "leaderboard",
            ViewState::End => "end",
        }
    }
}

impl fmt::Display for ViewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ACTIVE QUESTION
// =============================================================================

/// An answer option with a key unique within its question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOption {
    pub key: String,
    pub label: String,
}

/// The question currently on screen (question, locked and feedback views)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveQuestion {
    pub id: String,
    pub prompt: String,
    pub options: Vec<AnswerOption>,
    /// Server epoch-ms deadline
    pub ends_at: i64,
    /// Server epoch-ms when the question was issued
    pub server_now_at_issue: i64,
}

impl ActiveQuestion {
    /// Build from a `question` event payload
    ///
    /// Options repeating an earlier key are dropped so keys stay unique.
    pub fn from_payload(payload: QuestionPayload, ends_at: i64, server_now: i64) -> Self {
        let mut options: Vec<AnswerOption> = Vec::with_capacity(payload.options.len());
        for opt in payload.options {
            if options.iter().any(|o| o.key == opt.key) {
                warn!(
                    question_id = %payload.id,
                    key = %opt.key,
                    "[SESSION] Dropping option with duplicate key"
                );
                continue;
            }
            options.push(AnswerOption {
                key: opt.key,
                label: opt.label,
            });
        }

        if ends_at <= server_now {
            warn!(
                question_id = %payload.id,
                ends_at,
                server_now,
                "[SESSION] Question deadline is not after its issue time"
            );
        }

        Self {
            id: payload.id,
            prompt: payload.prompt,
            options,
            ends_at,
            server_now_at_issue: server_now,
        }
    }

    /// Answering window in server milliseconds (may be <= 0 for malformed events)
    pub fn window_ms(&self) -> i64 {
        self.ends_at.saturating_sub(self.server_now_at_issue)
    }

    pub fn has_option(&self, key: &str) -> bool {
        self.options.iter().any(|o| o.key == key)
    }

    pub fn option_label(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.key == key)
            .map(|o| o.label.as_str())
    }
}

// =============================================================================
// ANSWER / RESULT / STANDINGS
// =============================================================================

/// The participant's local choice for the active question
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerSelection {
    pub option_key: Option<String>,
    pub submitted: bool,
}

impl AnswerSelection {
    pub fn is_empty(&self) -> bool {
        self.option_key.is_none() && !self.submitted
    }
}

/// Result of the last graded question, as applied locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionOutcome {
    pub question_id: Option<String>,
    pub correct_option_key: String,
    pub selected_option_key: Option<String>,
    /// Delta actually added to the score (never negative)
    pub applied_delta: u64,
}

impl QuestionOutcome {
    pub fn is_correct(&self) -> bool {
        self.selected_option_key.as_deref() == Some(self.correct_option_key.as_str())
    }
}

/// Last standings received from the server (display only)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Standings {
    pub top: Vec<LeaderboardEntry>,
    /// Score the server reports for this participant
    pub reported_score: i64,
}
