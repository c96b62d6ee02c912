//! Console UI - stdin commands and terminal rendering
//!
//! Rendering is split into pure `String` builders (tested below) and the
//! runner, which decides when to print them.

use std::io::BufRead;
use std::thread;

use chrono::{DateTime, Local};
use crossbeam_channel::{bounded, Receiver};
use tracing::debug;

use super::config::CountdownSettings;
use crate::core::clock::Remaining;
use crate::core::color::ANSI_RESET;
use crate::core::constants::CHANNEL_CAPACITY;
use crate::core::countdown::{render_countdown, Urgency};
use crate::core::format::format_delta;
use crate::core::session::{LockSource, SessionChange, SessionSnapshot};
use crate::core::transport::ConnectionStatus;
use crate::core::types::{ActiveQuestion, ViewState};

// =============================================================================
// COMMANDS
// =============================================================================

/// One line typed by the participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    /// Select the n-th option (0-based)
    SelectIndex(usize),
    /// Select an option by its key
    SelectKey(String),
    Submit,
    Quit,
    Help,
}

/// Parse a command line; `None` for blank input
///
/// `1`..`9` select by position, `s`/`submit` submits, `q`/`quit` quits,
/// `h`/`help`/`?` prints help, anything else is taken as an option key.
pub fn parse_command(line: &str) -> Option<UserCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let command = match line.to_ascii_lowercase().as_str() {
        "s" | "submit" => UserCommand::Submit,
        "q" | "quit" | "exit" => UserCommand::Quit,
        "h" | "help" | "?" => UserCommand::Help,
        _ => match line.parse::<usize>() {
            Ok(n @ 1..=9) => UserCommand::SelectIndex(n - 1),
            _ => UserCommand::SelectKey(line.to_string()),
        },
    };
    Some(command)
}

pub const HELP_TEXT: &str =
    "Commands: 1-9 select by position, <key> select by key, s submit, q quit";

/// Read stdin lines on a background thread
///
/// EOF or a read error is reported as `Quit`.
pub fn spawn_stdin_reader() -> Receiver<UserCommand> {
    let (tx, rx) = bounded(CHANNEL_CAPACITY);
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if let Some(command) = parse_command(&line) {
                debug!(command = ?command, "[CONSOLE] Command");
                let quit = command == UserCommand::Quit;
                if tx.send(command).is_err() || quit {
                    return;
                }
            }
        }
        let _ = tx.send(UserCommand::Quit);
    });
    rx
}

// =============================================================================
// RENDERING
// =============================================================================

pub struct ConsoleRenderer {
    countdown: CountdownSettings,
    color: bool,
}

impl ConsoleRenderer {
    pub fn new(countdown: CountdownSettings) -> Self {
        Self {
            countdown,
            color: true,
        }
    }

    /// Renderer without ANSI escapes
    pub fn plain(countdown: CountdownSettings) -> Self {
        Self {
            countdown,
            color: false,
        }
    }

    fn paint(&self, text: &str, urgency: Urgency) -> String {
        if self.color {
            format!(
                "{}{}{}",
                self.countdown.color_for(urgency).ansi_fg(),
                text,
                ANSI_RESET
            )
        } else {
            text.to_string()
        }
    }

    /// Prompt and numbered options
    pub fn question_block(&self, question: &ActiveQuestion) -> String {
        let mut out = format!("\n== {} ==\n{}\n", question.id, question.prompt);
        for (i, option) in question.options.iter().enumerate() {
            out.push_str(&format!("  {}) [{}] {}\n", i + 1, option.key, option.label));
        }
        if let Some(deadline) = format_deadline(question.ends_at) {
            out.push_str(&format!("Answer by {}\n", deadline));
        }
        out
    }

    /// One countdown line, redrawn in place every frame
    pub fn countdown_line(&self, remaining: &Remaining, window_ms: u64, view: ViewState) -> String {
        let view_model = render_countdown(
            remaining.remaining_ms,
            window_ms,
            self.countdown.bar_width,
            &self.countdown.thresholds(),
        );
        let bar = view_model.bar('#', '-');
        let suffix = match view {
            ViewState::Locked => " locked",
            _ => "",
        };
        format!(
            "[{}] {}{}",
            self.paint(&bar, view_model.urgency),
            self.paint(&view_model.label, view_model.urgency),
            suffix
        )
    }

    /// Announcement for a change; `None` when nothing is worth printing
    pub fn describe_change(
        &self,
        change: &SessionChange,
        snapshot: &SessionSnapshot,
    ) -> Option<String> {
        match change {
            SessionChange::QuestionInstalled { .. } => {
                snapshot.question.as_ref().map(|q| self.question_block(q))
            }
            SessionChange::ViewChanged { to, .. } => match to {
                ViewState::Locked => Some(match snapshot.lock {
                    Some(LockSource::LocalFallback) => "Time is up.".to_string(),
                    _ => "Answers locked.".to_string(),
                }),
                ViewState::Feedback => snapshot.last_outcome.as_ref().map(|outcome| {
                    let verdict = match &outcome.selected_option_key {
                        None => "No answer",
                        Some(_) if outcome.is_correct() => "Correct",
                        Some(_) => "Wrong",
                    };
                    format!(
                        "{}. Correct answer: {} ({}), score {}",
                        verdict,
                        outcome.correct_option_key,
                        format_delta(outcome.applied_delta),
                        snapshot.score
                    )
                }),
                ViewState::End => Some(format!("Session over. Final score: {}", snapshot.score)),
                _ => None,
            },
            SessionChange::ConnectionChanged(status) => Some(match status {
                ConnectionStatus::Connected => "Connected.".to_string(),
                ConnectionStatus::Retrying => "Connection lost, retrying...".to_string(),
                ConnectionStatus::Disconnected => "Disconnected.".to_string(),
            }),
            SessionChange::LeaderboardUpdated => {
                snapshot.standings.as_ref().map(|standings| {
                    let mut out = String::from("Leaderboard:");
                    for (rank, entry) in standings.top.iter().enumerate() {
                        out.push_str(&format!("\n  {}. {} {}", rank + 1, entry.name, entry.score));
                    }
                    out
                })
            }
            SessionChange::ScoreChanged { .. }
            | SessionChange::FallbackLock { .. }
            | SessionChange::EventIgnored { .. } => None,
        }
    }
}

/// Local wall-clock time of a server deadline, `HH:MM:SS`
pub fn format_deadline(ends_at: i64) -> Option<String> {
    DateTime::from_timestamp_millis(ends_at)
        .map(|utc| utc.with_timezone(&Local).format("%H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::LeaderboardEntry;
    use crate::core::types::{AnswerOption, AnswerSelection, QuestionOutcome, Standings};

    fn question() -> ActiveQuestion {
        ActiveQuestion {
            id: "q1".to_string(),
            prompt: "Capital of France?".to_string(),
            options: vec![
                AnswerOption {
                    key: "a".to_string(),
                    label: "Paris".to_string(),
                },
                AnswerOption {
                    key: "b".to_string(),
                    label: "Lyon".to_string(),
                },
            ],
            ends_at: 1_700_000_010_000,
            server_now_at_issue: 1_700_000_000_000,
        }
    }

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot {
            session: None,
            view: ViewState::Question,
            question: Some(question()),
            selection: AnswerSelection::default(),
            score: 0,
            connection: ConnectionStatus::Connected,
            remaining: None,
            lock: None,
            last_outcome: None,
            standings: None,
        }
    }

    fn remaining(remaining_ms: u64) -> Remaining {
        Remaining {
            remaining_ms,
            fraction: remaining_ms as f64 / 10_000.0,
            overdue_ms: 0,
        }
    }

    // -------------------------------------------------------------------------
    // Command parsing
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("   "), None);
        assert_eq!(parse_command("1"), Some(UserCommand::SelectIndex(0)));
        assert_eq!(parse_command(" 9 "), Some(UserCommand::SelectIndex(8)));
        assert_eq!(parse_command("s"), Some(UserCommand::Submit));
        assert_eq!(parse_command("SUBMIT"), Some(UserCommand::Submit));
        assert_eq!(parse_command("q"), Some(UserCommand::Quit));
        assert_eq!(parse_command("?"), Some(UserCommand::Help));
    }

    #[test]
    fn test_parse_other_input_is_key() {
        assert_eq!(
            parse_command("b"),
            Some(UserCommand::SelectKey("b".to_string()))
        );
        // Out of the positional range
        assert_eq!(
            parse_command("10"),
            Some(UserCommand::SelectKey("10".to_string()))
        );
        assert_eq!(
            parse_command("0"),
            Some(UserCommand::SelectKey("0".to_string()))
        );
    }

    // -------------------------------------------------------------------------
    // Rendering
    // -------------------------------------------------------------------------

    #[test]
    fn test_question_block_lists_options() {
        let renderer = ConsoleRenderer::plain(CountdownSettings::default());
        let block = renderer.question_block(&question());
        assert!(block.contains("Capital of France?"));
        assert!(block.contains("1) [a] Paris"));
        assert!(block.contains("2) [b] Lyon"));
        assert!(block.contains("Answer by "));
    }

    #[test]
    fn test_countdown_line_plain() {
        let settings = CountdownSettings {
            bar_width: 10,
            ..CountdownSettings::default()
        };
        let renderer = ConsoleRenderer::plain(settings);
        let line = renderer.countdown_line(&remaining(5_000), 10_000, ViewState::Question);
        assert_eq!(line, "[#####-----] 0:05");

        let line = renderer.countdown_line(&remaining(0), 10_000, ViewState::Locked);
        assert_eq!(line, "[----------] 0:00 locked");
    }

    #[test]
    fn test_countdown_line_colored() {
        let renderer = ConsoleRenderer::new(CountdownSettings::default());
        let line = renderer.countdown_line(&remaining(9_000), 10_000, ViewState::Question);
        assert!(line.contains("\x1b[38;2;128;255;128m"));
        assert!(line.contains(ANSI_RESET));
    }

    #[test]
    fn test_describe_feedback() {
        let renderer = ConsoleRenderer::plain(CountdownSettings::default());
        let mut snap = snapshot();
        snap.view = ViewState::Feedback;
        snap.score = 1500;
        snap.last_outcome = Some(QuestionOutcome {
            question_id: Some("q1".to_string()),
            correct_option_key: "a".to_string(),
            selected_option_key: Some("a".to_string()),
            applied_delta: 500,
        });
        let change = SessionChange::ViewChanged {
            from: ViewState::Locked,
            to: ViewState::Feedback,
        };
        assert_eq!(
            renderer.describe_change(&change, &snap).as_deref(),
            Some("Correct. Correct answer: a (+500), score 1500")
        );
    }

    #[test]
    fn test_describe_lock_source() {
        let renderer = ConsoleRenderer::plain(CountdownSettings::default());
        let change = SessionChange::ViewChanged {
            from: ViewState::Question,
            to: ViewState::Locked,
        };
        let mut snap = snapshot();
        snap.lock = Some(LockSource::LocalFallback);
        assert_eq!(
            renderer.describe_change(&change, &snap).as_deref(),
            Some("Time is up.")
        );
        snap.lock = Some(LockSource::Server);
        assert_eq!(
            renderer.describe_change(&change, &snap).as_deref(),
            Some("Answers locked.")
        );
    }

    #[test]
    fn test_describe_leaderboard() {
        let renderer = ConsoleRenderer::plain(CountdownSettings::default());
        let mut snap = snapshot();
        snap.standings = Some(Standings {
            top: vec![LeaderboardEntry {
                name: "Bob".to_string(),
                score: 2000,
            }],
            reported_score: 0,
        });
        let text = renderer
            .describe_change(&SessionChange::LeaderboardUpdated, &snap)
            .unwrap();
        assert_eq!(text, "Leaderboard:\n  1. Bob 2000");
    }

    #[test]
    fn test_ignored_events_are_silent() {
        let renderer = ConsoleRenderer::plain(CountdownSettings::default());
        let change = SessionChange::EventIgnored {
            kind: crate::core::protocol::EventKind::QuestionLock,
            view: ViewState::Lobby,
        };
        assert!(renderer.describe_change(&change, &snapshot()).is_none());
    }

    #[test]
    fn test_format_deadline_out_of_range() {
        assert!(format_deadline(1_700_000_000_000).is_some());
        assert!(format_deadline(i64::MAX).is_none());
    }
}
