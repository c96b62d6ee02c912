//! Core module - platform-independent quiz engine

pub mod clock;
pub mod color;
pub mod constants;
pub mod countdown;
pub mod format;
pub mod protocol;
pub mod scripted;
pub mod session;
pub mod supervisor;
pub mod ticker;
pub mod transport;
pub mod types;

pub use clock::{ClockReconciler, ClockSample, ManualClock, MonotonicClock, Remaining, SystemClock};
pub use color::parse_hex_color;
pub use countdown::{render_countdown, CountdownThresholds, CountdownView, Urgency};
pub use format::{format_countdown, format_delta};
pub use protocol::{ClientMessage, EventKind, ServerEvent};
pub use scripted::{ScriptHandle, ScriptedTransport};
pub use session::{EngineSettings, LockSource, QuizSession, SessionChange, SessionSnapshot};
pub use transport::{ConnectionStatus, TransportAdapter};
pub use types::{ActiveQuestion, AnswerSelection, Session, ViewState};
