//! Quiz session - the live-quiz state machine
//!
//! QuizSession owns one participant's view of a quiz run. It consumes
//! protocol events from a [`TransportAdapter`], reduces them into a single
//! canonical state, and exposes read-only accessors plus the two user
//! actions (select, submit).
//!
//! All mutation happens on the caller's thread inside [`QuizSession::pump`],
//! [`QuizSession::frame`] or the action methods. Transport handlers never
//! touch the state directly; they only queue into the session's inbox.
//!
//! Events that arrive in a view where they are not legal are ignored, never
//! raised, so duplicated or reordered delivery cannot break the session.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::core::clock::{ClockReconciler, ClockSample, MonotonicClock, Remaining};
use crate::core::constants::DEFAULT_FALLBACK_GRACE_MS;
use crate::core::protocol::{EventKind, QuestionPayload, ServerEvent};
use crate::core::supervisor::{ConnectionSupervisor, DeadlineVerdict};
use crate::core::ticker::CountdownTicker;
use crate::core::transport::{ConnectionStatus, SubscriptionId, TransportAdapter};
use crate::core::types::{
    ActiveQuestion, AnswerSelection, QuestionOutcome, Session, Standings, ViewState,
};

// =============================================================================
// SETTINGS
// =============================================================================

/// Tunables for the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Grace window after the deadline before the local fallback lock
    pub fallback_grace_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            fallback_grace_ms: DEFAULT_FALLBACK_GRACE_MS,
        }
    }
}

// =============================================================================
// SESSION CHANGES
// =============================================================================

/// Who locked the current question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockSource {
    /// `question_lock` received while answering
    Server,
    /// Countdown ran out first
    LocalFallback,
}

/// Changes reported by the session for UI updates and logging
#[derive(Debug, Clone, PartialEq)]
pub enum SessionChange {
    /// The view moved
    ViewChanged { from: ViewState, to: ViewState },
    /// A new question replaced the previous one
    QuestionInstalled { question_id: String },
    /// The score increased
    ScoreChanged { score: u64, delta: u64 },
    /// The countdown expired without a server lock
    FallbackLock { question_id: String },
    /// Connection status changed
    ConnectionChanged(ConnectionStatus),
    /// New standings received
    LeaderboardUpdated,
    /// An event arrived in a view where it is not legal
    EventIgnored { kind: EventKind, view: ViewState },
}

/// Owned, read-only copy of everything the UI renders
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session: Option<Session>,
    pub view: ViewState,
    pub question: Option<ActiveQuestion>,
    pub selection: AnswerSelection,
    pub score: u64,
    pub connection: ConnectionStatus,
    /// Countdown as of the last frame (timed views only)
    pub remaining: Option<Remaining>,
    pub lock: Option<LockSource>,
    pub last_outcome: Option<QuestionOutcome>,
    pub standings: Option<Standings>,
}

// =============================================================================
// QUIZ SESSION
// =============================================================================

enum Inbound {
    Event(ServerEvent),
    Status(ConnectionStatus),
}

type Inbox = Rc<RefCell<VecDeque<Inbound>>>;

/// Single-writer state machine for one participant
pub struct QuizSession<T: TransportAdapter, C: MonotonicClock> {
    transport: T,
    transport_open: bool,
    clock: C,
    settings: EngineSettings,
    supervisor: ConnectionSupervisor,
    ticker: CountdownTicker,
    inbox: Inbox,
    subscriptions: Vec<(EventKind, SubscriptionId)>,
    status_subscription: Option<SubscriptionId>,

    session: Option<Session>,
    view: ViewState,
    question: Option<ActiveQuestion>,
    reconciler: Option<ClockReconciler>,
    selection: AnswerSelection,
    score: u64,
    lock: Option<LockSource>,
    last_remaining: Option<Remaining>,
    last_outcome: Option<QuestionOutcome>,
    standings: Option<Standings>,
}

impl<T: TransportAdapter, C: MonotonicClock> QuizSession<T, C> {
    pub fn new(transport: T, clock: C, settings: EngineSettings) -> Self {
        Self {
            transport,
            transport_open: false,
            clock,
            settings,
            supervisor: ConnectionSupervisor::new(settings.fallback_grace_ms),
            ticker: CountdownTicker::new(),
            inbox: Rc::new(RefCell::new(VecDeque::new())),
            subscriptions: Vec::new(),
            status_subscription: None,
            session: None,
            view: ViewState::Lobby,
            question: None,
            reconciler: None,
            selection: AnswerSelection::default(),
            score: 0,
            lock: None,
            last_remaining: None,
            last_outcome: None,
            standings: None,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn view(&self) -> ViewState {
        self.view
    }

    pub fn question(&self) -> Option<&ActiveQuestion> {
        self.question.as_ref()
    }

    pub fn selection(&self) -> &AnswerSelection {
        &self.selection
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.supervisor.status()
    }

    pub fn lock_source(&self) -> Option<LockSource> {
        self.lock
    }

    pub fn last_outcome(&self) -> Option<&QuestionOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn standings(&self) -> Option<&Standings> {
        self.standings.as_ref()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn reconciler(&self) -> Option<ClockReconciler> {
        self.reconciler
    }

    pub fn ticker(&self) -> &CountdownTicker {
        &self.ticker
    }

    /// Whether the host loop should render countdown frames
    pub fn is_frame_scheduled(&self) -> bool {
        self.ticker.is_scheduled()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Remaining time right now; `None` outside the timed views
    pub fn remaining(&self) -> Option<Remaining> {
        if !self.view.is_timed() {
            return None;
        }
        self.reconciler
            .map(|reconciler| reconciler.remaining(self.clock.now_ms()))
    }

    /// Remaining time computed by the last frame
    pub fn last_remaining(&self) -> Option<Remaining> {
        self.last_remaining
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session: self.session.clone(),
            view: self.view,
            question: self.question.clone(),
            selection: self.selection.clone(),
            score: self.score,
            connection: self.supervisor.status(),
            remaining: self.last_remaining,
            lock: self.lock,
            last_outcome: self.last_outcome.clone(),
            standings: self.standings.clone(),
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Join a session, replacing any previous one
    ///
    /// Generates a fresh participant id, resets the score and opens the
    /// transport. Nothing from a previous session survives.
    pub fn join(&mut self, session_id: &str, display_name: &str) -> Session {
        if let Some(previous) = &self.session {
            info!(
                session_id = %previous.session_id,
                "[SESSION] Replacing previous session"
            );
        }
        self.teardown();

        let session = Session::new(session_id, display_name);
        self.view = ViewState::Lobby;
        self.question = None;
        self.reconciler = None;
        self.selection = AnswerSelection::default();
        self.score = 0;
        self.lock = None;
        self.last_remaining = None;
        self.last_outcome = None;
        self.standings = None;
        self.ticker.sync(self.view);
        self.supervisor.reset();

        for kind in EventKind::ALL {
            let inbox = Rc::clone(&self.inbox);
            let id = self.transport.on(
                kind,
                Box::new(move |event: &ServerEvent| {
                    inbox.borrow_mut().push_back(Inbound::Event(event.clone()));
                }),
            );
            self.subscriptions.push((kind, id));
        }
        let inbox = Rc::clone(&self.inbox);
        self.status_subscription = Some(self.transport.on_status(Box::new(
            move |status: ConnectionStatus| {
                inbox.borrow_mut().push_back(Inbound::Status(status));
            },
        )));

        info!(
            session_id = %session.session_id,
            participant_id = %session.participant_id,
            display_name = %session.display_name,
            "[SESSION] Joining"
        );
        self.transport.connect(
            &session.session_id,
            &session.participant_id,
            &session.display_name,
        );
        self.transport_open = true;
        self.session = Some(session.clone());
        session
    }

    /// Close the transport; the last known view stays on screen
    pub fn disconnect(&mut self) {
        self.unsubscribe_all();
        if self.transport_open {
            self.transport.disconnect();
            self.transport_open = false;
            info!("[SESSION] Disconnected");
        }
        self.inbox.borrow_mut().clear();
        self.supervisor.observe_status(ConnectionStatus::Disconnected);
    }

    fn unsubscribe_all(&mut self) {
        for (kind, id) in self.subscriptions.drain(..) {
            self.transport.off(kind, id);
        }
        if let Some(id) = self.status_subscription.take() {
            self.transport.off_status(id);
        }
    }

    fn teardown(&mut self) {
        self.unsubscribe_all();
        if self.transport_open {
            self.transport.disconnect();
            self.transport_open = false;
        }
        self.ticker.cancel();
        self.inbox.borrow_mut().clear();
    }

    // -------------------------------------------------------------------------
    // User actions
    // -------------------------------------------------------------------------

    /// Choose an option for the active question
    ///
    /// No-op (returns false) unless answering is open and the key belongs to
    /// the active question.
    pub fn select_answer(&mut self, option_key: &str) -> bool {
        if self.view != ViewState::Question || self.selection.submitted {
            debug!(view = %self.view, option_key, "[SESSION] Selection ignored");
            return false;
        }
        let known = self
            .question
            .as_ref()
            .is_some_and(|q| q.has_option(option_key));
        if !known {
            debug!(option_key, "[SESSION] Selection of unknown option ignored");
            return false;
        }
        if self.deadline_passed() {
            debug!(option_key, "[SESSION] Selection after deadline ignored");
            return false;
        }
        self.selection.option_key = Some(option_key.to_string());
        true
    }

    /// Submit the selected option (at most once per question)
    pub fn submit_answer(&mut self) -> bool {
        if self.view != ViewState::Question || self.selection.submitted {
            debug!(view = %self.view, "[SESSION] Submit ignored");
            return false;
        }
        let Some(option_key) = self.selection.option_key.clone() else {
            debug!("[SESSION] Submit without selection ignored");
            return false;
        };
        if self.deadline_passed() {
            debug!(option_key = %option_key, "[SESSION] Submit after deadline ignored");
            return false;
        }
        self.selection.submitted = true;
        info!(option_key = %option_key, "[SESSION] Submitting answer");
        self.transport.send_answer(&option_key);
        true
    }

    // The grace window only delays the view change; answering closes at the deadline
    fn deadline_passed(&self) -> bool {
        self.remaining().is_some_and(|r| r.is_expired())
    }

    // -------------------------------------------------------------------------
    // Event loop
    // -------------------------------------------------------------------------

    /// Pump inbound traffic, then run one countdown frame
    pub fn update(&mut self) -> Vec<SessionChange> {
        let mut changes = self.pump();
        changes.extend(self.frame());
        changes
    }

    /// Deliver and apply everything the transport has queued
    pub fn pump(&mut self) -> Vec<SessionChange> {
        let mut changes = Vec::new();
        self.transport.dispatch_pending();
        loop {
            let next = self.inbox.borrow_mut().pop_front();
            match next {
                Some(Inbound::Event(event)) => self.apply_event(event, &mut changes),
                Some(Inbound::Status(status)) => {
                    if let Some(status) = self.supervisor.observe_status(status) {
                        changes.push(SessionChange::ConnectionChanged(status));
                    }
                }
                None => break,
            }
        }
        changes
    }

    /// One countdown frame; does nothing unless the ticker is scheduled
    pub fn frame(&mut self) -> Vec<SessionChange> {
        let mut changes = Vec::new();
        if !self.ticker.tick() {
            return changes;
        }
        let Some(reconciler) = self.reconciler else {
            return changes;
        };

        let remaining = reconciler.remaining(self.clock.now_ms());
        self.last_remaining = Some(remaining);

        if self.supervisor.watch_deadline(self.view, &remaining) == DeadlineVerdict::FallbackLock {
            let question_id = self
                .question
                .as_ref()
                .map(|q| q.id.clone())
                .unwrap_or_default();
            info!(
                question_id = %question_id,
                overdue_ms = remaining.overdue_ms,
                "[SESSION] No server lock before deadline, locking locally"
            );
            self.lock = Some(LockSource::LocalFallback);
            changes.push(SessionChange::FallbackLock { question_id });
            self.set_view(ViewState::Locked, &mut changes);
        }
        changes
    }

    fn apply_event(&mut self, event: ServerEvent, changes: &mut Vec<SessionChange>) {
        match event {
            ServerEvent::SessionStarted => {
                if self.view == ViewState::Lobby {
                    debug!("[SESSION] Session started");
                } else {
                    self.ignore(EventKind::SessionStarted, changes);
                }
            }
            ServerEvent::Question {
                question,
                ends_at,
                server_now,
            } => self.on_question(question, ends_at, server_now, changes),
            ServerEvent::QuestionLock { server_now } => self.on_lock(server_now, changes),
            ServerEvent::QuestionResult {
                correct_option_key,
                score_delta,
            } => self.on_result(correct_option_key, score_delta, changes),
            ServerEvent::Leaderboard { top, score } => {
                debug!(entries = top.len(), score, "[SESSION] Leaderboard received");
                self.standings = Some(Standings {
                    top,
                    reported_score: score,
                });
                changes.push(SessionChange::LeaderboardUpdated);
            }
            ServerEvent::SessionEnd => {
                if self.view == ViewState::End {
                    self.ignore(EventKind::SessionEnd, changes);
                    return;
                }
                info!(score = self.score, "[SESSION] Session ended");
                self.question = None;
                self.reconciler = None;
                self.lock = None;
                self.set_view(ViewState::End, changes);
            }
        }
    }

    fn on_question(
        &mut self,
        payload: QuestionPayload,
        ends_at: i64,
        server_now: i64,
        changes: &mut Vec<SessionChange>,
    ) {
        if self.question.as_ref().is_some_and(|q| q.id == payload.id) {
            debug!(question_id = %payload.id, "[SESSION] Duplicate question");
            self.ignore(EventKind::Question, changes);
            return;
        }

        let legal = matches!(
            self.view,
            ViewState::Lobby | ViewState::Feedback | ViewState::Leaderboard
        );
        let resync = !legal && self.view != ViewState::End && self.supervisor.resync_pending();
        if !legal && !resync {
            self.ignore(EventKind::Question, changes);
            return;
        }
        if resync {
            info!(
                view = %self.view,
                question_id = %payload.id,
                "[SESSION] Accepting question after reconnect"
            );
        }
        self.supervisor.clear_resync();

        let question = ActiveQuestion::from_payload(payload, ends_at, server_now);
        let sample = ClockSample::capture(server_now, &self.clock);
        self.reconciler = Some(ClockReconciler::new(sample, &question));
        self.selection = AnswerSelection::default();
        self.lock = None;
        self.last_remaining = None;

        info!(
            question_id = %question.id,
            options = question.options.len(),
            window_ms = question.window_ms(),
            "[SESSION] Question installed"
        );
        changes.push(SessionChange::QuestionInstalled {
            question_id: question.id.clone(),
        });
        self.question = Some(question);
        self.set_view(ViewState::Question, changes);
    }

    fn on_lock(&mut self, server_now: i64, changes: &mut Vec<SessionChange>) {
        match (self.view, self.lock) {
            (ViewState::Question, _) => {
                let sample = ClockSample::capture(server_now, &self.clock);
                self.reconciler = self.reconciler.map(|r| r.reanchor(sample));
                debug!(server_now, "[CLOCK] Re-anchored on server lock");
                self.lock = Some(LockSource::Server);
                self.set_view(ViewState::Locked, changes);
            }
            (ViewState::Locked, Some(LockSource::LocalFallback)) => {
                debug!("[SESSION] Server lock confirms local fallback lock");
            }
            _ => self.ignore(EventKind::QuestionLock, changes),
        }
    }

    fn on_result(
        &mut self,
        correct_option_key: String,
        score_delta: i64,
        changes: &mut Vec<SessionChange>,
    ) {
        if self.view != ViewState::Locked {
            self.ignore(EventKind::QuestionResult, changes);
            return;
        }

        let applied = u64::try_from(score_delta).unwrap_or_else(|_| {
            warn!(score_delta, "[SESSION] Negative score delta clamped to zero");
            0
        });
        self.score = self.score.saturating_add(applied);

        let selected_option_key = if self.selection.submitted {
            self.selection.option_key.clone()
        } else {
            None
        };
        let outcome = QuestionOutcome {
            question_id: self.question.as_ref().map(|q| q.id.clone()),
            correct_option_key,
            selected_option_key,
            applied_delta: applied,
        };
        info!(
            correct = outcome.is_correct(),
            delta = applied,
            score = self.score,
            "[SESSION] Question result"
        );
        self.last_outcome = Some(outcome);

        if applied > 0 {
            changes.push(SessionChange::ScoreChanged {
                score: self.score,
                delta: applied,
            });
        }
        self.set_view(ViewState::Feedback, changes);
    }

    fn ignore(&self, kind: EventKind, changes: &mut Vec<SessionChange>) {
        debug!(event = %kind, view = %self.view, "[SESSION] Ignoring event");
        changes.push(SessionChange::EventIgnored {
            kind,
            view: self.view,
        });
    }

    fn set_view(&mut self, to: ViewState, changes: &mut Vec<SessionChange>) {
        let from = self.view;
        if from == to {
            return;
        }
        self.view = to;
        self.ticker.sync(to);
        if !to.is_timed() {
            self.last_remaining = None;
        }
        debug!(from = %from, to = %to, "[SESSION] View changed");
        changes.push(SessionChange::ViewChanged { from, to });
    }
}

impl<T: TransportAdapter, C: MonotonicClock> Drop for QuizSession<T, C> {
    fn drop(&mut self) {
        self.teardown();
    }
}

// =============================================================================
// TESTS
// =============================================================================
