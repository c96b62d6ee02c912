//! Quiz runner - main loop for the console client
//!
//! Joins the configured session, then loops at the frame interval: apply
//! user commands, pump the session, print announcements and redraw the
//! countdown while it is scheduled.

use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;
use tracing::info;

use super::console::{ConsoleRenderer, UserCommand, HELP_TEXT};
use crate::core::clock::MonotonicClock;
use crate::core::session::QuizSession;
use crate::core::transport::TransportAdapter;
use crate::core::types::ViewState;

/// Whether the loop keeps going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerControl {
    Continue,
    Stop,
}

pub struct QuizRunner<T: TransportAdapter, C: MonotonicClock> {
    session: QuizSession<T, C>,
    renderer: ConsoleRenderer,
    commands: Receiver<UserCommand>,
    frame_interval: Duration,
    // A countdown line is on screen without a trailing newline
    countdown_drawn: bool,
}

impl<T: TransportAdapter, C: MonotonicClock> QuizRunner<T, C> {
    pub fn new(
        session: QuizSession<T, C>,
        renderer: ConsoleRenderer,
        commands: Receiver<UserCommand>,
        frame_interval: Duration,
    ) -> Self {
        Self {
            session,
            renderer,
            commands,
            frame_interval,
            countdown_drawn: false,
        }
    }

    pub fn session(&self) -> &QuizSession<T, C> {
        &self.session
    }

    /// Join and loop until quit or session end
    pub fn run(&mut self, session_id: &str, display_name: &str) -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.start(session_id, display_name, &mut out)?;
        while self.step(&mut out)? == RunnerControl::Continue {
            thread::sleep(self.frame_interval);
        }
        self.session.disconnect();
        info!(score = self.session.score(), "[RUNNER] Stopped");
        Ok(())
    }

    pub fn start(
        &mut self,
        session_id: &str,
        display_name: &str,
        out: &mut impl Write,
    ) -> io::Result<()> {
        let session = self.session.join(session_id, display_name);
        writeln!(
            out,
            "Joining {} as {}...",
            session.session_id, session.display_name
        )?;
        writeln!(out, "{}", HELP_TEXT)
    }

    /// One loop iteration
    pub fn step(&mut self, out: &mut impl Write) -> io::Result<RunnerControl> {
        while let Ok(command) = self.commands.try_recv() {
            if self.apply_command(command, out)? == RunnerControl::Stop {
                return Ok(RunnerControl::Stop);
            }
        }

        let changes = self.session.update();
        if !changes.is_empty() {
            let snapshot = self.session.snapshot();
            for change in &changes {
                if let Some(text) = self.renderer.describe_change(change, &snapshot) {
                    self.end_countdown_line(out)?;
                    writeln!(out, "{}", text)?;
                }
            }
        }

        if self.session.is_frame_scheduled() {
            if let (Some(remaining), Some(reconciler)) =
                (self.session.last_remaining(), self.session.reconciler())
            {
                let line =
                    self.renderer
                        .countdown_line(&remaining, reconciler.window_ms(), self.session.view());
                write!(out, "\r{}\x1b[K", line)?;
                self.countdown_drawn = true;
            }
        } else {
            self.end_countdown_line(out)?;
        }
        out.flush()?;

        if self.session.view() == ViewState::End {
            return Ok(RunnerControl::Stop);
        }
        Ok(RunnerControl::Continue)
    }

    pub fn apply_command(
        &mut self,
        command: UserCommand,
        out: &mut impl Write,
    ) -> io::Result<RunnerControl> {
        self.end_countdown_line(out)?;
        match command {
            UserCommand::SelectIndex(index) => {
                let key = self
                    .session
                    .question()
                    .and_then(|q| q.options.get(index))
                    .map(|o| o.key.clone());
                match key {
                    Some(key) => self.select(&key, out)?,
                    None => writeln!(out, "No option {}.", index + 1)?,
                }
            }
            UserCommand::SelectKey(key) => self.select(&key, out)?,
            UserCommand::Submit => {
                if self.session.submit_answer() {
                    writeln!(out, "Answer submitted.")?;
                } else {
                    writeln!(out, "Nothing to submit.")?;
                }
            }
            UserCommand::Help => writeln!(out, "{}", HELP_TEXT)?,
            UserCommand::Quit => return Ok(RunnerControl::Stop),
        }
        Ok(RunnerControl::Continue)
    }

    fn select(&mut self, key: &str, out: &mut impl Write) -> io::Result<()> {
        if self.session.select_answer(key) {
            let label = self
                .session
                .question()
                .and_then(|q| q.option_label(key))
                .unwrap_or_default();
            writeln!(out, "Selected [{}] {}. Press s to submit.", key, label)
        } else {
            writeln!(out, "Cannot select {} now.", key)
        }
    }

    fn end_countdown_line(&mut self, out: &mut impl Write) -> io::Result<()> {
        if self.countdown_drawn {
            self.countdown_drawn = false;
            writeln!(out)?;
        }
        Ok(())
    }
}
