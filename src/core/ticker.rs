//! Countdown ticker
//!
//! Cooperative per-frame scheduling for the countdown. The ticker is armed
//! only while the view shows a countdown (question, locked) and cancelled on
//! every other view and on teardown; the host loop asks it whether a frame
//! is due instead of owning a timer itself.

use super::types::ViewState;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CountdownTicker {
    scheduled: bool,
    ticks: u64,
    schedules: u64,
    cancels: u64,
}

impl CountdownTicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm or cancel according to `view`; returns whether a frame is scheduled
    pub fn sync(&mut self, view: ViewState) -> bool {
        if view.is_timed() {
            self.schedule();
        } else {
            self.cancel();
        }
        self.scheduled
    }

    pub fn schedule(&mut self) {
        if !self.scheduled {
            self.scheduled = true;
            self.schedules += 1;
        }
    }

    pub fn cancel(&mut self) {
        if self.scheduled {
            self.scheduled = false;
            self.cancels += 1;
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    /// Consume one frame; false (and nothing recorded) when not scheduled
    pub fn tick(&mut self) -> bool {
        if self.scheduled {
            self.ticks += 1;
        }
        self.scheduled
    }

    /// Frames run since creation
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn schedules(&self) -> u64 {
        self.schedules
    }

    pub fn cancels(&self) -> u64 {
        self.cancels
    }
}
