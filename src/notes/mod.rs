//! Falling-notes timing engine: note models, session counters and the
//! manager that advances and grades them.

mod event;
mod manager;
mod stats;

pub use event::{NoteEvent, NoteId, NoteState, Transition, accuracy_for};
pub use manager::{Hit, NoteView, NotesManager, ScheduleReport};
pub use stats::{SessionStats, StatsSnapshot};

use crate::error::ScheduleError;

pub const MAX_PITCH: u8 = 127;

/// A note as delivered by the file parser or an exercise generator, in
/// seconds relative to the start of the piece.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceNote {
    pub start: f64,
    pub end: f64,
    pub pitch: u8,
    pub velocity: u8,
}

impl SourceNote {
    pub fn new(start: f64, end: f64, pitch: u8, velocity: u8) -> Self {
        Self {
            start,
            end,
            pitch,
            velocity,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn shifted(&self, offset: f64) -> Self {
        Self {
            start: self.start + offset,
            end: self.end + offset,
            ..*self
        }
    }

    pub fn validate(&self) -> Result<(), ScheduleError> {
        if !self.start.is_finite() || !self.end.is_finite() {
            return Err(ScheduleError::NonFiniteTime);
        }
        if self.end <= self.start {
            return Err(ScheduleError::NonPositiveDuration {
                start: self.start,
                end: self.end,
            });
        }
        if self.pitch > MAX_PITCH {
            return Err(ScheduleError::PitchOutOfRange(self.pitch));
        }
        if self.velocity > MAX_PITCH {
            return Err(ScheduleError::VelocityOutOfRange(self.velocity));
        }
        Ok(())
    }
}
