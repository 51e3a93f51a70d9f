//! Glue between the wall clock, the input devices and the notes manager.

use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::PracticeConfig;
use crate::events::{InputEvent, KeyAction};
use crate::metrics::{Grade, PerformanceMetrics};
use crate::error::ConfigError;
use crate::notes::{
    Hit, NoteEvent, NoteState, NoteView, NotesManager, ScheduleReport, SourceNote, StatsSnapshot,
};

/// How long resolved notes stay on screen, in seconds.
const FADE_SECONDS: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq)]
enum ClockState {
    Stopped,
    Playing { started: Instant, offset: f64 },
    Paused { position: f64 },
}

/// Song position in seconds, driven by `Instant`s handed in by the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackClock {
    state: ClockState,
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self {
            state: ClockState::Stopped,
        }
    }
}

impl PlaybackClock {
    pub fn play_at(&mut self, now: Instant) {
        let offset = match self.state {
            ClockState::Playing { .. } => return,
            ClockState::Stopped => 0.0,
            ClockState::Paused { position } => position,
        };
        self.state = ClockState::Playing {
            started: now,
            offset,
        };
    }

    pub fn pause_at(&mut self, now: Instant) {
        if let ClockState::Playing { .. } = self.state {
            self.state = ClockState::Paused {
                position: self.position_at(now),
            };
        }
    }

    pub fn stop(&mut self) {
        self.state = ClockState::Stopped;
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, ClockState::Playing { .. })
    }

    /// Instants before the clock was started count as the start itself.
    pub fn position_at(&self, now: Instant) -> f64 {
        match self.state {
            ClockState::Stopped => 0.0,
            ClockState::Paused { position } => position,
            ClockState::Playing { started, offset } => {
                offset + now.saturating_duration_since(started).as_secs_f64()
            }
        }
    }
}

/// A resolved note kept around briefly so the player sees the verdict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadingNote {
    pub view: NoteView,
    pub resolved_at: f64,
}

impl FadingNote {
    /// Opacity in `[0, 1]` at song position `now`.
    pub fn alpha(&self, now: f64) -> f32 {
        (1.0 - (now - self.resolved_at) / FADE_SECONDS).clamp(0.0, 1.0) as f32
    }
}

pub struct PracticeSession {
    manager: NotesManager,
    metrics: PerformanceMetrics,
    clock: PlaybackClock,
    source: Vec<SourceNote>,
    pressed: BTreeSet<u8>,
    fading: Vec<FadingNote>,
    last_hit: Option<(Hit, Grade)>,
    completed: bool,
}

impl PracticeSession {
    pub fn new(config: PracticeConfig) -> Self {
        Self {
            manager: NotesManager::new(config),
            metrics: PerformanceMetrics::default(),
            clock: PlaybackClock::default(),
            source: Vec::new(),
            pressed: BTreeSet::new(),
            fading: Vec::new(),
            last_hit: None,
            completed: false,
        }
    }

    /// Replaces the piece and rewinds. An empty piece keeps the current one.
    pub fn load(&mut self, notes: Vec<SourceNote>) -> ScheduleReport {
        if notes.is_empty() {
            debug!("ignoring empty piece");
            return ScheduleReport::default();
        }
        self.source = notes;
        self.rewind()
    }

    pub fn play(&mut self, now: Instant) {
        if self.completed {
            self.rewind();
        }
        self.clock.play_at(now);
        info!(position = self.clock.position_at(now), "playback started");
    }

    pub fn pause(&mut self, now: Instant) {
        self.clock.pause_at(now);
        info!(position = self.clock.position_at(now), "playback paused");
    }

    /// Stops playback and reschedules the piece from the top.
    pub fn stop(&mut self) {
        self.rewind();
        info!("playback stopped");
    }

    fn rewind(&mut self) -> ScheduleReport {
        self.clock.stop();
        self.metrics.reset();
        self.fading.clear();
        self.last_hit = None;
        self.completed = false;
        self.manager.reset();
        self.manager.schedule_from_source(&self.source, 0.0)
    }

    pub fn set_config(&mut self, config: PracticeConfig) -> Result<(), ConfigError> {
        self.manager.set_config(config)
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_playing()
    }

    /// True once every note of a loaded piece has been resolved.
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn position(&self, now: Instant) -> f64 {
        self.clock.position_at(now)
    }

    /// Advances the notes to the clock position. Returns the notes resolved
    /// by this tick.
    pub fn tick(&mut self, now: Instant) -> Vec<NoteEvent> {
        if !self.clock.is_playing() {
            return Vec::new();
        }
        let position = self.clock.position_at(now);
        let resolved = self.manager.advance(position);

        for note in &resolved {
            if note.state() == NoteState::Missed {
                self.metrics.note_missed();
            }
            self.fading.push(FadingNote {
                view: self.manager.view(note),
                resolved_at: position,
            });
        }
        self.fading
            .retain(|fade| position - fade.resolved_at < FADE_SECONDS);

        if !self.completed && !self.source.is_empty() && self.manager.is_empty() {
            self.completed = true;
            let stats = self.manager.stats();
            info!(
                hit = stats.hit,
                missed = stats.missed,
                score = self.metrics.score(),
                "piece complete"
            );
        }
        resolved
    }

    pub fn handle(&mut self, event: &InputEvent) -> Option<(Hit, Grade)> {
        match event.action {
            KeyAction::Press => self.press(event),
            KeyAction::Release => {
                self.release(event);
                None
            }
        }
    }

    /// Marks the key as held and, while playing, grades it at the instant
    /// the device reported it.
    pub fn press(&mut self, event: &InputEvent) -> Option<(Hit, Grade)> {
        self.pressed.insert(event.pitch);
        if !self.clock.is_playing() {
            return None;
        }

        let position = self.clock.position_at(event.received);
        let hit = self.manager.register_input(event.pitch, position)?;
        let grade = self.metrics.note_hit(hit.timing_error_ms);
        self.last_hit = Some((hit, grade));
        Some((hit, grade))
    }

    pub fn release(&mut self, event: &InputEvent) {
        self.pressed.remove(&event.pitch);
    }

    pub fn pressed(&self) -> &BTreeSet<u8> {
        &self.pressed
    }

    pub fn last_hit(&self) -> Option<(Hit, Grade)> {
        self.last_hit
    }

    pub fn fading(&self) -> &[FadingNote] {
        &self.fading
    }

    pub fn manager(&self) -> &NotesManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut NotesManager {
        &mut self.manager
    }

    pub fn metrics(&self) -> &PerformanceMetrics {
        &self.metrics
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.manager.stats()
    }
}

impl Default for PracticeSession {
    fn default() -> Self {
        Self::new(PracticeConfig::default())
    }
}
