use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use super::event::{NoteEvent, NoteId, NoteState, Transition};
use super::stats::{SessionStats, StatsSnapshot};
use super::{MAX_PITCH, SourceNote};
use crate::config::PracticeConfig;
use crate::error::{ConfigError, ScheduleError};

/// Shortest block drawn for very short notes, in pixels.
const MIN_NOTE_HEIGHT: f32 = 20.0;
const DEFAULT_TARGET_LINE_Y: f32 = 450.0;

/// A successful press.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub id: NoteId,
    pub pitch: u8,
    pub timing_error_ms: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleReport {
    pub accepted: usize,
    /// Index into the source batch and the reason it was skipped.
    pub rejected: Vec<(usize, ScheduleError)>,
}

/// What the renderer needs to draw one note.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteView {
    pub id: NoteId,
    pub pitch: u8,
    pub velocity: u8,
    pub state: NoteState,
    /// `None` until the note has been positioned.
    pub vertical_position: Option<f64>,
    /// Screen y of the note's leading (bottom) edge.
    pub y: Option<f32>,
    pub height: f32,
}

pub struct NotesManager {
    config: PracticeConfig,
    notes: Vec<NoteEvent>,
    stats: SessionStats,
    next_id: u64,
    target_line_y: f32,
}

impl NotesManager {
    /// An invalid `config` is logged and replaced by the defaults.
    pub fn new(config: PracticeConfig) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                warn!("invalid practice config, using defaults: {}", e);
                PracticeConfig::default()
            }
        };
        Self {
            config,
            notes: Vec::new(),
            stats: SessionStats::default(),
            next_id: 0,
            target_line_y: DEFAULT_TARGET_LINE_Y,
        }
    }

    pub fn config(&self) -> &PracticeConfig {
        &self.config
    }

    /// Applies new timing constants; active notes are re-evaluated on the
    /// next [`advance`](Self::advance). An invalid config is rejected and
    /// the current one kept.
    pub fn set_config(&mut self, config: PracticeConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn target_line_y(&self) -> f32 {
        self.target_line_y
    }

    pub fn set_target_line(&mut self, y: f32) {
        self.target_line_y = y;
    }

    /// Active notes, ordered by scheduled start.
    pub fn notes(&self) -> &[NoteEvent] {
        &self.notes
    }

    pub fn get(&self, id: NoteId) -> Option<&NoteEvent> {
        self.notes.iter().find(|n| n.id == id)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Drops every note and starts a fresh session.
    pub fn reset(&mut self) {
        self.notes.clear();
        self.stats.reset();
        info!("notes manager reset");
    }

    /// Replaces the session with one note per valid tuple, shifted by
    /// `time_offset` plus the lead-in.
    ///
    /// An empty batch leaves the current session untouched. Malformed tuples
    /// are skipped and reported without aborting the rest of the batch.
    pub fn schedule_from_source(
        &mut self,
        events: &[SourceNote],
        time_offset: f64,
    ) -> ScheduleReport {
        let mut report = ScheduleReport::default();
        if events.is_empty() {
            debug!("nothing to schedule");
            return report;
        }

        self.notes.clear();
        self.stats.reset();

        let shift = time_offset + self.config.lead_in_s;
        for (index, source) in events.iter().enumerate() {
            let shifted = source.shifted(shift);
            match shifted.validate() {
                Ok(()) => {
                    let id = self.allocate_id();
                    self.notes.push(NoteEvent::new(
                        id,
                        shifted.pitch,
                        shifted.velocity,
                        shifted.start,
                        shifted.end,
                    ));
                    report.accepted += 1;
                }
                Err(e) => {
                    warn!(index, pitch = source.pitch, "skipping note: {}", e);
                    report.rejected.push((index, e));
                }
            }
        }

        self.notes
            .sort_by(|a, b| a.scheduled_start.total_cmp(&b.scheduled_start));
        self.stats.record_scheduled(report.accepted);

        info!(
            accepted = report.accepted,
            rejected = report.rejected.len(),
            "scheduled notes"
        );
        report
    }

    /// Moves every note to `now`, applies time-driven transitions and
    /// removes resolved notes, which are returned to the caller.
    pub fn advance(&mut self, now: f64) -> Vec<NoteEvent> {
        for note in &mut self.notes {
            match note.advance(now, &self.config) {
                Some(Transition::Reached) => {
                    debug!(pitch = note.pitch, id = note.id.0, "note waiting at target");
                }
                Some(Transition::Missed) => {
                    self.stats.record_miss();
                    debug!(pitch = note.pitch, id = note.id.0, "note missed");
                }
                None => {}
            }
        }

        let mut resolved = Vec::new();
        self.notes.retain(|note| {
            if note.is_active() {
                true
            } else {
                resolved.push(note.clone());
                false
            }
        });
        resolved
    }

    /// Grades a press of `pitch` at `input_time` against the active notes.
    ///
    /// Among the notes that accept the press, the one closest in time is hit.
    /// Returns `None` for an unscored press.
    pub fn register_input(&mut self, pitch: u8, input_time: f64) -> Option<Hit> {
        if pitch > MAX_PITCH || !input_time.is_finite() {
            debug!(pitch, "ignoring out-of-range input");
            return None;
        }

        let config = &self.config;
        let target = self
            .notes
            .iter_mut()
            .filter(|n| n.pitch == pitch && n.accepts(input_time, config))
            .min_by(|a, b| {
                let a_error = a.timing_error_at(input_time).abs();
                let b_error = b.timing_error_at(input_time).abs();
                a_error
                    .total_cmp(&b_error)
                    .then(a.scheduled_start.total_cmp(&b.scheduled_start))
                    .then(a.id.cmp(&b.id))
            });

        let Some(target) = target else {
            debug!(pitch, input_time, "unscored press");
            return None;
        };

        let (timing_error_ms, accuracy) = target.hit(input_time, config)?;
        self.stats.record_hit(accuracy);
        debug!(pitch, timing_error_ms, accuracy, "note hit");

        Some(Hit {
            id: target.id,
            pitch,
            timing_error_ms,
            accuracy,
        })
    }

    /// Pitches of unresolved notes starting within the look-ahead window.
    pub fn active_highlights(&self, now: f64) -> BTreeSet<u8> {
        let window = self.config.highlight_window_s;
        self.notes
            .iter()
            .filter(|n| n.is_active())
            .filter(|n| {
                let time_to_play = n.scheduled_start - now;
                (0.0..=window).contains(&time_to_play)
            })
            .map(|n| n.pitch)
            .collect()
    }

    /// Pitches of notes currently held at the target line.
    pub fn waiting_pitches(&self) -> BTreeSet<u8> {
        self.notes
            .iter()
            .filter(|n| n.state() == NoteState::Waiting)
            .map(|n| n.pitch)
            .collect()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn views(&self) -> impl Iterator<Item = NoteView> + '_ {
        self.notes.iter().map(|note| self.view(note))
    }

    /// Render data for a note, whether or not it is still managed.
    pub fn view(&self, note: &NoteEvent) -> NoteView {
        let height = (note.duration() * self.config.fall_speed) as f32;
        NoteView {
            id: note.id,
            pitch: note.pitch,
            velocity: note.velocity,
            state: note.state(),
            vertical_position: note.vertical_position(),
            y: note
                .vertical_position()
                .map(|position| self.target_line_y - position as f32),
            height: height.max(MIN_NOTE_HEIGHT),
        }
    }

    fn allocate_id(&mut self) -> NoteId {
        let id = NoteId(self.next_id);
        self.next_id += 1;
        id
    }
}

impl Default for NotesManager {
    fn default() -> Self {
        Self::new(PracticeConfig::default())
    }
}
