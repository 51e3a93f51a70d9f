use crate::config::PracticeConfig;

/// Slack for seconds-to-milliseconds rounding at the window edges.
const WINDOW_EPSILON_MS: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NoteId(pub u64);

/// Lifecycle of a scheduled note.
///
/// `Falling` and `Waiting` are active; `Hit` and `Missed` are terminal and
/// carry the grading result, so a timing error only exists on a hit note.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteState {
    Falling,
    Waiting,
    Hit {
        timing_error_ms: f64,
        accuracy: f64,
    },
    Missed,
}

impl NoteState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NoteState::Hit { .. } | NoteState::Missed)
    }
}

/// A state change produced by [`NoteEvent::advance`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    Reached,
    Missed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NoteEvent {
    pub id: NoteId,
    pub pitch: u8,
    pub velocity: u8,
    pub scheduled_start: f64,
    pub scheduled_end: f64,
    vertical_position: Option<f64>,
    state: NoteState,
}

/// Accuracy of a press `timing_error_ms` away from the note, in `[0, 1]`.
///
/// Presses on the window edge, or outside it, score zero.
pub fn accuracy_for(timing_error_ms: f64, hit_window_ms: f64) -> f64 {
    let error = timing_error_ms.abs();
    if hit_window_ms <= 0.0 || error >= hit_window_ms - WINDOW_EPSILON_MS {
        return 0.0;
    }
    (1.0 - error / hit_window_ms).clamp(0.0, 1.0)
}

impl NoteEvent {
    pub fn new(id: NoteId, pitch: u8, velocity: u8, start: f64, end: f64) -> Self {
        Self {
            id,
            pitch,
            velocity,
            scheduled_start: start,
            scheduled_end: end,
            vertical_position: None,
            state: NoteState::Falling,
        }
    }

    pub fn state(&self) -> NoteState {
        self.state
    }

    /// Pixels above the target line. Zero while waiting, negative once a
    /// note falls through the line with waiting disabled. `None` until the
    /// note is first advanced or hit.
    pub fn vertical_position(&self) -> Option<f64> {
        self.vertical_position
    }

    pub fn duration(&self) -> f64 {
        self.scheduled_end - self.scheduled_start
    }

    pub fn timing_error_ms(&self) -> Option<f64> {
        match self.state {
            NoteState::Hit {
                timing_error_ms, ..
            } => Some(timing_error_ms),
            _ => None,
        }
    }

    pub fn accuracy(&self) -> Option<f64> {
        match self.state {
            NoteState::Hit { accuracy, .. } => Some(accuracy),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.state.is_terminal()
    }

    /// Signed offset of a press at `input_time`, in milliseconds.
    pub fn timing_error_at(&self, input_time: f64) -> f64 {
        (input_time - self.scheduled_start) * 1000.0
    }

    /// Recomputes the position for `now` and applies time-driven transitions.
    ///
    /// The result only depends on `now`, so calling it again with the same
    /// time is a no-op.
    pub fn advance(&mut self, now: f64, config: &PracticeConfig) -> Option<Transition> {
        let elapsed = now - self.scheduled_start;

        match self.state {
            NoteState::Hit { .. } | NoteState::Missed => None,
            NoteState::Falling if elapsed < 0.0 => {
                self.vertical_position = Some(-elapsed * config.fall_speed);
                None
            }
            NoteState::Falling if config.waits_at_target() => {
                if elapsed > config.grace_period_s {
                    self.miss();
                    Some(Transition::Missed)
                } else {
                    self.vertical_position = Some(0.0);
                    self.state = NoteState::Waiting;
                    Some(Transition::Reached)
                }
            }
            NoteState::Falling => {
                if elapsed > config.hit_window_s() {
                    self.miss();
                    Some(Transition::Missed)
                } else {
                    self.vertical_position = Some(-elapsed * config.fall_speed);
                    None
                }
            }
            NoteState::Waiting => {
                if elapsed > config.grace_period_s {
                    self.miss();
                    Some(Transition::Missed)
                } else {
                    None
                }
            }
        }
    }

    /// Whether a press at `input_time` may hit this note.
    pub fn accepts(&self, input_time: f64, config: &PracticeConfig) -> bool {
        let within_window =
            self.timing_error_at(input_time).abs() <= config.hit_window_ms + WINDOW_EPSILON_MS;
        match self.state {
            NoteState::Falling => within_window,
            NoteState::Waiting => {
                within_window
                    || (!config.strict_timing
                        && input_time >= self.scheduled_start
                        && input_time - self.scheduled_start <= config.grace_period_s)
            }
            NoteState::Hit { .. } | NoteState::Missed => false,
        }
    }

    /// Marks the note as hit by a press at `input_time`.
    ///
    /// Returns `None` when the note was already resolved.
    pub fn hit(&mut self, input_time: f64, config: &PracticeConfig) -> Option<(f64, f64)> {
        if self.state.is_terminal() {
            return None;
        }
        let timing_error_ms = self.timing_error_at(input_time);
        let accuracy = accuracy_for(timing_error_ms, config.hit_window_ms);

        let mut position = (self.scheduled_start - input_time) * config.fall_speed;
        if self.state == NoteState::Waiting || config.waits_at_target() {
            position = position.max(0.0);
        }
        self.vertical_position = Some(position);
        self.state = NoteState::Hit {
            timing_error_ms,
            accuracy,
        };
        Some((timing_error_ms, accuracy))
    }

    fn miss(&mut self) {
        self.state = NoteState::Missed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(start: f64) -> NoteEvent {
        NoteEvent::new(NoteId(0), 60, 100, start, start + 0.5)
    }

    #[test]
    fn falls_toward_the_line() {
        let config = PracticeConfig::default();
        let mut n = note(2.0);

        assert_eq!(n.advance(0.0, &config), None);
        let first = n.vertical_position().unwrap();
        assert_eq!(first, 400.0);

        n.advance(1.0, &config);
        assert!(n.vertical_position().unwrap() < first);
        assert_eq!(n.state(), NoteState::Falling);
    }

    #[test]
    fn waits_at_the_line_then_misses() {
        let config = PracticeConfig::default();
        let mut n = note(1.0);

        assert_eq!(n.advance(1.0, &config), Some(Transition::Reached));
        assert_eq!(n.state(), NoteState::Waiting);
        assert_eq!(n.vertical_position(), Some(0.0));

        assert_eq!(n.advance(5.9, &config), None);
        assert_eq!(n.vertical_position(), Some(0.0));

        assert_eq!(n.advance(6.01, &config), Some(Transition::Missed));
        assert_eq!(n.state(), NoteState::Missed);
    }

    #[test]
    fn skipping_the_grace_period_misses_directly() {
        let config = PracticeConfig::default();
        let mut n = note(1.0);
        assert_eq!(n.advance(10.0, &config), Some(Transition::Missed));
    }

    #[test]
    fn without_waiting_notes_fall_through_the_line() {
        let config = PracticeConfig {
            grace_period_s: 0.0,
            ..Default::default()
        };
        let mut n = note(1.0);

        assert_eq!(n.advance(1.1, &config), None);
        assert_eq!(n.state(), NoteState::Falling);
        assert!(n.vertical_position().unwrap() < 0.0);

        assert_eq!(n.advance(1.16, &config), Some(Transition::Missed));
    }

    #[test]
    fn terminal_states_are_frozen() {
        let config = PracticeConfig::default();
        let mut n = note(1.0);
        n.advance(0.5, &config);
        n.hit(1.0, &config).unwrap();
        let position = n.vertical_position();

        assert_eq!(n.advance(20.0, &config), None);
        assert_eq!(n.vertical_position(), position);
        assert!(n.hit(1.0, &config).is_none());
        assert_eq!(n.accuracy(), Some(1.0));
    }

    #[test]
    fn accuracy_edges() {
        assert_eq!(accuracy_for(0.0, 150.0), 1.0);
        assert_eq!(accuracy_for(150.0, 150.0), 0.0);
        assert_eq!(accuracy_for(-150.0, 150.0), 0.0);
        assert_eq!(accuracy_for(400.0, 150.0), 0.0);
        // seconds-to-milliseconds rounding lands just inside the edge
        assert_eq!(accuracy_for((2.85 - 3.0) * 1000.0, 150.0), 0.0);
        assert_eq!(accuracy_for((3.15 - 3.0) * 1000.0, 150.0), 0.0);
        assert_eq!(accuracy_for(0.0, 0.0), 0.0);
        assert!((accuracy_for(75.0, 150.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn hit_before_any_advance_gets_a_position() {
        let config = PracticeConfig::default();
        let mut n = note(1.0);
        assert_eq!(n.vertical_position(), None);

        n.hit(0.9, &config).unwrap();
        let position = n.vertical_position().unwrap();
        assert!((position - 20.0).abs() < 1e-9);

        let mut late = note(1.0);
        late.hit(1.1, &config).unwrap();
        assert_eq!(late.vertical_position(), Some(0.0));
    }

    #[test]
    fn lenient_waiting_accepts_late_presses() {
        let strict = PracticeConfig::default();
        let lenient = PracticeConfig {
            strict_timing: false,
            ..Default::default()
        };
        let mut n = note(1.0);
        n.advance(1.0, &strict);

        assert!(!n.accepts(3.0, &strict));
        assert!(n.accepts(3.0, &lenient));
        assert!(!n.accepts(0.5, &lenient));
        assert!(n.accepts(1.15, &strict));
        assert!(n.accepts(0.85, &strict));
        assert!(!n.accepts(1.151, &strict));

        let (error, accuracy) = n.hit(3.0, &lenient).unwrap();
        assert_eq!(error, 2000.0);
        assert_eq!(accuracy, 0.0);
    }

    #[test]
    fn timing_error_only_on_hit() {
        let config = PracticeConfig::default();
        let mut n = note(1.0);
        assert_eq!(n.timing_error_ms(), None);
        n.advance(7.0, &config);
        assert_eq!(n.timing_error_ms(), None);
        assert_eq!(n.accuracy(), None);
    }
}
