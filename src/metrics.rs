use std::collections::VecDeque;
use std::fmt;

/// Number of recent timing errors kept for the running average.
const TIMING_HISTORY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grade {
    Perfect,
    Great,
    Good,
    Ok,
    /// Accepted press outside the grading thresholds (lenient timing only).
    Late,
    /// Only ever given to notes that were never played.
    Miss,
}

impl Grade {
    pub const ALL: [Grade; 6] = [
        Grade::Perfect,
        Grade::Great,
        Grade::Good,
        Grade::Ok,
        Grade::Late,
        Grade::Miss,
    ];

    /// Largest timing error, in milliseconds, that still earns this grade.
    pub fn threshold_ms(self) -> Option<f64> {
        match self {
            Grade::Perfect => Some(30.0),
            Grade::Great => Some(70.0),
            Grade::Good => Some(120.0),
            Grade::Ok => Some(200.0),
            Grade::Late | Grade::Miss => None,
        }
    }

    /// Grade of a press with the given timing error in milliseconds.
    pub fn for_error(timing_error_ms: f64) -> Self {
        let error = timing_error_ms.abs();
        Grade::ALL
            .into_iter()
            .find(|grade| grade.threshold_ms().is_some_and(|limit| error <= limit))
            .unwrap_or(Grade::Late)
    }

    /// Whether a press with this grade keeps the streak going.
    pub fn extends_streak(self) -> bool {
        !matches!(self, Grade::Late | Grade::Miss)
    }

    fn score_multiplier(self) -> f64 {
        match self {
            Grade::Perfect => 1.5,
            Grade::Great => 1.2,
            Grade::Good => 1.0,
            Grade::Ok => 0.5,
            Grade::Late | Grade::Miss => 0.1,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Grade::Perfect => "Perfect",
            Grade::Great => "Great",
            Grade::Good => "Good",
            Grade::Ok => "OK",
            Grade::Late => "Late",
            Grade::Miss => "Miss",
        };
        f.write_str(label)
    }
}

/// Streak, score and grade bookkeeping for the performance panel.
#[derive(Debug, Clone, Default)]
pub struct PerformanceMetrics {
    hits: usize,
    misses: usize,
    current_streak: usize,
    max_streak: usize,
    score: u64,
    timing_errors: VecDeque<f64>,
    grade_counts: [usize; 6],
    last_grade: Option<Grade>,
}

impl PerformanceMetrics {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn note_hit(&mut self, timing_error_ms: f64) -> Grade {
        let error = timing_error_ms.abs();
        let grade = Grade::for_error(error);
        self.hits += 1;
        if grade.extends_streak() {
            self.current_streak += 1;
            self.max_streak = self.max_streak.max(self.current_streak);
        }

        if self.timing_errors.len() == TIMING_HISTORY {
            self.timing_errors.pop_front();
        }
        self.timing_errors.push_back(error);

        self.grade_counts[grade.index()] += 1;
        self.last_grade = Some(grade);

        let streak_multiplier = (1.0 + self.current_streak as f64 / 50.0).min(3.0);
        self.score += (100.0 * grade.score_multiplier() * streak_multiplier) as u64;
        grade
    }

    pub fn note_missed(&mut self) {
        self.misses += 1;
        self.current_streak = 0;
        self.grade_counts[Grade::Miss.index()] += 1;
        self.last_grade = Some(Grade::Miss);
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn current_streak(&self) -> usize {
        self.current_streak
    }

    pub fn max_streak(&self) -> usize {
        self.max_streak
    }

    pub fn last_grade(&self) -> Option<Grade> {
        self.last_grade
    }

    pub fn grade_count(&self, grade: Grade) -> usize {
        self.grade_counts[grade.index()]
    }

    /// Share of graded notes that were hit, in percent.
    pub fn hit_percentage(&self) -> f64 {
        let graded = self.hits + self.misses;
        if graded == 0 {
            100.0
        } else {
            self.hits as f64 / graded as f64 * 100.0
        }
    }

    /// Mean absolute timing error over the recent history.
    pub fn average_timing_error(&self) -> Option<f64> {
        if self.timing_errors.is_empty() {
            return None;
        }
        Some(self.timing_errors.iter().sum::<f64>() / self.timing_errors.len() as f64)
    }

    pub fn timing_history(&self) -> impl Iterator<Item = f64> + '_ {
        self.timing_errors.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_thresholds() {
        assert_eq!(Grade::for_error(0.0), Grade::Perfect);
        assert_eq!(Grade::for_error(-30.0), Grade::Perfect);
        assert_eq!(Grade::for_error(50.0), Grade::Great);
        assert_eq!(Grade::for_error(120.0), Grade::Good);
        assert_eq!(Grade::for_error(-150.0), Grade::Ok);
        assert_eq!(Grade::for_error(200.0), Grade::Ok);
        assert_eq!(Grade::for_error(250.0), Grade::Late);
    }

    #[test]
    fn late_press_is_not_a_miss() {
        let mut metrics = PerformanceMetrics::default();
        metrics.note_hit(10.0);
        assert_eq!(metrics.note_hit(2000.0), Grade::Late);

        assert_eq!(metrics.grade_count(Grade::Late), 1);
        assert_eq!(metrics.grade_count(Grade::Miss), 0);
        assert_eq!(metrics.current_streak(), 1);
        assert_eq!(metrics.max_streak(), 1);
        assert_eq!(metrics.hit_percentage(), 100.0);
        assert_eq!(metrics.last_grade(), Some(Grade::Late));
    }

    #[test]
    fn score_truncates() {
        let mut metrics = PerformanceMetrics::default();
        // 100 * 1.2 * 1.02 = 122.4
        metrics.note_hit(50.0);
        assert_eq!(metrics.score(), 122);
        // 100 * 1.2 * 1.04 = 124.8
        metrics.note_hit(50.0);
        assert_eq!(metrics.score(), 122 + 124);
    }

    #[test]
    fn average_uses_recent_history() {
        let mut metrics = PerformanceMetrics::default();
        assert_eq!(metrics.average_timing_error(), None);
        for _ in 0..TIMING_HISTORY {
            metrics.note_hit(100.0);
        }
        for _ in 0..TIMING_HISTORY {
            metrics.note_hit(-20.0);
        }
        assert_eq!(metrics.average_timing_error(), Some(20.0));
        assert_eq!(metrics.timing_history().count(), TIMING_HISTORY);
    }
}
