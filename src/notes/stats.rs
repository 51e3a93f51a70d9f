/// Counters of one playback session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    total: usize,
    hit: usize,
    missed: usize,
    accuracy_sum: f64,
}

/// Read-only copy of [`SessionStats`] for the UI.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsSnapshot {
    pub total: usize,
    pub hit: usize,
    pub missed: usize,
    /// Mean accuracy of hit notes, `0.0` before the first hit.
    pub mean_accuracy: f64,
    /// `(hit + missed) / total`, always in `[0, 1]`.
    pub completion: f64,
}

impl SessionStats {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn record_scheduled(&mut self, count: usize) {
        self.total += count;
    }

    pub fn record_hit(&mut self, accuracy: f64) {
        self.hit += 1;
        self.accuracy_sum += accuracy;
    }

    pub fn record_miss(&mut self) {
        self.missed += 1;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let resolved = self.hit + self.missed;
        StatsSnapshot {
            total: self.total,
            hit: self.hit,
            missed: self.missed,
            mean_accuracy: if self.hit > 0 {
                self.accuracy_sum / self.hit as f64
            } else {
                0.0
            },
            completion: if self.total > 0 {
                (resolved as f64 / self.total as f64).min(1.0)
            } else {
                0.0
            },
        }
    }
}
