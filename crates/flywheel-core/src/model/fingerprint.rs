//! Behavioral fingerprint — windowed statistical summary of a tag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Fingerprint {
    pub sequence_id: i64,
    pub sample_count: u64,
    pub mean: f64,
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
    /// Samples per second over the window.
    pub update_rate: f64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub computed_at: DateTime<Utc>,
}

impl Fingerprint {
    /// `stddev >= 0` and `min <= mean <= max` for every well-formed
    /// fingerprint.
    pub fn is_well_formed(&self) -> bool {
        self.stddev >= 0.0 && self.min <= self.mean && self.mean <= self.max
    }

    /// A fingerprint older than `staleness` relative to `now` is treated
    /// as absent by readers rather than deleted outright.
    pub fn is_stale(&self, now: DateTime<Utc>, staleness: chrono::Duration) -> bool {
        now - self.computed_at > staleness
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(computed_at: DateTime<Utc>) -> Fingerprint {
        Fingerprint {
            sequence_id: 1,
            sample_count: 100,
            mean: 5.0,
            stddev: 1.0,
            min: 1.0,
            max: 9.0,
            update_rate: 1.0,
            window_start: computed_at - chrono::Duration::hours(24),
            window_end: computed_at,
            computed_at,
        }
    }

    #[test]
    fn stale_past_threshold_treated_as_absent() {
        let now = Utc::now();
        let fresh = fp(now - chrono::Duration::hours(1));
        let stale = fp(now - chrono::Duration::hours(100));
        assert!(!fresh.is_stale(now, chrono::Duration::hours(48)));
        assert!(stale.is_stale(now, chrono::Duration::hours(48)));
    }
}
