//! Pattern and PatternRole — the equipment template library.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_CONFIDENCE: f64 = 0.30;
pub const MAX_CONFIDENCE: f64 = 1.00;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pattern {
    pub id: uuid::Uuid,
    pub name: String,
    pub category: String,
    pub description: String,
    pub confidence: f64,
    pub active: bool,
    pub example_count: u64,
    pub rejection_count: u64,
    pub last_matched_at: Option<DateTime<Utc>>,
    /// Insertion-ordered measurement slots. Order is preserved; only role
    /// `name` is required to be unique within a pattern.
    pub roles: Vec<PatternRole>,
}

impl Pattern {
    pub fn clamp_confidence(c: f64) -> f64 {
        c.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
    }

    pub fn required_roles(&self) -> impl Iterator<Item = &PatternRole> {
        self.roles.iter().filter(|r| r.required)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PatternRole {
    pub name: String,
    pub required: bool,
    pub weight: f64,
    /// Naming regexes. An invalid regex among these is skipped at match
    /// time (treated as unmatched), never a hard error.
    pub naming_patterns: Vec<String>,
    pub expected_unit: Option<String>,
    pub expected_min: Option<f64>,
    pub expected_max: Option<f64>,
    pub typical_update_interval_secs: Option<f64>,
}

impl PatternRole {
    pub fn has_range(&self) -> bool {
        self.expected_min.is_some() && self.expected_max.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_clamps_to_bounds() {
        assert_eq!(Pattern::clamp_confidence(1.5), MAX_CONFIDENCE);
        assert_eq!(Pattern::clamp_confidence(0.0), MIN_CONFIDENCE);
        assert_eq!(Pattern::clamp_confidence(0.6), 0.6);
    }
}
