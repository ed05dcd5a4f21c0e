//! Suggestion and Binding — the matcher's output and its post-approval
//! consequence.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionState {
    Pending,
    Approved,
    Rejected,
    Deferred,
    Expired,
}

impl SuggestionState {
    /// Approved and rejected are terminal for confidence accounting.
    pub fn is_terminal_for_confidence(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

/// The four sub-scores behind every suggestion. For proactive
/// (knowledge-based) suggestions the same four columns are reused under
/// a different mapping: `naming` stays naming, `range` carries the
/// unit-match score, `rate` carries the metadata-completeness score,
/// and `correlation` is always 0 (no behavioral data exists yet).
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct SubScores {
    pub naming: f64,
    pub correlation: f64,
    pub range: f64,
    pub rate: f64,
}

impl SubScores {
    pub fn all_in_unit_interval(&self) -> bool {
        [self.naming, self.correlation, self.range, self.rate]
            .iter()
            .all(|s| (0.0..=1.0).contains(s))
    }

    pub fn weighted(&self, weights: &MatchWeights) -> f64 {
        weights.naming * self.naming
            + weights.correlation * self.correlation
            + weights.range * self.range
            + weights.rate * self.rate
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MatchWeights {
    pub naming: f64,
    pub correlation: f64,
    pub range: f64,
    pub rate: f64,
}

impl MatchWeights {
    pub const BEHAVIORAL: Self = Self {
        naming: 0.30,
        correlation: 0.40,
        range: 0.20,
        rate: 0.10,
    };

    /// Proactive mode reuses the same four columns under the mapping
    /// described on [`SubScores`]: naming stays naming, `range` carries
    /// unit-match weight, `rate` carries metadata weight, correlation
    /// is always zero.
    pub const PROACTIVE: Self = Self {
        naming: 0.50,
        correlation: 0.0,
        range: 0.25,
        rate: 0.15,
    };
}

/// Structured, machine-readable record of what the matcher found. Stored
/// alongside the human-readable `explanation` text on [`Suggestion`] — the
/// two are distinct fields and never concatenated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchExplanation {
    pub sub_scores: SubScores,
    pub matched_roles: Vec<String>,
    pub parsed_tokens: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: uuid::Uuid,
    pub cluster_id: u128,
    pub pattern_id: uuid::Uuid,
    pub scores: SubScores,
    pub overall: f64,
    /// Human-readable recap of what matched (e.g. "3/3 required roles
    /// matched by name; cohesion 0.82").
    pub explanation: String,
    pub structured_explanation: MatchExplanation,
    /// Common name prefix of the cluster's tags, used for display.
    pub tag_prefix: String,
    pub state: SuggestionState,
    pub reviewer: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Suggestion {
    pub const DEFAULT_EXPIRY: Duration = Duration::days(30);

    pub fn new(
        cluster_id: u128,
        pattern_id: uuid::Uuid,
        scores: SubScores,
        overall: f64,
        explanation: String,
        structured_explanation: MatchExplanation,
        tag_prefix: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4(),
            cluster_id,
            pattern_id,
            scores,
            overall,
            explanation,
            structured_explanation,
            tag_prefix,
            state: SuggestionState::Pending,
            reviewer: None,
            reviewed_at: None,
            rejection_reason: None,
            created_at: now,
            expires_at: now + Self::DEFAULT_EXPIRY,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.scores.all_in_unit_interval() && (0.0..=1.0).contains(&self.overall)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.state == SuggestionState::Pending && now >= self.expires_at
    }
}

/// Concrete assignment of a tag to a pattern (and optionally a role) after
/// human approval. Unique on (tag, pattern).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Binding {
    pub id: uuid::Uuid,
    pub sequence_id: i64,
    pub pattern_id: uuid::Uuid,
    pub role_name: Option<String>,
    pub reviewer: String,
    pub confidence_at_binding: f64,
    pub bound_at: DateTime<Utc>,
}

/// Append-only record of an approval/rejection/defer decision.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackAction {
    Approved,
    Rejected,
    Deferred,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub id: uuid::Uuid,
    pub suggestion_id: uuid::Uuid,
    pub action: FeedbackAction,
    pub actor: String,
    pub confidence_before: f64,
    pub confidence_after: f64,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}
