//! The Pattern Flywheel data model.

mod cluster;
mod correlation;
mod fingerprint;
mod knowledge;
mod pattern;
mod point;
mod suggestion;
mod tag;

pub use cluster::{cluster_id, Cluster};
pub use correlation::{CorrelationEdge, TagPair};
pub use fingerprint::Fingerprint;
pub use knowledge::{AbbreviationEntry, KnowledgeBase, MeasurementTypeNode, NamingConvention, UnitMapping};
pub use pattern::{Pattern, PatternRole, MAX_CONFIDENCE, MIN_CONFIDENCE};
pub use point::{Batch, DataPoint, Quality};
pub use suggestion::{
    Binding, FeedbackAction, FeedbackEntry, MatchExplanation, MatchWeights, SubScores, Suggestion,
    SuggestionState,
};
pub use tag::{ConnectionStatus, DataSource, Tag, ValueType};
