//! Metadata store gateway: the transactional key-value + relational
//! store holding patterns, roles, clusters, suggestions, bindings, the
//! knowledge base, tags, and the feedback log.
//!
//! Concrete backends implement [`MetadataStore`]; callers only see the
//! trait, never a concrete backend type.

mod memory;
mod postgres;

pub use memory::InMemoryMetadataStore;
pub use postgres::PostgresMetadataStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flywheel_core::model::{
    Binding, Cluster, DataSource, FeedbackEntry, Fingerprint, KnowledgeBase, Pattern, Suggestion, Tag,
};
use flywheel_core::Result;

#[async_trait]
pub trait MetadataStore: Send + Sync {
    // -- data sources --------------------------------------------------
    async fn upsert_data_source(&self, source: DataSource) -> Result<()>;
    async fn get_data_source(&self, id: uuid::Uuid) -> Result<Option<DataSource>>;
    async fn list_enabled_data_sources(&self) -> Result<Vec<DataSource>>;

    // -- fingerprints ----------------------------------------------------
    /// Overwrites any prior fingerprint for the tag.
    async fn upsert_fingerprint(&self, fingerprint: Fingerprint) -> Result<()>;
    async fn get_fingerprint(&self, sequence_id: i64) -> Result<Option<Fingerprint>>;
    async fn purge_stale_fingerprints(&self, older_than: DateTime<Utc>) -> Result<usize>;

    // -- tags --------------------------------------------------------
    async fn upsert_tag(&self, tag: Tag) -> Result<()>;
    async fn get_tag(&self, sequence_id: i64) -> Result<Option<Tag>>;
    async fn list_enabled_tags(&self) -> Result<Vec<Tag>>;
    async fn list_tags_for_source(&self, source_id: uuid::Uuid) -> Result<Vec<Tag>>;

    // -- patterns ------------------------------------------------------
    async fn upsert_pattern(&self, pattern: Pattern) -> Result<()>;
    async fn get_pattern(&self, id: uuid::Uuid) -> Result<Option<Pattern>>;
    /// Patterns eligible for matching: `is_active` AND `confidence >=
    /// MIN_CONFIDENCE` are both required, ordered by confidence
    /// descending.
    async fn list_matchable_patterns(&self) -> Result<Vec<Pattern>>;
    /// All `active` patterns regardless of confidence — the decay sweep's
    /// population is wider than the matcher's (a pattern can decay below
    /// the matchable floor and keep decaying).
    async fn list_active_patterns(&self) -> Result<Vec<Pattern>>;

    // -- clusters ------------------------------------------------------
    async fn upsert_cluster(&self, cluster: Cluster) -> Result<()>;
    async fn get_cluster(&self, id: u128) -> Result<Option<Cluster>>;
    async fn list_active_clusters(&self) -> Result<Vec<Cluster>>;
    /// Marks clusters active but not present in `detected_ids` as
    /// inactive, provided they were last detected before `stale_before`.
    /// Returns the number of clusters deactivated.
    async fn deactivate_stale_clusters(
        &self,
        detected_ids: &[u128],
        stale_before: DateTime<Utc>,
    ) -> Result<usize>;

    // -- suggestions -----------------------------------------------------
    /// UPSERTs on the unique (cluster, pattern) key.
    async fn upsert_suggestion(&self, suggestion: Suggestion) -> Result<()>;
    async fn get_suggestion(&self, id: uuid::Uuid) -> Result<Option<Suggestion>>;
    async fn find_suggestion(
        &self,
        cluster_id: u128,
        pattern_id: uuid::Uuid,
    ) -> Result<Option<Suggestion>>;
    async fn list_pending_suggestions(&self) -> Result<Vec<Suggestion>>;
    async fn has_recent_pending_suggestion(
        &self,
        cluster_id: u128,
        since: DateTime<Utc>,
    ) -> Result<bool>;
    async fn set_suggestion_state(
        &self,
        id: uuid::Uuid,
        state: flywheel_core::model::SuggestionState,
        reviewer: Option<String>,
        rejection_reason: Option<String>,
    ) -> Result<()>;

    // -- bindings ------------------------------------------------------
    /// UPSERTs on the unique (tag, pattern) key.
    async fn upsert_binding(&self, binding: Binding) -> Result<()>;
    async fn list_bindings_for_tag(&self, sequence_id: i64) -> Result<Vec<Binding>>;

    // -- feedback ------------------------------------------------------
    async fn append_feedback(&self, entry: FeedbackEntry) -> Result<()>;
    async fn list_feedback_for_suggestion(&self, suggestion_id: uuid::Uuid) -> Result<Vec<FeedbackEntry>>;

    // -- knowledge base --------------------------------------------------
    async fn load_knowledge_base(&self) -> Result<KnowledgeBase>;

    // -- maintenance (C11 daily sweep) -----------------------------------
    async fn purge_expired_suggestions(&self, older_than: DateTime<Utc>) -> Result<usize>;
    async fn purge_inactive_clusters_without_references(&self, older_than: DateTime<Utc>) -> Result<usize>;
    async fn purge_feedback(&self, older_than: DateTime<Utc>) -> Result<usize>;
    /// Transitions pending suggestions past their `expires_at` to
    /// `expired`. Returns the number transitioned.
    async fn expire_pending_suggestions(&self, now: DateTime<Utc>) -> Result<usize>;
    /// Best-effort planner statistics refresh, run at the end of the daily
    /// maintenance sweep. A no-op for backends with no query planner to
    /// feed (e.g. the in-memory store).
    async fn refresh_statistics(&self) -> Result<()> {
        Ok(())
    }
}
