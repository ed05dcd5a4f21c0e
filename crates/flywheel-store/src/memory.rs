//! In-process metadata store, backed by [`dashmap::DashMap`] for
//! concurrent per-key access without a global lock. Used for tests and
//! for single-process deployments that don't need Postgres.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use flywheel_core::model::{
    Binding, Cluster, DataSource, FeedbackEntry, Fingerprint, KnowledgeBase, Pattern, Suggestion,
    SuggestionState, Tag,
};
use flywheel_core::Result;

use crate::MetadataStore;

#[derive(Default)]
pub struct InMemoryMetadataStore {
    data_sources: DashMap<Uuid, DataSource>,
    fingerprints: DashMap<i64, Fingerprint>,
    tags: DashMap<i64, Tag>,
    patterns: DashMap<Uuid, Pattern>,
    clusters: DashMap<u128, Cluster>,
    suggestions: DashMap<Uuid, Suggestion>,
    bindings: DashMap<(i64, Uuid), Binding>,
    feedback: DashMap<Uuid, Vec<FeedbackEntry>>,
    knowledge_base: RwLock<KnowledgeBase>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the knowledge base directly, bypassing the store trait.
    /// Used by tests and by the bundled seed pattern library loader.
    pub fn seed_knowledge_base(&self, kb: KnowledgeBase) {
        *self.knowledge_base.write().expect("knowledge base lock poisoned") = kb;
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn upsert_data_source(&self, source: DataSource) -> Result<()> {
        self.data_sources.insert(source.id, source);
        Ok(())
    }

    async fn get_data_source(&self, id: Uuid) -> Result<Option<DataSource>> {
        Ok(self.data_sources.get(&id).map(|s| s.clone()))
    }

    async fn list_enabled_data_sources(&self) -> Result<Vec<DataSource>> {
        Ok(self
            .data_sources
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.clone())
            .collect())
    }

    async fn upsert_fingerprint(&self, fingerprint: Fingerprint) -> Result<()> {
        self.fingerprints.insert(fingerprint.sequence_id, fingerprint);
        Ok(())
    }

    async fn get_fingerprint(&self, sequence_id: i64) -> Result<Option<Fingerprint>> {
        Ok(self.fingerprints.get(&sequence_id).map(|f| f.clone()))
    }

    async fn purge_stale_fingerprints(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let to_remove: Vec<i64> = self
            .fingerprints
            .iter()
            .filter(|f| f.computed_at < older_than)
            .map(|f| f.sequence_id)
            .collect();
        for id in &to_remove {
            self.fingerprints.remove(id);
        }
        Ok(to_remove.len())
    }

    async fn upsert_tag(&self, tag: Tag) -> Result<()> {
        self.tags.insert(tag.sequence_id, tag);
        Ok(())
    }

    async fn get_tag(&self, sequence_id: i64) -> Result<Option<Tag>> {
        Ok(self.tags.get(&sequence_id).map(|t| t.clone()))
    }

    async fn list_enabled_tags(&self) -> Result<Vec<Tag>> {
        Ok(self
            .tags
            .iter()
            .filter(|t| t.enabled)
            .map(|t| t.clone())
            .collect())
    }

    async fn list_tags_for_source(&self, source_id: Uuid) -> Result<Vec<Tag>> {
        Ok(self
            .tags
            .iter()
            .filter(|t| t.source_id == source_id)
            .map(|t| t.clone())
            .collect())
    }

    async fn upsert_pattern(&self, pattern: Pattern) -> Result<()> {
        self.patterns.insert(pattern.id, pattern);
        Ok(())
    }

    async fn get_pattern(&self, id: Uuid) -> Result<Option<Pattern>> {
        Ok(self.patterns.get(&id).map(|p| p.clone()))
    }

    async fn list_matchable_patterns(&self) -> Result<Vec<Pattern>> {
        let mut out: Vec<Pattern> = self
            .patterns
            .iter()
            .filter(|p| p.active && p.confidence >= flywheel_core::model::MIN_CONFIDENCE)
            .map(|p| p.clone())
            .collect();
        out.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());
        Ok(out)
    }

    async fn list_active_patterns(&self) -> Result<Vec<Pattern>> {
        Ok(self.patterns.iter().filter(|p| p.active).map(|p| p.clone()).collect())
    }

    async fn upsert_cluster(&self, cluster: Cluster) -> Result<()> {
        self.clusters.insert(cluster.id, cluster);
        Ok(())
    }

    async fn get_cluster(&self, id: u128) -> Result<Option<Cluster>> {
        Ok(self.clusters.get(&id).map(|c| c.clone()))
    }

    async fn list_active_clusters(&self) -> Result<Vec<Cluster>> {
        Ok(self
            .clusters
            .iter()
            .filter(|c| c.is_active)
            .map(|c| c.clone())
            .collect())
    }

    async fn deactivate_stale_clusters(
        &self,
        detected_ids: &[u128],
        stale_before: DateTime<Utc>,
    ) -> Result<usize> {
        let detected: std::collections::HashSet<u128> = detected_ids.iter().copied().collect();
        let mut deactivated = 0;
        for mut entry in self.clusters.iter_mut() {
            if entry.is_active && !detected.contains(&entry.id) && entry.detected_at < stale_before {
                entry.is_active = false;
                deactivated += 1;
            }
        }
        Ok(deactivated)
    }

    async fn upsert_suggestion(&self, suggestion: Suggestion) -> Result<()> {
        if let Some(existing_id) = self
            .suggestions
            .iter()
            .find(|s| s.cluster_id == suggestion.cluster_id && s.pattern_id == suggestion.pattern_id)
            .map(|s| s.id)
        {
            if existing_id != suggestion.id {
                self.suggestions.remove(&existing_id);
            }
        }
        self.suggestions.insert(suggestion.id, suggestion);
        Ok(())
    }

    async fn get_suggestion(&self, id: Uuid) -> Result<Option<Suggestion>> {
        Ok(self.suggestions.get(&id).map(|s| s.clone()))
    }

    async fn find_suggestion(&self, cluster_id: u128, pattern_id: Uuid) -> Result<Option<Suggestion>> {
        Ok(self
            .suggestions
            .iter()
            .find(|s| s.cluster_id == cluster_id && s.pattern_id == pattern_id)
            .map(|s| s.clone()))
    }

    async fn list_pending_suggestions(&self) -> Result<Vec<Suggestion>> {
        Ok(self
            .suggestions
            .iter()
            .filter(|s| s.state == SuggestionState::Pending)
            .map(|s| s.clone())
            .collect())
    }

    async fn has_recent_pending_suggestion(&self, cluster_id: u128, since: DateTime<Utc>) -> Result<bool> {
        Ok(self.suggestions.iter().any(|s| {
            s.cluster_id == cluster_id && s.state == SuggestionState::Pending && s.created_at >= since
        }))
    }

    async fn set_suggestion_state(
        &self,
        id: Uuid,
        state: SuggestionState,
        reviewer: Option<String>,
        rejection_reason: Option<String>,
    ) -> Result<()> {
        if let Some(mut entry) = self.suggestions.get_mut(&id) {
            entry.state = state;
            entry.reviewer = reviewer;
            entry.rejection_reason = rejection_reason;
            if state.is_terminal_for_confidence() || state == SuggestionState::Deferred {
                entry.reviewed_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn upsert_binding(&self, binding: Binding) -> Result<()> {
        self.bindings.insert((binding.sequence_id, binding.pattern_id), binding);
        Ok(())
    }

    async fn list_bindings_for_tag(&self, sequence_id: i64) -> Result<Vec<Binding>> {
        Ok(self
            .bindings
            .iter()
            .filter(|e| e.key().0 == sequence_id)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn append_feedback(&self, entry: FeedbackEntry) -> Result<()> {
        self.feedback.entry(entry.suggestion_id).or_default().push(entry);
        Ok(())
    }

    async fn list_feedback_for_suggestion(&self, suggestion_id: Uuid) -> Result<Vec<FeedbackEntry>> {
        Ok(self
            .feedback
            .get(&suggestion_id)
            .map(|v| v.clone())
            .unwrap_or_default())
    }

    async fn load_knowledge_base(&self) -> Result<KnowledgeBase> {
        Ok(self.knowledge_base.read().expect("knowledge base lock poisoned").clone())
    }

    async fn purge_expired_suggestions(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let to_remove: Vec<Uuid> = self
            .suggestions
            .iter()
            .filter(|s| s.state == SuggestionState::Expired && s.expires_at < older_than)
            .map(|s| s.id)
            .collect();
        for id in &to_remove {
            self.suggestions.remove(id);
        }
        Ok(to_remove.len())
    }

    async fn purge_inactive_clusters_without_references(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let referenced: std::collections::HashSet<u128> =
            self.suggestions.iter().map(|s| s.cluster_id).collect();
        let to_remove: Vec<u128> = self
            .clusters
            .iter()
            .filter(|c| !c.is_active && c.detected_at < older_than && !referenced.contains(&c.id))
            .map(|c| c.id)
            .collect();
        for id in &to_remove {
            self.clusters.remove(id);
        }
        Ok(to_remove.len())
    }

    async fn purge_feedback(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let mut purged = 0;
        for mut entry in self.feedback.iter_mut() {
            let before = entry.len();
            entry.retain(|f| f.created_at >= older_than);
            purged += before - entry.len();
        }
        Ok(purged)
    }

    async fn expire_pending_suggestions(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut expired = 0;
        for mut entry in self.suggestions.iter_mut() {
            if entry.is_expired(now) {
                entry.state = SuggestionState::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use flywheel_core::model::{MatchExplanation, SubScores};

    fn sample_suggestion(cluster_id: u128, pattern_id: Uuid) -> Suggestion {
        Suggestion::new(
            cluster_id,
            pattern_id,
            SubScores::default(),
            0.75,
            "3/3 roles matched".into(),
            MatchExplanation {
                sub_scores: SubScores::default(),
                matched_roles: vec![],
                parsed_tokens: vec![],
            },
            "PMP-101".into(),
        )
    }

    #[tokio::test]
    async fn upsert_suggestion_is_unique_on_cluster_and_pattern() {
        let store = InMemoryMetadataStore::new();
        let pattern_id = Uuid::new_v4();
        let s1 = sample_suggestion(42, pattern_id);
        let s1_id = s1.id;
        store.upsert_suggestion(s1).await.unwrap();

        let mut s2 = sample_suggestion(42, pattern_id);
        s2.overall = 0.9;
        store.upsert_suggestion(s2.clone()).await.unwrap();

        assert!(store.get_suggestion(s1_id).await.unwrap().is_none());
        let found = store.find_suggestion(42, pattern_id).await.unwrap().unwrap();
        assert_eq!(found.id, s2.id);
        assert_eq!(found.overall, 0.9);
    }

    #[tokio::test]
    async fn list_matchable_patterns_filters_inactive_and_low_confidence() {
        let store = InMemoryMetadataStore::new();
        let active_high = Pattern {
            id: Uuid::new_v4(),
            name: "pump".into(),
            category: "rotating".into(),
            description: String::new(),
            confidence: 0.8,
            active: true,
            example_count: 0,
            rejection_count: 0,
            last_matched_at: None,
            roles: vec![],
        };
        let mut inactive = active_high.clone();
        inactive.id = Uuid::new_v4();
        inactive.active = false;
        let mut low_confidence = active_high.clone();
        low_confidence.id = Uuid::new_v4();
        low_confidence.confidence = 0.10;

        store.upsert_pattern(active_high.clone()).await.unwrap();
        store.upsert_pattern(inactive).await.unwrap();
        store.upsert_pattern(low_confidence).await.unwrap();

        let matchable = store.list_matchable_patterns().await.unwrap();
        assert_eq!(matchable.len(), 1);
        assert_eq!(matchable[0].id, active_high.id);
    }

    #[tokio::test]
    async fn expire_pending_suggestions_transitions_past_expiry() {
        let store = InMemoryMetadataStore::new();
        let mut suggestion = sample_suggestion(1, Uuid::new_v4());
        suggestion.expires_at = Utc::now() - Duration::days(1);
        let id = suggestion.id;
        store.upsert_suggestion(suggestion).await.unwrap();

        let count = store.expire_pending_suggestions(Utc::now()).await.unwrap();
        assert_eq!(count, 1);
        let reloaded = store.get_suggestion(id).await.unwrap().unwrap();
        assert_eq!(reloaded.state, SuggestionState::Expired);
    }

    #[tokio::test]
    async fn deactivate_stale_clusters_skips_recently_detected() {
        let store = InMemoryMetadataStore::new();
        let stale = Cluster {
            detected_at: Utc::now() - Duration::days(10),
            ..Cluster::new(vec![1, 2, 3], 0.7)
        };
        let fresh = Cluster::new(vec![4, 5, 6], 0.7);
        store.upsert_cluster(stale.clone()).await.unwrap();
        store.upsert_cluster(fresh.clone()).await.unwrap();

        let deactivated = store
            .deactivate_stale_clusters(&[fresh.id], Utc::now() - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(deactivated, 1);
        assert!(!store.get_cluster(stale.id).await.unwrap().unwrap().is_active);
        assert!(store.get_cluster(fresh.id).await.unwrap().unwrap().is_active);
    }
}
