//! Pattern matcher: behavioral and proactive submodes sharing the
//! [`flywheel_core::model::Suggestion`] model, plus the built-in
//! pattern library seeded on first boot.

use std::collections::HashSet;

use flywheel_core::model::Tag;
use flywheel_core::Result;
use flywheel_store::MetadataStore;

pub mod behavioral;
pub mod proactive;
pub mod seed;
mod util;

pub use behavioral::{run_once as run_behavioral, BehavioralStats};
pub use proactive::{run_once as run_proactive, ProactiveStats};
pub use seed::{ensure_seeded, seed_patterns};

/// Resolves the proactive mode's default candidate set: enabled tags
/// with no binding yet and not already a member of any currently
/// active cluster (those are covered by behavioral mode).
pub async fn unanalyzed_candidate_tags(metadata: &dyn MetadataStore) -> Result<Vec<Tag>> {
    let active_members: HashSet<i64> = metadata
        .list_active_clusters()
        .await?
        .into_iter()
        .flat_map(|c| c.members)
        .collect();

    let mut candidates = Vec::new();
    for tag in metadata.list_enabled_tags().await? {
        if active_members.contains(&tag.sequence_id) {
            continue;
        }
        if metadata.list_bindings_for_tag(tag.sequence_id).await?.is_empty() {
            candidates.push(tag);
        }
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use flywheel_core::model::{Binding, Cluster, ConnectionStatus, DataSource, ValueType};
    use flywheel_store::InMemoryMetadataStore;

    #[tokio::test]
    async fn excludes_bound_and_clustered_tags() {
        let metadata = InMemoryMetadataStore::new();
        let source_id = uuid::Uuid::new_v4();
        metadata
            .upsert_data_source(DataSource {
                id: source_id,
                name: "s".into(),
                source_type: "simulated".into(),
                status: ConnectionStatus::Connected,
                enabled: true,
                poll_interval_ms: None,
                last_seen_at: None,
            })
            .await
            .unwrap();
        for seq in [1, 2, 3] {
            metadata
                .upsert_tag(Tag {
                    id: uuid::Uuid::new_v4(),
                    sequence_id: seq,
                    name: format!("tag_{seq}"),
                    source_id,
                    address: format!("tag_{seq}"),
                    description: String::new(),
                    unit: "psi".into(),
                    value_type: ValueType::ScalarDouble,
                    enabled: true,
                    typical_update_interval_secs: None,
                })
                .await
                .unwrap();
        }
        metadata
            .upsert_binding(Binding {
                id: uuid::Uuid::new_v4(),
                sequence_id: 1,
                pattern_id: uuid::Uuid::new_v4(),
                role_name: None,
                reviewer: "op".into(),
                confidence_at_binding: 0.8,
                bound_at: Utc::now(),
            })
            .await
            .unwrap();
        metadata.upsert_cluster(Cluster::new(vec![2], 0.7)).await.unwrap();

        let candidates = unanalyzed_candidate_tags(&metadata).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].sequence_id, 3);
    }
}
