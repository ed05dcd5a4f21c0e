//! Behavioral-mode pattern matching: scores active clusters against the
//! pattern library using correlation-derived cohesion plus the
//! cluster's tag metadata and fingerprints.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use flywheel_core::config::MatchingConfig;
use flywheel_core::model::{
    Cluster, Fingerprint, MatchExplanation, MatchWeights, Pattern, PatternRole, SubScores, Suggestion, Tag,
};
use flywheel_core::Result;
use flywheel_store::MetadataStore;

use crate::util::{common_prefix, role_matches_any_tag};

#[derive(Debug, Default, Clone, Copy)]
pub struct BehavioralStats {
    pub clusters_considered: u64,
    pub clusters_skipped_recent_suggestion: u64,
    pub suggestions_created: u64,
}

fn range_overlap(observed_min: f64, observed_max: f64, expected_min: f64, expected_max: f64) -> f64 {
    let intersection = (observed_max.min(expected_max) - observed_min.max(expected_min)).max(0.0);
    let span = (expected_max - expected_min).abs().max(1e-9);
    (intersection / span).clamp(0.0, 1.0)
}

fn naming_score(tags: &[&Tag], pattern: &Pattern) -> (f64, Vec<String>) {
    let required: Vec<&PatternRole> = pattern.required_roles().collect();
    let roles: Vec<&PatternRole> = if required.is_empty() { pattern.roles.iter().collect() } else { required };
    if roles.is_empty() {
        return (0.0, Vec::new());
    }
    let matched: Vec<String> = roles
        .iter()
        .filter(|r| role_matches_any_tag(r, tags))
        .map(|r| r.name.clone())
        .collect();
    (matched.len() as f64 / roles.len() as f64, matched)
}

fn range_score(tags: &[&Tag], fingerprints: &HashMap<i64, Fingerprint>, pattern: &Pattern) -> f64 {
    let roles_with_range: Vec<&PatternRole> = pattern.roles.iter().filter(|r| r.has_range()).collect();
    if roles_with_range.is_empty() {
        return 0.5;
    }
    let mut total = 0.0;
    for role in &roles_with_range {
        let best = tags
            .iter()
            .filter_map(|t| fingerprints.get(&t.sequence_id))
            .map(|fp| range_overlap(fp.min, fp.max, role.expected_min.unwrap(), role.expected_max.unwrap()))
            .fold(0.0_f64, f64::max);
        total += best;
    }
    total / roles_with_range.len() as f64
}

fn rate_score(tags: &[&Tag], pattern: &Pattern) -> f64 {
    let roles_with_rate: Vec<&PatternRole> = pattern
        .roles
        .iter()
        .filter(|r| r.typical_update_interval_secs.is_some())
        .collect();
    if roles_with_rate.is_empty() {
        return 0.5;
    }
    let mut total = 0.0;
    for role in &roles_with_rate {
        let expected = role.typical_update_interval_secs.unwrap();
        let best = tags
            .iter()
            .filter_map(|t| t.typical_update_interval_secs)
            .filter(|actual| *actual > 0.0 && expected > 0.0)
            .map(|actual| (-0.5 * (actual / expected).ln().powi(2)).exp())
            .fold(0.0_f64, f64::max);
        total += best;
    }
    total / roles_with_rate.len() as f64
}

fn explain(pattern: &Pattern, scores: &SubScores, matched_roles: &[String], overall: f64) -> String {
    format!(
        "{}: {} role(s) matched by name; naming {:.2}, correlation {:.2}, range {:.2}, rate {:.2}, overall {:.2}",
        pattern.name,
        matched_roles.len(),
        scores.naming,
        scores.correlation,
        scores.range,
        scores.rate,
        overall,
    )
}

async fn load_cluster_context(
    metadata: &dyn MetadataStore,
    cluster: &Cluster,
) -> Result<(Vec<Tag>, HashMap<i64, Fingerprint>)> {
    let mut tags = Vec::new();
    let mut fingerprints = HashMap::new();
    for &sequence_id in &cluster.members {
        if let Some(tag) = metadata.get_tag(sequence_id).await? {
            tags.push(tag);
        }
        if let Some(fp) = metadata.get_fingerprint(sequence_id).await? {
            fingerprints.insert(sequence_id, fp);
        }
    }
    Ok((tags, fingerprints))
}

/// One behavioral-mode pass.
pub async fn run_once(metadata: &dyn MetadataStore, config: &MatchingConfig, now: DateTime<Utc>) -> Result<BehavioralStats> {
    let mut stats = BehavioralStats::default();
    let recent_since = now - Duration::hours(1);

    for cluster in metadata.list_active_clusters().await? {
        stats.clusters_considered += 1;
        if metadata.has_recent_pending_suggestion(cluster.id, recent_since).await? {
            stats.clusters_skipped_recent_suggestion += 1;
            continue;
        }

        let (tags, fingerprints) = load_cluster_context(metadata, &cluster).await?;
        if tags.is_empty() {
            continue;
        }
        let tag_refs: Vec<&Tag> = tags.iter().collect();
        let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        let prefix = common_prefix(&names);

        let mut candidates: Vec<(Pattern, SubScores, Vec<String>, f64)> = Vec::new();
        for pattern in metadata.list_matchable_patterns().await? {
            let (naming, matched_roles) = naming_score(&tag_refs, &pattern);
            let scores = SubScores {
                naming,
                correlation: cluster.cohesion,
                range: range_score(&tag_refs, &fingerprints, &pattern),
                rate: rate_score(&tag_refs, &pattern),
            };
            let overall = scores.weighted(&MatchWeights::BEHAVIORAL);
            if overall >= config.min_confidence {
                candidates.push((pattern, scores, matched_roles, overall));
            }
        }
        candidates.sort_by(|a, b| b.3.partial_cmp(&a.3).unwrap());
        candidates.truncate(config.max_per_cluster);

        for (pattern, scores, matched_roles, overall) in candidates {
            if metadata.find_suggestion(cluster.id, pattern.id).await?.is_some() {
                continue;
            }
            let explanation = explain(&pattern, &scores, &matched_roles, overall);
            let structured = MatchExplanation {
                sub_scores: scores,
                matched_roles,
                parsed_tokens: Vec::new(),
            };
            let suggestion = Suggestion::new(cluster.id, pattern.id, scores, overall, explanation, structured, prefix.clone());
            metadata.upsert_suggestion(suggestion).await?;
            stats.suggestions_created += 1;
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flywheel_core::model::{ConnectionStatus, DataSource, ValueType};
    use flywheel_store::InMemoryMetadataStore;

    async fn seed_tag(store: &InMemoryMetadataStore, sequence_id: i64, name: &str, unit: &str, interval: f64) {
        let source_id = uuid::Uuid::new_v4();
        store
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
        store
            .upsert_tag(Tag {
                id: uuid::Uuid::new_v4(),
                sequence_id,
                name: name.to_string(),
                source_id,
                address: name.to_string(),
                description: String::new(),
                unit: unit.to_string(),
                value_type: ValueType::ScalarDouble,
                enabled: true,
                typical_update_interval_secs: Some(interval),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn matches_centrifugal_pump_cluster_above_threshold() {
        let metadata = InMemoryMetadataStore::new();
        crate::seed::ensure_seeded(&metadata).await.unwrap();

        seed_tag(&metadata, 1, "PUMP_101_DISCHARGE_PRESSURE", "psi", 5.0).await;
        seed_tag(&metadata, 2, "PUMP_101_SUCTION_PRESSURE", "psi", 5.0).await;
        seed_tag(&metadata, 3, "PUMP_101_FLOW_RATE", "gpm", 5.0).await;

        for (seq, min, max) in [(1, 50.0, 150.0), (2, 10.0, 40.0), (3, 100.0, 900.0)] {
            metadata
                .upsert_fingerprint(Fingerprint {
                    sequence_id: seq,
                    sample_count: 500,
                    mean: (min + max) / 2.0,
                    stddev: 5.0,
                    min,
                    max,
                    update_rate: 0.2,
                    window_start: Utc::now() - Duration::hours(24),
                    window_end: Utc::now(),
                    computed_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let cluster = Cluster::new(vec![1, 2, 3], 0.85);
        metadata.upsert_cluster(cluster.clone()).await.unwrap();

        let config = MatchingConfig::default();
        let now = Utc::now();
        let stats = run_once(&metadata, &config, now).await.unwrap();
        assert_eq!(stats.suggestions_created, 1);

        let pending = metadata.list_pending_suggestions().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].overall >= config.min_confidence);
        assert_eq!(pending[0].tag_prefix, "PUMP_101_");
    }

    #[tokio::test]
    async fn skips_cluster_with_recent_pending_suggestion() {
        let metadata = InMemoryMetadataStore::new();
        crate::seed::ensure_seeded(&metadata).await.unwrap();
        seed_tag(&metadata, 1, "PUMP_101_DISCHARGE_PRESSURE", "psi", 5.0).await;
        let cluster = Cluster::new(vec![1], 0.9);
        metadata.upsert_cluster(cluster.clone()).await.unwrap();

        let patterns = metadata.list_matchable_patterns().await.unwrap();
        let suggestion = Suggestion::new(
            cluster.id,
            patterns[0].id,
            SubScores::default(),
            0.6,
            "x".into(),
            MatchExplanation {
                sub_scores: SubScores::default(),
                matched_roles: vec![],
                parsed_tokens: vec![],
            },
            "PUMP_101_".into(),
        );
        metadata.upsert_suggestion(suggestion).await.unwrap();

        let stats = run_once(&metadata, &MatchingConfig::default(), Utc::now()).await.unwrap();
        assert_eq!(stats.clusters_skipped_recent_suggestion, 1);
        assert_eq!(stats.suggestions_created, 0);
    }
}
