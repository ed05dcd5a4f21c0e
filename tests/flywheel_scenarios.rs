//! End-to-end scenarios against the in-memory backends: a suggestion's
//! full life from detection through review, and the backfill request
//! path. Unit-level invariants (Pearson math, Louvain merges, decay
//! formula edge cases) live in the crate that owns them; these tests
//! only check the seams between crates.

use chrono::{DateTime, Duration, Utc};

use flywheel_core::config::{Config, LearningConfig};
use flywheel_core::model::{
    Binding, Cluster, ConnectionStatus, DataSource, Fingerprint, MatchExplanation, Pattern, PatternRole,
    SubScores, Suggestion, SuggestionState, Tag, ValueType,
};
use flywheel_ingest::{BackfillRequest, BackfillWorker, SimulatedAdapter, SourceRegistry};
use flywheel_queue::InMemoryQueue;
use flywheel_store::{InMemoryMetadataStore, MetadataStore};
use flywheel_timeseries::InMemoryTimeSeriesStore;

fn pump_tag(sequence_id: i64, source_id: uuid::Uuid, name: &str, unit: &str, interval_secs: f64) -> Tag {
    Tag {
        id: uuid::Uuid::new_v4(),
        sequence_id,
        name: name.to_string(),
        source_id,
        address: name.to_string(),
        description: String::new(),
        unit: unit.to_string(),
        value_type: ValueType::ScalarDouble,
        enabled: true,
        typical_update_interval_secs: Some(interval_secs),
    }
}

fn fingerprint(sequence_id: i64, min: f64, max: f64, mean: f64, now: DateTime<Utc>) -> Fingerprint {
    Fingerprint {
        sequence_id,
        sample_count: 500,
        mean,
        stddev: (max - min) / 4.0,
        min,
        max,
        update_rate: 0.2,
        window_start: now - Duration::hours(24),
        window_end: now,
        computed_at: now,
    }
}

async fn seed_pump_tags(metadata: &InMemoryMetadataStore) -> (uuid::Uuid, [i64; 3]) {
    let source_id = uuid::Uuid::new_v4();
    metadata
        .upsert_data_source(DataSource {
            id: source_id,
            name: "unit-101".into(),
            source_type: "simulated".into(),
            status: ConnectionStatus::Connected,
            enabled: true,
            poll_interval_ms: None,
            last_seen_at: None,
        })
        .await
        .unwrap();

    let sequence_ids = [101_i64, 102, 103];
    let tags = [
        pump_tag(sequence_ids[0], source_id, "PUMP_101_DISCHARGE_PRESS", "psi", 5.0),
        pump_tag(sequence_ids[1], source_id, "PUMP_101_SUCTION_PRESS", "psi", 5.0),
        pump_tag(sequence_ids[2], source_id, "PUMP_101_FLOW_RATE", "gpm", 5.0),
    ];
    for tag in tags {
        metadata.upsert_tag(tag).await.unwrap();
    }
    (source_id, sequence_ids)
}

async fn pump_pattern_id(metadata: &dyn MetadataStore) -> uuid::Uuid {
    metadata
        .list_matchable_patterns()
        .await
        .unwrap()
        .into_iter()
        .find(|p| p.name == "Centrifugal Pump")
        .expect("seed library ships a Centrifugal Pump pattern")
        .id
}

async fn turbine_pattern_id(metadata: &dyn MetadataStore) -> uuid::Uuid {
    metadata
        .list_matchable_patterns()
        .await
        .unwrap()
        .into_iter()
        .find(|p| p.name == "Horizontal Axis Wind Turbine")
        .expect("seed library ships a Horizontal Axis Wind Turbine pattern")
        .id
}

async fn seed_turbine_tags(metadata: &InMemoryMetadataStore) -> (uuid::Uuid, [i64; 5]) {
    let source_id = uuid::Uuid::new_v4();
    metadata
        .upsert_data_source(DataSource {
            id: source_id,
            name: "ksh-001".into(),
            source_type: "simulated".into(),
            status: ConnectionStatus::Connected,
            enabled: true,
            poll_interval_ms: None,
            last_seen_at: None,
        })
        .await
        .unwrap();

    let sequence_ids = [201_i64, 202, 203, 204, 205];
    let tags = [
        pump_tag(sequence_ids[0], source_id, "KSH_001_WindSpeed", "m/s", 1.0),
        pump_tag(sequence_ids[1], source_id, "KSH_001_Power", "kW", 1.0),
        pump_tag(sequence_ids[2], source_id, "KSH_001_RotorRPM", "rpm", 1.0),
        pump_tag(sequence_ids[3], source_id, "KSH_001_PitchA", "deg", 5.0),
        pump_tag(sequence_ids[4], source_id, "KSH_001_NacellePosition", "deg", 5.0),
    ];
    for tag in tags {
        metadata.upsert_tag(tag).await.unwrap();
    }
    (source_id, sequence_ids)
}

// ===========================================================================
// Behavioral mode: pump cluster happy path
// ===========================================================================

#[tokio::test]
async fn behavioral_match_suggests_centrifugal_pump_for_correlated_cluster() {
    let metadata = InMemoryMetadataStore::new();
    flywheel_matcher::ensure_seeded(&metadata).await.unwrap();
    let now = Utc::now();

    let (_source_id, sequence_ids) = seed_pump_tags(&metadata).await;
    metadata.upsert_fingerprint(fingerprint(sequence_ids[0], 180.0, 220.0, 200.0, now)).await.unwrap();
    metadata.upsert_fingerprint(fingerprint(sequence_ids[1], 10.0, 50.0, 30.0, now)).await.unwrap();
    metadata.upsert_fingerprint(fingerprint(sequence_ids[2], 400.0, 600.0, 500.0, now)).await.unwrap();

    let cluster = Cluster::new(sequence_ids.to_vec(), 0.80);
    metadata.upsert_cluster(cluster.clone()).await.unwrap();

    let config = Config::default();
    let stats = flywheel_matcher::run_behavioral(&metadata, &config.matching, now).await.unwrap();
    assert_eq!(stats.clusters_considered, 1);
    assert!(stats.suggestions_created >= 1);

    let pump_id = pump_pattern_id(&metadata).await;
    let suggestion = metadata
        .find_suggestion(cluster.id, pump_id)
        .await
        .unwrap()
        .expect("pump cluster should match the Centrifugal Pump pattern");
    assert_eq!(suggestion.state, SuggestionState::Pending);
    assert!(suggestion.is_well_formed());
    assert!(suggestion.overall >= config.matching.min_confidence);
    assert_eq!(suggestion.scores.naming, 1.0, "all three required roles matched by name");
}

// ===========================================================================
// Naming regexes against the literal tag names named in the worked
// scenarios, not just the easier synonyms used above — these are the
// cases that catch a naming_patterns regex that's too narrow.
// ===========================================================================

#[tokio::test]
async fn behavioral_naming_score_is_exact_for_pump_scenario_tag_names() {
    let metadata = InMemoryMetadataStore::new();
    flywheel_matcher::ensure_seeded(&metadata).await.unwrap();
    let now = Utc::now();

    let source_id = uuid::Uuid::new_v4();
    metadata
        .upsert_data_source(DataSource {
            id: source_id,
            name: "unit-101".into(),
            source_type: "simulated".into(),
            status: ConnectionStatus::Connected,
            enabled: true,
            poll_interval_ms: None,
            last_seen_at: None,
        })
        .await
        .unwrap();

    let sequence_ids = [301_i64, 302, 303, 304, 305];
    let tags = [
        pump_tag(sequence_ids[0], source_id, "P101_DIS_PRESS", "psi", 5.0),
        pump_tag(sequence_ids[1], source_id, "P101_SUC_PRESS", "psi", 5.0),
        pump_tag(sequence_ids[2], source_id, "P101_FLOW", "gpm", 5.0),
        pump_tag(sequence_ids[3], source_id, "P101_AMPS", "A", 10.0),
        pump_tag(sequence_ids[4], source_id, "P101_DIS_TEMP", "degC", 30.0),
    ];
    for tag in tags {
        metadata.upsert_tag(tag).await.unwrap();
    }

    metadata.upsert_fingerprint(fingerprint(sequence_ids[0], 180.0, 220.0, 200.0, now)).await.unwrap();
    metadata.upsert_fingerprint(fingerprint(sequence_ids[1], 10.0, 50.0, 30.0, now)).await.unwrap();
    metadata.upsert_fingerprint(fingerprint(sequence_ids[2], 100.0, 900.0, 500.0, now)).await.unwrap();
    metadata.upsert_fingerprint(fingerprint(sequence_ids[3], 20.0, 80.0, 50.0, now)).await.unwrap();
    metadata.upsert_fingerprint(fingerprint(sequence_ids[4], 60.0, 140.0, 100.0, now)).await.unwrap();

    let cluster = Cluster::new(sequence_ids.to_vec(), 0.82);
    metadata.upsert_cluster(cluster.clone()).await.unwrap();

    let config = Config::default();
    flywheel_matcher::run_behavioral(&metadata, &config.matching, now).await.unwrap();

    let pump_id = pump_pattern_id(&metadata).await;
    let suggestion = metadata
        .find_suggestion(cluster.id, pump_id)
        .await
        .unwrap()
        .expect("the five scenario tag names should still match the Centrifugal Pump pattern by name");
    assert_eq!(suggestion.scores.naming, 1.0, "all required roles must match these exact tag names");
    assert!(suggestion.overall >= 0.65);
}

#[tokio::test]
async fn proactive_naming_score_clears_threshold_for_turbine_scenario_tag_names() {
    let metadata = InMemoryMetadataStore::new();
    flywheel_matcher::ensure_seeded(&metadata).await.unwrap();
    let now = Utc::now();

    let (_source_id, sequence_ids) = seed_turbine_tags(&metadata).await;
    let config = Config::default();
    let candidates = flywheel_matcher::unanalyzed_candidate_tags(&metadata).await.unwrap();
    assert_eq!(candidates.len(), 5);

    let stats = flywheel_matcher::run_proactive(&metadata, candidates, &config.matching, now).await.unwrap();
    assert_eq!(stats.suggestions_created, 1);

    let turbine_id = turbine_pattern_id(&metadata).await;
    let group_id = flywheel_core::model::cluster_id(&sequence_ids);
    let suggestion = metadata
        .find_suggestion(group_id, turbine_id)
        .await
        .unwrap()
        .expect("the five scenario tag names should match the Horizontal Axis Wind Turbine pattern by name");
    assert!(suggestion.scores.naming >= 0.8, "naming score was {}", suggestion.scores.naming);
    assert_eq!(suggestion.scores.correlation, 0.0);
    assert!(suggestion.overall >= 0.60);
}

// ===========================================================================
// Proactive mode: a match before any cluster has ever been detected
// ===========================================================================

#[tokio::test]
async fn proactive_match_precedes_behavioral_clustering_for_new_tags() {
    let metadata = InMemoryMetadataStore::new();
    flywheel_matcher::ensure_seeded(&metadata).await.unwrap();
    let now = Utc::now();

    let (_source_id, sequence_ids) = seed_pump_tags(&metadata).await;
    // No fingerprints, no cluster, no correlation edge — only naming,
    // unit, and metadata signals are available, which is exactly the
    // situation proactive mode is built for.
    assert!(metadata.list_active_clusters().await.unwrap().is_empty());

    let config = Config::default();
    let candidates = flywheel_matcher::unanalyzed_candidate_tags(&metadata).await.unwrap();
    assert_eq!(candidates.len(), 3);

    let stats = flywheel_matcher::run_proactive(&metadata, candidates, &config.matching, now).await.unwrap();
    assert_eq!(stats.groups_considered, 1);
    assert_eq!(stats.suggestions_created, 1);

    let pump_id = pump_pattern_id(&metadata).await;
    let group_id = flywheel_core::model::cluster_id(&sequence_ids);
    let suggestion = metadata
        .find_suggestion(group_id, pump_id)
        .await
        .unwrap()
        .expect("proactive mode should match the newly registered pump tags");
    assert!(suggestion.scores.correlation == 0.0, "proactive suggestions never credit correlation");
    assert!(suggestion.overall >= config.matching.min_confidence_proactive);

    // Once proactive mode has claimed this member set, a later behavioral
    // pass over the same tags must not also claim it — run_behavioral only
    // scans clusters that list_active_clusters reports, and proactive mode
    // registered exactly one (inactive-for-correlation) cluster for it.
    let clusters = metadata.list_active_clusters().await.unwrap();
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0].id, group_id);
}

// ===========================================================================
// Review lifecycle: approve learns, reject penalizes
// ===========================================================================

fn bare_pattern(confidence: f64) -> Pattern {
    Pattern {
        id: uuid::Uuid::new_v4(),
        name: "Test Rig".into(),
        category: "test".into(),
        description: String::new(),
        confidence,
        active: true,
        example_count: 0,
        rejection_count: 0,
        last_matched_at: None,
        roles: vec![PatternRole {
            name: "signal".into(),
            required: true,
            weight: 1.0,
            naming_patterns: vec![],
            expected_unit: None,
            expected_min: None,
            expected_max: None,
            typical_update_interval_secs: None,
        }],
    }
}

fn bare_suggestion(cluster_id: u128, pattern_id: uuid::Uuid, overall: f64) -> Suggestion {
    Suggestion::new(
        cluster_id,
        pattern_id,
        SubScores { naming: overall, correlation: overall, range: overall, rate: overall },
        overall,
        "test suggestion".into(),
        MatchExplanation { sub_scores: SubScores::default(), matched_roles: vec![], parsed_tokens: vec![] },
        "TEST_".into(),
    )
}

#[tokio::test]
async fn approve_suggestion_binds_every_member_and_boosts_confidence() {
    let metadata = InMemoryMetadataStore::new();
    let pattern = bare_pattern(0.70);
    metadata.upsert_pattern(pattern.clone()).await.unwrap();
    let cluster = Cluster::new(vec![1, 2, 3], 0.9);
    metadata.upsert_cluster(cluster.clone()).await.unwrap();
    let suggestion = bare_suggestion(cluster.id, pattern.id, 0.85);
    let suggestion_id = suggestion.id;
    metadata.upsert_suggestion(suggestion).await.unwrap();

    let config = LearningConfig::default();
    let now = Utc::now();
    let outcome = flywheel_learning::approve_suggestion(&metadata, suggestion_id, "op1".into(), &config, now)
        .await
        .unwrap();

    assert_eq!(outcome.bindings_created, 3);
    assert!((outcome.confidence_after - (0.70 + config.boost)).abs() < 1e-9);

    for sequence_id in cluster.members {
        let bindings = metadata.list_bindings_for_tag(sequence_id).await.unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].pattern_id, pattern.id);
    }

    let updated_pattern = metadata.get_pattern(pattern.id).await.unwrap().unwrap();
    assert!((updated_pattern.confidence - (0.70 + config.boost)).abs() < 1e-9);
    assert_eq!(updated_pattern.example_count, 1);

    let stored = metadata.get_suggestion(suggestion_id).await.unwrap().unwrap();
    assert_eq!(stored.state, SuggestionState::Approved);
    assert_eq!(stored.reviewer.as_deref(), Some("op1"));
}

#[tokio::test]
async fn reject_suggestion_penalizes_pattern_and_records_reason() {
    let metadata = InMemoryMetadataStore::new();
    let pattern = bare_pattern(0.32); // close to the floor, to also exercise clamping
    metadata.upsert_pattern(pattern.clone()).await.unwrap();
    let cluster = Cluster::new(vec![5, 6], 0.6);
    metadata.upsert_cluster(cluster.clone()).await.unwrap();
    let suggestion = bare_suggestion(cluster.id, pattern.id, 0.55);
    let suggestion_id = suggestion.id;
    metadata.upsert_suggestion(suggestion).await.unwrap();

    let config = LearningConfig::default();
    let now = Utc::now();
    let outcome = flywheel_learning::reject_suggestion(
        &metadata,
        suggestion_id,
        "op2".into(),
        "false positive, unrelated equipment".into(),
        &config,
        now,
    )
    .await
    .unwrap();

    assert_eq!(outcome.confidence_after, config.floor, "penalty below the floor clamps to it");

    let updated_pattern = metadata.get_pattern(pattern.id).await.unwrap().unwrap();
    assert_eq!(updated_pattern.rejection_count, 1);
    assert_eq!(updated_pattern.confidence, config.floor);

    let stored = metadata.get_suggestion(suggestion_id).await.unwrap().unwrap();
    assert_eq!(stored.state, SuggestionState::Rejected);
    assert_eq!(stored.rejection_reason.as_deref(), Some("false positive, unrelated equipment"));

    let feedback = metadata.list_feedback_for_suggestion(suggestion_id).await.unwrap();
    assert_eq!(feedback.len(), 1);
    assert_eq!(feedback[0].actor, "op2");
}

// ===========================================================================
// Confidence decay is linear in elapsed days since the last match
// ===========================================================================

#[tokio::test]
async fn decay_confidence_is_linear_in_days_since_last_match() {
    let metadata = InMemoryMetadataStore::new();
    let now = Utc::now();
    let config = LearningConfig::default();

    let mut pattern = bare_pattern(0.70);
    pattern.last_matched_at = Some(now - Duration::days(10));
    metadata.upsert_pattern(pattern.clone()).await.unwrap();

    let decayed = flywheel_learning::decay_confidence(&metadata, &config, now).await.unwrap();
    assert_eq!(decayed, 1);

    let expected = 0.70 * (1.0 - config.decay_per_day * 10.0);
    let updated = metadata.get_pattern(pattern.id).await.unwrap().unwrap();
    assert!((updated.confidence - expected).abs() < 1e-9);

    // Running decay again the same instant has no further stale window to
    // apply — last_matched_at is unchanged by decay itself, so the second
    // pass is not a no-op, but the per-day step composes the same way.
    let decayed_again = flywheel_learning::decay_confidence(&metadata, &config, now).await.unwrap();
    assert_eq!(decayed_again, 1);
    let twice = metadata.get_pattern(pattern.id).await.unwrap().unwrap();
    assert!((twice.confidence - expected * (1.0 - config.decay_per_day * 10.0)).abs() < 1e-9);
}

#[tokio::test]
async fn decay_never_pushes_confidence_below_the_floor() {
    let metadata = InMemoryMetadataStore::new();
    let now = Utc::now();
    let config = LearningConfig::default();

    let mut pattern = bare_pattern(config.floor + 0.01);
    pattern.last_matched_at = Some(now - Duration::days(3650));
    metadata.upsert_pattern(pattern.clone()).await.unwrap();

    flywheel_learning::decay_confidence(&metadata, &config, now).await.unwrap();
    let updated = metadata.get_pattern(pattern.id).await.unwrap().unwrap();
    assert!(updated.confidence >= config.floor);
}

// ===========================================================================
// Backfill chunking end to end
// ===========================================================================

#[tokio::test]
async fn backfill_worker_processes_every_chunk_and_accounts_all_points() {
    let start = DateTime::<Utc>::UNIX_EPOCH;
    let end = start + Duration::hours(4);
    let request = BackfillRequest {
        source_type: "simulated".into(),
        tag_addresses: vec![(1, "PUMP_101_DISCHARGE_PRESS".into())],
        start_time: start,
        end_time: end,
        chunk_duration: Duration::hours(1),
    };

    let mut registry = SourceRegistry::new();
    registry.register(SimulatedAdapter::new("simulated"));
    let store = InMemoryTimeSeriesStore::new();
    let queue = InMemoryQueue::new(64);
    let worker = BackfillWorker::new();
    let request_id = uuid::Uuid::new_v4();

    worker.process(request_id, &request, &registry, &store, &queue).await.unwrap();

    let stats = worker.stats.get(&request_id).expect("worker records stats for every processed request");
    assert_eq!(stats.chunks_total, 4);
    assert_eq!(stats.chunks_done, 4);
    assert_eq!(stats.chunks_failed, 0);
    // One sample per minute per the simulated adapter, over 4 contiguous
    // non-overlapping one-hour chunks: 4 * 60 = 240, with no duplication
    // or gap at the chunk boundaries.
    assert_eq!(stats.points_processed, 240);
}

#[tokio::test]
async fn backfill_with_unregistered_source_fails_every_chunk_without_erroring() {
    let start = DateTime::<Utc>::UNIX_EPOCH;
    let request = BackfillRequest {
        source_type: "no-such-source".into(),
        tag_addresses: vec![(1, "X".into())],
        start_time: start,
        end_time: start + Duration::hours(2),
        chunk_duration: Duration::hours(1),
    };

    let registry = SourceRegistry::new();
    let store = InMemoryTimeSeriesStore::new();
    let queue = InMemoryQueue::new(64);
    let worker = BackfillWorker::new();
    let request_id = uuid::Uuid::new_v4();

    worker.process(request_id, &request, &registry, &store, &queue).await.unwrap();

    let stats = worker.stats.get(&request_id).unwrap();
    assert_eq!(stats.chunks_failed, 2);
    assert_eq!(stats.chunks_done, 0);
}

// A handful of metadata-store roundtrips the matcher/learning scenarios
// above lean on, split out so a failure here points straight at the
// store rather than showing up as a confusing failure three layers up.
#[tokio::test]
async fn tag_and_binding_roundtrip_through_the_in_memory_store() {
    let metadata = InMemoryMetadataStore::new();
    let (_source_id, sequence_ids) = seed_pump_tags(&metadata).await;

    let tag = metadata.get_tag(sequence_ids[0]).await.unwrap().unwrap();
    assert_eq!(tag.name, "PUMP_101_DISCHARGE_PRESS");
    assert!(metadata.list_bindings_for_tag(sequence_ids[0]).await.unwrap().is_empty());

    metadata
        .upsert_binding(Binding {
            id: uuid::Uuid::new_v4(),
            sequence_id: sequence_ids[0],
            pattern_id: uuid::Uuid::new_v4(),
            role_name: Some("discharge_pressure".into()),
            reviewer: "op".into(),
            confidence_at_binding: 0.8,
            bound_at: Utc::now(),
        })
        .await
        .unwrap();
    assert_eq!(metadata.list_bindings_for_tag(sequence_ids[0]).await.unwrap().len(), 1);
}
