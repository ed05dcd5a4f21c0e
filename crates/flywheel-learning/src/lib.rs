//! Confidence learning and maintenance: turns a reviewer's
//! approve/reject/defer decision into a pattern confidence update and a
//! binding, decays confidence on patterns that haven't matched
//! recently, and runs the daily housekeeping sweep.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use flywheel_core::config::{LearningConfig, MaintenanceConfig};
use flywheel_core::model::{Binding, FeedbackAction, FeedbackEntry, Pattern, Suggestion, SuggestionState};
use flywheel_core::{Error, Result};
use flywheel_store::MetadataStore;

#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    pub suggestion_id: Uuid,
    pub pattern_id: Uuid,
    pub confidence_before: f64,
    pub confidence_after: f64,
    pub bindings_created: usize,
}

#[derive(Debug, Clone)]
pub struct RejectionOutcome {
    pub suggestion_id: Uuid,
    pub pattern_id: Uuid,
    pub confidence_before: f64,
    pub confidence_after: f64,
}

async fn load_suggestion_and_pattern(
    metadata: &dyn MetadataStore,
    suggestion_id: Uuid,
) -> Result<(Suggestion, Pattern)> {
    let suggestion = metadata
        .get_suggestion(suggestion_id)
        .await?
        .ok_or_else(|| Error::Store(format!("no such suggestion: {suggestion_id}")))?;
    let pattern = metadata
        .get_pattern(suggestion.pattern_id)
        .await?
        .ok_or_else(|| Error::Store(format!("no such pattern: {}", suggestion.pattern_id)))?;
    Ok((suggestion, pattern))
}

/// Approval of a suggestion: boosts the pattern's confidence, binds
/// every tag in the suggestion's cluster to the pattern, and appends
/// feedback.
pub async fn approve_suggestion(
    metadata: &dyn MetadataStore,
    suggestion_id: Uuid,
    reviewer: String,
    config: &LearningConfig,
    now: DateTime<Utc>,
) -> Result<ApprovalOutcome> {
    let (suggestion, mut pattern) = load_suggestion_and_pattern(metadata, suggestion_id).await?;
    let confidence_before = pattern.confidence;
    let confidence_after = (confidence_before + config.boost).min(flywheel_core::model::MAX_CONFIDENCE);

    let cluster = metadata
        .get_cluster(suggestion.cluster_id)
        .await?
        .ok_or_else(|| Error::Store(format!("no such cluster: {}", suggestion.cluster_id)))?;

    let mut bindings_created = 0;
    for sequence_id in &cluster.members {
        metadata
            .upsert_binding(Binding {
                id: Uuid::new_v4(),
                sequence_id: *sequence_id,
                pattern_id: pattern.id,
                role_name: None,
                reviewer: reviewer.clone(),
                confidence_at_binding: suggestion.overall,
                bound_at: now,
            })
            .await?;
        bindings_created += 1;
    }

    metadata
        .append_feedback(FeedbackEntry {
            id: Uuid::new_v4(),
            suggestion_id: suggestion.id,
            action: FeedbackAction::Approved,
            actor: reviewer.clone(),
            confidence_before,
            confidence_after,
            rejection_reason: None,
            created_at: now,
        })
        .await?;

    pattern.confidence = confidence_after;
    pattern.last_matched_at = Some(now);
    pattern.example_count += 1;
    metadata.upsert_pattern(pattern.clone()).await?;

    metadata
        .set_suggestion_state(suggestion.id, SuggestionState::Approved, Some(reviewer), None)
        .await?;

    Ok(ApprovalOutcome {
        suggestion_id: suggestion.id,
        pattern_id: pattern.id,
        confidence_before,
        confidence_after,
        bindings_created,
    })
}

/// Rejection of a suggestion: penalizes the pattern's confidence and
/// stores the reviewer's reason on the suggestion.
pub async fn reject_suggestion(
    metadata: &dyn MetadataStore,
    suggestion_id: Uuid,
    reviewer: String,
    reason: String,
    config: &LearningConfig,
    now: DateTime<Utc>,
) -> Result<RejectionOutcome> {
    let (suggestion, mut pattern) = load_suggestion_and_pattern(metadata, suggestion_id).await?;
    let confidence_before = pattern.confidence;
    let confidence_after = (confidence_before - config.penalty).max(config.floor);

    metadata
        .append_feedback(FeedbackEntry {
            id: Uuid::new_v4(),
            suggestion_id: suggestion.id,
            action: FeedbackAction::Rejected,
            actor: reviewer.clone(),
            confidence_before,
            confidence_after,
            rejection_reason: Some(reason.clone()),
            created_at: now,
        })
        .await?;

    pattern.confidence = confidence_after;
    pattern.rejection_count += 1;
    metadata.upsert_pattern(pattern.clone()).await?;

    metadata
        .set_suggestion_state(suggestion.id, SuggestionState::Rejected, Some(reviewer), Some(reason))
        .await?;

    Ok(RejectionOutcome {
        suggestion_id: suggestion.id,
        pattern_id: pattern.id,
        confidence_before,
        confidence_after,
    })
}

/// Defer: feedback only, no confidence change.
pub async fn defer_suggestion(
    metadata: &dyn MetadataStore,
    suggestion_id: Uuid,
    actor: String,
    now: DateTime<Utc>,
) -> Result<()> {
    let (suggestion, pattern) = load_suggestion_and_pattern(metadata, suggestion_id).await?;

    metadata
        .append_feedback(FeedbackEntry {
            id: Uuid::new_v4(),
            suggestion_id: suggestion.id,
            action: FeedbackAction::Deferred,
            actor: actor.clone(),
            confidence_before: pattern.confidence,
            confidence_after: pattern.confidence,
            rejection_reason: None,
            created_at: now,
        })
        .await?;

    metadata
        .set_suggestion_state(suggestion.id, SuggestionState::Deferred, Some(actor), None)
        .await?;
    Ok(())
}

/// Confidence decay: once per run, every active pattern not matched in
/// the last 24h and above the floor decays proportionally to
/// days since its last match. Returns the number of patterns decayed.
pub async fn decay_confidence(
    metadata: &dyn MetadataStore,
    config: &LearningConfig,
    now: DateTime<Utc>,
) -> Result<usize> {
    let cutoff = now - Duration::hours(24);
    let mut decayed = 0;
    for mut pattern in metadata.list_active_patterns().await? {
        if pattern.confidence <= config.floor {
            continue;
        }
        let stale = match pattern.last_matched_at {
            Some(last) => last < cutoff,
            None => true,
        };
        if !stale {
            continue;
        }
        // A pattern that has never matched is treated as stale by exactly
        // one decay window rather than inventing a creation timestamp.
        let reference = pattern.last_matched_at.unwrap_or(now - Duration::hours(24));
        let days_since_update = (now - reference).num_seconds() as f64 / 86_400.0;
        let decayed_confidence = config.floor.max(pattern.confidence * (1.0 - config.decay_per_day * days_since_update));
        if (decayed_confidence - pattern.confidence).abs() < f64::EPSILON {
            continue;
        }
        pattern.confidence = decayed_confidence;
        metadata.upsert_pattern(pattern).await?;
        decayed += 1;
    }
    Ok(decayed)
}

/// Suggestion expiry: pending suggestions past `expires_at` transition
/// to `expired`.
pub async fn expire_suggestions(metadata: &dyn MetadataStore, now: DateTime<Utc>) -> Result<usize> {
    metadata.expire_pending_suggestions(now).await
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MaintenanceStats {
    pub suggestions_purged: usize,
    pub clusters_purged: usize,
    pub feedback_purged: usize,
    pub fingerprints_purged: usize,
}

/// Daily maintenance sweep: purges expired suggestions, inactive
/// clusters with no referencing suggestion, old feedback, and stale
/// fingerprints, then refreshes planner statistics. Correlation cache
/// entries are not swept here — they carry their own TTL and expire on
/// read (see the design notes' entry on fast-cache TTLs).
pub async fn run_daily_maintenance(
    metadata: &dyn MetadataStore,
    config: &MaintenanceConfig,
    now: DateTime<Utc>,
) -> Result<MaintenanceStats> {
    let short_cutoff = now - Duration::days(config.short_retention_days);
    let long_cutoff = now - Duration::days(config.retention_days);

    let suggestions_purged = metadata.purge_expired_suggestions(short_cutoff).await?;
    let clusters_purged = metadata.purge_inactive_clusters_without_references(short_cutoff).await?;
    let feedback_purged = metadata.purge_feedback(long_cutoff).await?;
    let fingerprints_purged = metadata.purge_stale_fingerprints(short_cutoff).await?;
    metadata.refresh_statistics().await?;

    Ok(MaintenanceStats {
        suggestions_purged,
        clusters_purged,
        feedback_purged,
        fingerprints_purged,
    })
}
