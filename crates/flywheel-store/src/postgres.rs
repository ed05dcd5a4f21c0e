//! Postgres-backed metadata store. Connects and spawns the connection
//! task the same way the other Postgres-backed stores here do, then
//! drives a handful of plain relational tables — no extensions
//! required.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls};
use uuid::Uuid;

use flywheel_core::model::{
    Binding, Cluster, ConnectionStatus, DataSource, FeedbackAction, FeedbackEntry, Fingerprint,
    KnowledgeBase, MatchExplanation, Pattern, PatternRole, SubScores, Suggestion, SuggestionState,
    Tag, ValueType,
};
use flywheel_core::{Error, Result};

use crate::MetadataStore;

pub struct PostgresMetadataStore {
    client: Arc<Mutex<Client>>,
}

impl PostgresMetadataStore {
    pub async fn connect(connection_string: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(connection_string, NoTls)
            .await
            .map_err(Error::from)?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "postgres connection error");
            }
        });

        let store = Self {
            client: Arc::new(Mutex::new(client)),
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        let client = self.client.lock().await;
        client
            .batch_execute(
                r#"
                CREATE TABLE IF NOT EXISTS data_sources (
                    id UUID PRIMARY KEY,
                    name TEXT NOT NULL,
                    source_type TEXT NOT NULL,
                    status TEXT NOT NULL,
                    enabled BOOLEAN NOT NULL,
                    poll_interval_ms BIGINT,
                    last_seen_at TIMESTAMPTZ
                );

                CREATE TABLE IF NOT EXISTS fingerprints (
                    sequence_id BIGINT PRIMARY KEY,
                    sample_count BIGINT NOT NULL,
                    mean DOUBLE PRECISION NOT NULL,
                    stddev DOUBLE PRECISION NOT NULL,
                    min DOUBLE PRECISION NOT NULL,
                    max DOUBLE PRECISION NOT NULL,
                    update_rate DOUBLE PRECISION NOT NULL,
                    window_start TIMESTAMPTZ NOT NULL,
                    window_end TIMESTAMPTZ NOT NULL,
                    computed_at TIMESTAMPTZ NOT NULL
                );

                CREATE TABLE IF NOT EXISTS tags (
                    id UUID PRIMARY KEY,
                    sequence_id BIGINT UNIQUE NOT NULL,
                    name TEXT NOT NULL,
                    source_id UUID NOT NULL,
                    address TEXT NOT NULL,
                    description TEXT NOT NULL,
                    unit TEXT NOT NULL,
                    value_type TEXT NOT NULL,
                    enabled BOOLEAN NOT NULL,
                    typical_update_interval_secs DOUBLE PRECISION
                );

                CREATE TABLE IF NOT EXISTS patterns (
                    id UUID PRIMARY KEY,
                    name TEXT NOT NULL,
                    category TEXT NOT NULL,
                    description TEXT NOT NULL,
                    confidence DOUBLE PRECISION NOT NULL,
                    active BOOLEAN NOT NULL,
                    example_count BIGINT NOT NULL,
                    rejection_count BIGINT NOT NULL,
                    last_matched_at TIMESTAMPTZ,
                    roles JSONB NOT NULL
                );

                CREATE TABLE IF NOT EXISTS clusters (
                    id NUMERIC(39,0) PRIMARY KEY,
                    members JSONB NOT NULL,
                    cohesion DOUBLE PRECISION NOT NULL,
                    is_active BOOLEAN NOT NULL,
                    detected_at TIMESTAMPTZ NOT NULL
                );

                CREATE TABLE IF NOT EXISTS suggestions (
                    id UUID PRIMARY KEY,
                    cluster_id NUMERIC(39,0) NOT NULL,
                    pattern_id UUID NOT NULL,
                    scores JSONB NOT NULL,
                    overall DOUBLE PRECISION NOT NULL,
                    explanation TEXT NOT NULL,
                    structured_explanation JSONB NOT NULL,
                    tag_prefix TEXT NOT NULL,
                    state TEXT NOT NULL,
                    reviewer TEXT,
                    reviewed_at TIMESTAMPTZ,
                    rejection_reason TEXT,
                    created_at TIMESTAMPTZ NOT NULL,
                    expires_at TIMESTAMPTZ NOT NULL,
                    UNIQUE (cluster_id, pattern_id)
                );

                CREATE TABLE IF NOT EXISTS bindings (
                    id UUID PRIMARY KEY,
                    sequence_id BIGINT NOT NULL,
                    pattern_id UUID NOT NULL,
                    role_name TEXT,
                    reviewer TEXT NOT NULL,
                    confidence_at_binding DOUBLE PRECISION NOT NULL,
                    bound_at TIMESTAMPTZ NOT NULL,
                    UNIQUE (sequence_id, pattern_id)
                );

                CREATE TABLE IF NOT EXISTS feedback (
                    id UUID PRIMARY KEY,
                    suggestion_id UUID NOT NULL,
                    action TEXT NOT NULL,
                    actor TEXT NOT NULL,
                    confidence_before DOUBLE PRECISION NOT NULL,
                    confidence_after DOUBLE PRECISION NOT NULL,
                    rejection_reason TEXT,
                    created_at TIMESTAMPTZ NOT NULL
                );

                CREATE TABLE IF NOT EXISTS knowledge_base (
                    singleton BOOLEAN PRIMARY KEY DEFAULT TRUE,
                    document JSONB NOT NULL,
                    CHECK (singleton)
                );
                "#,
            )
            .await
            .map_err(Error::from)?;
        Ok(())
    }
}

fn connection_status_str(s: ConnectionStatus) -> &'static str {
    match s {
        ConnectionStatus::Disconnected => "disconnected",
        ConnectionStatus::Connecting => "connecting",
        ConnectionStatus::Connected => "connected",
        ConnectionStatus::Error => "error",
    }
}

fn parse_connection_status(s: &str) -> ConnectionStatus {
    match s {
        "connecting" => ConnectionStatus::Connecting,
        "connected" => ConnectionStatus::Connected,
        "error" => ConnectionStatus::Error,
        _ => ConnectionStatus::Disconnected,
    }
}

fn value_type_str(vt: ValueType) -> &'static str {
    match vt {
        ValueType::ScalarDouble => "scalar_double",
        ValueType::Integer => "integer",
        ValueType::Boolean => "boolean",
        ValueType::String => "string",
    }
}

fn parse_value_type(s: &str) -> ValueType {
    match s {
        "integer" => ValueType::Integer,
        "boolean" => ValueType::Boolean,
        "string" => ValueType::String,
        _ => ValueType::ScalarDouble,
    }
}

fn suggestion_state_str(s: SuggestionState) -> &'static str {
    match s {
        SuggestionState::Pending => "pending",
        SuggestionState::Approved => "approved",
        SuggestionState::Rejected => "rejected",
        SuggestionState::Deferred => "deferred",
        SuggestionState::Expired => "expired",
    }
}

fn parse_suggestion_state(s: &str) -> SuggestionState {
    match s {
        "approved" => SuggestionState::Approved,
        "rejected" => SuggestionState::Rejected,
        "deferred" => SuggestionState::Deferred,
        "expired" => SuggestionState::Expired,
        _ => SuggestionState::Pending,
    }
}

fn feedback_action_str(a: FeedbackAction) -> &'static str {
    match a {
        FeedbackAction::Approved => "approved",
        FeedbackAction::Rejected => "rejected",
        FeedbackAction::Deferred => "deferred",
    }
}

fn parse_feedback_action(s: &str) -> FeedbackAction {
    match s {
        "rejected" => FeedbackAction::Rejected,
        "deferred" => FeedbackAction::Deferred,
        _ => FeedbackAction::Approved,
    }
}

/// `u128` cluster IDs don't fit any native Postgres integer type; they
/// travel as their decimal string representation into a `NUMERIC` column.
fn cluster_id_to_sql(id: u128) -> String {
    id.to_string()
}

fn cluster_id_from_sql(s: &str) -> Result<u128> {
    s.parse()
        .map_err(|_| Error::Store(format!("malformed cluster id in row: {s}")))
}

#[async_trait]
impl MetadataStore for PostgresMetadataStore {
    async fn upsert_data_source(&self, source: DataSource) -> Result<()> {
        let client = self.client.lock().await;
        client
            .execute(
                "INSERT INTO data_sources (id, name, source_type, status, enabled, poll_interval_ms, last_seen_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (id) DO UPDATE SET
                    name = EXCLUDED.name, source_type = EXCLUDED.source_type, status = EXCLUDED.status,
                    enabled = EXCLUDED.enabled, poll_interval_ms = EXCLUDED.poll_interval_ms,
                    last_seen_at = EXCLUDED.last_seen_at",
                &[
                    &source.id,
                    &source.name,
                    &source.source_type,
                    &connection_status_str(source.status),
                    &source.enabled,
                    &source.poll_interval_ms.map(|v| v as i64),
                    &source.last_seen_at,
                ],
            )
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn get_data_source(&self, id: Uuid) -> Result<Option<DataSource>> {
        let client = self.client.lock().await;
        let row = client
            .query_opt("SELECT * FROM data_sources WHERE id = $1", &[&id])
            .await
            .map_err(Error::from)?;
        Ok(row.map(row_to_data_source))
    }

    async fn list_enabled_data_sources(&self) -> Result<Vec<DataSource>> {
        let client = self.client.lock().await;
        let rows = client
            .query("SELECT * FROM data_sources WHERE enabled", &[])
            .await
            .map_err(Error::from)?;
        Ok(rows.into_iter().map(row_to_data_source).collect())
    }

    async fn upsert_fingerprint(&self, fingerprint: Fingerprint) -> Result<()> {
        let client = self.client.lock().await;
        client
            .execute(
                "INSERT INTO fingerprints (sequence_id, sample_count, mean, stddev, min, max, update_rate, window_start, window_end, computed_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                 ON CONFLICT (sequence_id) DO UPDATE SET
                    sample_count = EXCLUDED.sample_count, mean = EXCLUDED.mean, stddev = EXCLUDED.stddev,
                    min = EXCLUDED.min, max = EXCLUDED.max, update_rate = EXCLUDED.update_rate,
                    window_start = EXCLUDED.window_start, window_end = EXCLUDED.window_end, computed_at = EXCLUDED.computed_at",
                &[
                    &fingerprint.sequence_id,
                    &(fingerprint.sample_count as i64),
                    &fingerprint.mean,
                    &fingerprint.stddev,
                    &fingerprint.min,
                    &fingerprint.max,
                    &fingerprint.update_rate,
                    &fingerprint.window_start,
                    &fingerprint.window_end,
                    &fingerprint.computed_at,
                ],
            )
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn get_fingerprint(&self, sequence_id: i64) -> Result<Option<Fingerprint>> {
        let client = self.client.lock().await;
        let row = client
            .query_opt("SELECT * FROM fingerprints WHERE sequence_id = $1", &[&sequence_id])
            .await
            .map_err(Error::from)?;
        Ok(row.map(|r| Fingerprint {
            sequence_id: r.get("sequence_id"),
            sample_count: r.get::<_, i64>("sample_count") as u64,
            mean: r.get("mean"),
            stddev: r.get("stddev"),
            min: r.get("min"),
            max: r.get("max"),
            update_rate: r.get("update_rate"),
            window_start: r.get("window_start"),
            window_end: r.get("window_end"),
            computed_at: r.get("computed_at"),
        }))
    }

    async fn purge_stale_fingerprints(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let client = self.client.lock().await;
        let affected = client
            .execute("DELETE FROM fingerprints WHERE computed_at < $1", &[&older_than])
            .await
            .map_err(Error::from)?;
        Ok(affected as usize)
    }

    async fn upsert_tag(&self, tag: Tag) -> Result<()> {
        let client = self.client.lock().await;
        client
            .execute(
                "INSERT INTO tags (id, sequence_id, name, source_id, address, description, unit, value_type, enabled, typical_update_interval_secs)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                 ON CONFLICT (sequence_id) DO UPDATE SET
                    name = EXCLUDED.name, source_id = EXCLUDED.source_id, address = EXCLUDED.address,
                    description = EXCLUDED.description, unit = EXCLUDED.unit, value_type = EXCLUDED.value_type,
                    enabled = EXCLUDED.enabled, typical_update_interval_secs = EXCLUDED.typical_update_interval_secs",
                &[
                    &tag.id,
                    &tag.sequence_id,
                    &tag.name,
                    &tag.source_id,
                    &tag.address,
                    &tag.description,
                    &tag.unit,
                    &value_type_str(tag.value_type),
                    &tag.enabled,
                    &tag.typical_update_interval_secs,
                ],
            )
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn get_tag(&self, sequence_id: i64) -> Result<Option<Tag>> {
        let client = self.client.lock().await;
        let row = client
            .query_opt("SELECT * FROM tags WHERE sequence_id = $1", &[&sequence_id])
            .await
            .map_err(Error::from)?;
        Ok(row.map(|r| Tag {
            id: r.get("id"),
            sequence_id: r.get("sequence_id"),
            name: r.get("name"),
            source_id: r.get("source_id"),
            address: r.get("address"),
            description: r.get("description"),
            unit: r.get("unit"),
            value_type: parse_value_type(r.get("value_type")),
            enabled: r.get("enabled"),
            typical_update_interval_secs: r.get("typical_update_interval_secs"),
        }))
    }

    async fn list_enabled_tags(&self) -> Result<Vec<Tag>> {
        let client = self.client.lock().await;
        let rows = client
            .query("SELECT * FROM tags WHERE enabled", &[])
            .await
            .map_err(Error::from)?;
        Ok(rows
            .into_iter()
            .map(|r| Tag {
                id: r.get("id"),
                sequence_id: r.get("sequence_id"),
                name: r.get("name"),
                source_id: r.get("source_id"),
                address: r.get("address"),
                description: r.get("description"),
                unit: r.get("unit"),
                value_type: parse_value_type(r.get("value_type")),
                enabled: r.get("enabled"),
                typical_update_interval_secs: r.get("typical_update_interval_secs"),
            })
            .collect())
    }

    async fn list_tags_for_source(&self, source_id: Uuid) -> Result<Vec<Tag>> {
        let client = self.client.lock().await;
        let rows = client
            .query("SELECT * FROM tags WHERE source_id = $1", &[&source_id])
            .await
            .map_err(Error::from)?;
        Ok(rows
            .into_iter()
            .map(|r| Tag {
                id: r.get("id"),
                sequence_id: r.get("sequence_id"),
                name: r.get("name"),
                source_id: r.get("source_id"),
                address: r.get("address"),
                description: r.get("description"),
                unit: r.get("unit"),
                value_type: parse_value_type(r.get("value_type")),
                enabled: r.get("enabled"),
                typical_update_interval_secs: r.get("typical_update_interval_secs"),
            })
            .collect())
    }

    async fn upsert_pattern(&self, pattern: Pattern) -> Result<()> {
        let roles_json = serde_json::to_value(&pattern.roles).map_err(Error::from)?;
        let client = self.client.lock().await;
        client
            .execute(
                "INSERT INTO patterns (id, name, category, description, confidence, active, example_count, rejection_count, last_matched_at, roles)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                 ON CONFLICT (id) DO UPDATE SET
                    name = EXCLUDED.name, category = EXCLUDED.category, description = EXCLUDED.description,
                    confidence = EXCLUDED.confidence, active = EXCLUDED.active, example_count = EXCLUDED.example_count,
                    rejection_count = EXCLUDED.rejection_count, last_matched_at = EXCLUDED.last_matched_at, roles = EXCLUDED.roles",
                &[
                    &pattern.id,
                    &pattern.name,
                    &pattern.category,
                    &pattern.description,
                    &pattern.confidence,
                    &pattern.active,
                    &(pattern.example_count as i64),
                    &(pattern.rejection_count as i64),
                    &pattern.last_matched_at,
                    &roles_json,
                ],
            )
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn get_pattern(&self, id: Uuid) -> Result<Option<Pattern>> {
        let client = self.client.lock().await;
        let row = client
            .query_opt("SELECT * FROM patterns WHERE id = $1", &[&id])
            .await
            .map_err(Error::from)?;
        row.map(row_to_pattern).transpose()
    }

    async fn list_matchable_patterns(&self) -> Result<Vec<Pattern>> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT * FROM patterns WHERE active AND confidence >= $1 ORDER BY confidence DESC",
                &[&flywheel_core::model::MIN_CONFIDENCE],
            )
            .await
            .map_err(Error::from)?;
        rows.into_iter().map(row_to_pattern).collect()
    }

    async fn list_active_patterns(&self) -> Result<Vec<Pattern>> {
        let client = self.client.lock().await;
        let rows = client
            .query("SELECT * FROM patterns WHERE active", &[])
            .await
            .map_err(Error::from)?;
        rows.into_iter().map(row_to_pattern).collect()
    }

    async fn upsert_cluster(&self, cluster: Cluster) -> Result<()> {
        let members_json = serde_json::to_value(&cluster.members).map_err(Error::from)?;
        let client = self.client.lock().await;
        client
            .execute(
                "INSERT INTO clusters (id, members, cohesion, is_active, detected_at)
                 VALUES ($1::numeric, $2, $3, $4, $5)
                 ON CONFLICT (id) DO UPDATE SET
                    members = EXCLUDED.members, cohesion = EXCLUDED.cohesion,
                    is_active = EXCLUDED.is_active, detected_at = EXCLUDED.detected_at",
                &[
                    &cluster_id_to_sql(cluster.id),
                    &members_json,
                    &cluster.cohesion,
                    &cluster.is_active,
                    &cluster.detected_at,
                ],
            )
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn get_cluster(&self, id: u128) -> Result<Option<Cluster>> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                "SELECT id::text, members, cohesion, is_active, detected_at FROM clusters WHERE id = $1::numeric",
                &[&cluster_id_to_sql(id)],
            )
            .await
            .map_err(Error::from)?;
        row.map(row_to_cluster).transpose()
    }

    async fn list_active_clusters(&self) -> Result<Vec<Cluster>> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT id::text, members, cohesion, is_active, detected_at FROM clusters WHERE is_active",
                &[],
            )
            .await
            .map_err(Error::from)?;
        rows.into_iter().map(row_to_cluster).collect()
    }

    async fn deactivate_stale_clusters(
        &self,
        detected_ids: &[u128],
        stale_before: DateTime<Utc>,
    ) -> Result<usize> {
        let detected: Vec<String> = detected_ids.iter().map(|id| cluster_id_to_sql(*id)).collect();
        let client = self.client.lock().await;
        let affected = client
            .execute(
                "UPDATE clusters SET is_active = FALSE
                 WHERE is_active AND detected_at < $1 AND NOT (id::text = ANY($2))",
                &[&stale_before, &detected],
            )
            .await
            .map_err(Error::from)?;
        Ok(affected as usize)
    }

    async fn upsert_suggestion(&self, suggestion: Suggestion) -> Result<()> {
        let scores_json = serde_json::to_value(&suggestion.scores).map_err(Error::from)?;
        let structured_json =
            serde_json::to_value(&suggestion.structured_explanation).map_err(Error::from)?;
        let client = self.client.lock().await;
        client
            .execute(
                "INSERT INTO suggestions (id, cluster_id, pattern_id, scores, overall, explanation, structured_explanation, tag_prefix, state, reviewer, reviewed_at, rejection_reason, created_at, expires_at)
                 VALUES ($1, $2::numeric, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                 ON CONFLICT (cluster_id, pattern_id) DO UPDATE SET
                    scores = EXCLUDED.scores, overall = EXCLUDED.overall, explanation = EXCLUDED.explanation,
                    structured_explanation = EXCLUDED.structured_explanation, tag_prefix = EXCLUDED.tag_prefix,
                    state = EXCLUDED.state, reviewer = EXCLUDED.reviewer, reviewed_at = EXCLUDED.reviewed_at,
                    rejection_reason = EXCLUDED.rejection_reason, expires_at = EXCLUDED.expires_at",
                &[
                    &suggestion.id,
                    &cluster_id_to_sql(suggestion.cluster_id),
                    &suggestion.pattern_id,
                    &scores_json,
                    &suggestion.overall,
                    &suggestion.explanation,
                    &structured_json,
                    &suggestion.tag_prefix,
                    &suggestion_state_str(suggestion.state),
                    &suggestion.reviewer,
                    &suggestion.reviewed_at,
                    &suggestion.rejection_reason,
                    &suggestion.created_at,
                    &suggestion.expires_at,
                ],
            )
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn get_suggestion(&self, id: Uuid) -> Result<Option<Suggestion>> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                "SELECT *, cluster_id::text AS cluster_id_text FROM suggestions WHERE id = $1",
                &[&id],
            )
            .await
            .map_err(Error::from)?;
        row.map(row_to_suggestion).transpose()
    }

    async fn find_suggestion(&self, cluster_id: u128, pattern_id: Uuid) -> Result<Option<Suggestion>> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                "SELECT *, cluster_id::text AS cluster_id_text FROM suggestions WHERE cluster_id = $1::numeric AND pattern_id = $2",
                &[&cluster_id_to_sql(cluster_id), &pattern_id],
            )
            .await
            .map_err(Error::from)?;
        row.map(row_to_suggestion).transpose()
    }

    async fn list_pending_suggestions(&self) -> Result<Vec<Suggestion>> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT *, cluster_id::text AS cluster_id_text FROM suggestions WHERE state = 'pending'",
                &[],
            )
            .await
            .map_err(Error::from)?;
        rows.into_iter().map(row_to_suggestion).collect()
    }

    async fn has_recent_pending_suggestion(&self, cluster_id: u128, since: DateTime<Utc>) -> Result<bool> {
        let client = self.client.lock().await;
        let row = client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM suggestions WHERE cluster_id = $1::numeric AND state = 'pending' AND created_at >= $2)",
                &[&cluster_id_to_sql(cluster_id), &since],
            )
            .await
            .map_err(Error::from)?;
        Ok(row.get(0))
    }

    async fn set_suggestion_state(
        &self,
        id: Uuid,
        state: SuggestionState,
        reviewer: Option<String>,
        rejection_reason: Option<String>,
    ) -> Result<()> {
        let reviewed_at =
            (state.is_terminal_for_confidence() || state == SuggestionState::Deferred).then(Utc::now);
        let client = self.client.lock().await;
        client
            .execute(
                "UPDATE suggestions SET state = $1, reviewer = $2, rejection_reason = $3, reviewed_at = COALESCE($4, reviewed_at)
                 WHERE id = $5",
                &[
                    &suggestion_state_str(state),
                    &reviewer,
                    &rejection_reason,
                    &reviewed_at,
                    &id,
                ],
            )
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn upsert_binding(&self, binding: Binding) -> Result<()> {
        let client = self.client.lock().await;
        client
            .execute(
                "INSERT INTO bindings (id, sequence_id, pattern_id, role_name, reviewer, confidence_at_binding, bound_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (sequence_id, pattern_id) DO UPDATE SET
                    role_name = EXCLUDED.role_name, reviewer = EXCLUDED.reviewer,
                    confidence_at_binding = EXCLUDED.confidence_at_binding, bound_at = EXCLUDED.bound_at",
                &[
                    &binding.id,
                    &binding.sequence_id,
                    &binding.pattern_id,
                    &binding.role_name,
                    &binding.reviewer,
                    &binding.confidence_at_binding,
                    &binding.bound_at,
                ],
            )
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn list_bindings_for_tag(&self, sequence_id: i64) -> Result<Vec<Binding>> {
        let client = self.client.lock().await;
        let rows = client
            .query("SELECT * FROM bindings WHERE sequence_id = $1", &[&sequence_id])
            .await
            .map_err(Error::from)?;
        Ok(rows
            .into_iter()
            .map(|r| Binding {
                id: r.get("id"),
                sequence_id: r.get("sequence_id"),
                pattern_id: r.get("pattern_id"),
                role_name: r.get("role_name"),
                reviewer: r.get("reviewer"),
                confidence_at_binding: r.get("confidence_at_binding"),
                bound_at: r.get("bound_at"),
            })
            .collect())
    }

    async fn append_feedback(&self, entry: FeedbackEntry) -> Result<()> {
        let client = self.client.lock().await;
        client
            .execute(
                "INSERT INTO feedback (id, suggestion_id, action, actor, confidence_before, confidence_after, rejection_reason, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                &[
                    &entry.id,
                    &entry.suggestion_id,
                    &feedback_action_str(entry.action),
                    &entry.actor,
                    &entry.confidence_before,
                    &entry.confidence_after,
                    &entry.rejection_reason,
                    &entry.created_at,
                ],
            )
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn list_feedback_for_suggestion(&self, suggestion_id: Uuid) -> Result<Vec<FeedbackEntry>> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT * FROM feedback WHERE suggestion_id = $1 ORDER BY created_at",
                &[&suggestion_id],
            )
            .await
            .map_err(Error::from)?;
        Ok(rows
            .into_iter()
            .map(|r| FeedbackEntry {
                id: r.get("id"),
                suggestion_id: r.get("suggestion_id"),
                action: parse_feedback_action(r.get("action")),
                actor: r.get("actor"),
                confidence_before: r.get("confidence_before"),
                confidence_after: r.get("confidence_after"),
                rejection_reason: r.get("rejection_reason"),
                created_at: r.get("created_at"),
            })
            .collect())
    }

    async fn load_knowledge_base(&self) -> Result<KnowledgeBase> {
        let client = self.client.lock().await;
        let row = client
            .query_opt("SELECT document FROM knowledge_base WHERE singleton", &[])
            .await
            .map_err(Error::from)?;
        match row {
            Some(r) => {
                let doc: serde_json::Value = r.get("document");
                serde_json::from_value(doc).map_err(Error::from)
            }
            None => Ok(KnowledgeBase::default()),
        }
    }

    async fn purge_expired_suggestions(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let client = self.client.lock().await;
        let affected = client
            .execute(
                "DELETE FROM suggestions WHERE state = 'expired' AND expires_at < $1",
                &[&older_than],
            )
            .await
            .map_err(Error::from)?;
        Ok(affected as usize)
    }

    async fn purge_inactive_clusters_without_references(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let client = self.client.lock().await;
        let affected = client
            .execute(
                "DELETE FROM clusters c WHERE NOT c.is_active AND c.detected_at < $1
                 AND NOT EXISTS (SELECT 1 FROM suggestions s WHERE s.cluster_id = c.id)",
                &[&older_than],
            )
            .await
            .map_err(Error::from)?;
        Ok(affected as usize)
    }

    async fn purge_feedback(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let client = self.client.lock().await;
        let affected = client
            .execute("DELETE FROM feedback WHERE created_at < $1", &[&older_than])
            .await
            .map_err(Error::from)?;
        Ok(affected as usize)
    }

    async fn expire_pending_suggestions(&self, now: DateTime<Utc>) -> Result<usize> {
        let client = self.client.lock().await;
        let affected = client
            .execute(
                "UPDATE suggestions SET state = 'expired' WHERE state = 'pending' AND expires_at <= $1",
                &[&now],
            )
            .await
            .map_err(Error::from)?;
        Ok(affected as usize)
    }

    async fn refresh_statistics(&self) -> Result<()> {
        let client = self.client.lock().await;
        client.batch_execute("ANALYZE").await.map_err(Error::from)?;
        Ok(())
    }
}

fn row_to_data_source(r: tokio_postgres::Row) -> DataSource {
    DataSource {
        id: r.get("id"),
        name: r.get("name"),
        source_type: r.get("source_type"),
        status: parse_connection_status(r.get("status")),
        enabled: r.get("enabled"),
        poll_interval_ms: r.get::<_, Option<i64>>("poll_interval_ms").map(|v| v as u64),
        last_seen_at: r.get("last_seen_at"),
    }
}

fn row_to_pattern(r: tokio_postgres::Row) -> Result<Pattern> {
    let roles_json: serde_json::Value = r.get("roles");
    let roles: Vec<PatternRole> = serde_json::from_value(roles_json).map_err(Error::from)?;
    Ok(Pattern {
        id: r.get("id"),
        name: r.get("name"),
        category: r.get("category"),
        description: r.get("description"),
        confidence: r.get("confidence"),
        active: r.get("active"),
        example_count: r.get::<_, i64>("example_count") as u64,
        rejection_count: r.get::<_, i64>("rejection_count") as u64,
        last_matched_at: r.get("last_matched_at"),
        roles,
    })
}

fn row_to_cluster(r: tokio_postgres::Row) -> Result<Cluster> {
    let id = cluster_id_from_sql(r.get("id"))?;
    let members_json: serde_json::Value = r.get("members");
    let members: Vec<i64> = serde_json::from_value(members_json).map_err(Error::from)?;
    Ok(Cluster {
        id,
        members,
        cohesion: r.get("cohesion"),
        is_active: r.get("is_active"),
        detected_at: r.get("detected_at"),
    })
}

fn row_to_suggestion(r: tokio_postgres::Row) -> Result<Suggestion> {
    let cluster_id = cluster_id_from_sql(r.get("cluster_id_text"))?;
    let scores_json: serde_json::Value = r.get("scores");
    let scores: SubScores = serde_json::from_value(scores_json).map_err(Error::from)?;
    let structured_json: serde_json::Value = r.get("structured_explanation");
    let structured_explanation: MatchExplanation =
        serde_json::from_value(structured_json).map_err(Error::from)?;
    Ok(Suggestion {
        id: r.get("id"),
        cluster_id,
        pattern_id: r.get("pattern_id"),
        scores,
        overall: r.get("overall"),
        explanation: r.get("explanation"),
        structured_explanation,
        tag_prefix: r.get("tag_prefix"),
        state: parse_suggestion_state(r.get("state")),
        reviewer: r.get("reviewer"),
        reviewed_at: r.get("reviewed_at"),
        rejection_reason: r.get("rejection_reason"),
        created_at: r.get("created_at"),
        expires_at: r.get("expires_at"),
    })
}
