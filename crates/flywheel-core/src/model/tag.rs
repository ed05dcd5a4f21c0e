//! Tag (a.k.a. Point) and its owning data source.

use serde::{Deserialize, Serialize};

/// The value type a tag's samples carry. Only scalar-double tags feed the
/// behavioral pipeline; the others are ingested and stored but skipped by
/// C7 onward.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    ScalarDouble,
    Integer,
    Boolean,
    String,
}

/// Identified by a stable opaque identifier (`id`) and a monotonically
/// increasing 64-bit sequence ID (`sequence_id`) used as the compact key
/// in the time-series store. The sequence ID is assigned at creation and
/// never reused; two tags never share a name within the same deployment;
/// disabling a tag does not delete its telemetry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tag {
    pub id: uuid::Uuid,
    pub sequence_id: i64,
    pub name: String,
    pub source_id: uuid::Uuid,
    pub address: String,
    pub description: String,
    pub unit: String,
    pub value_type: ValueType,
    pub enabled: bool,
    /// Hint, in seconds, of how often the source is expected to push new
    /// values for this tag. Used by the proactive matcher's rate scoring
    /// and by the ingestion poller to size backoffs.
    pub typical_update_interval_secs: Option<f64>,
}

impl Tag {
    pub fn is_scalar(&self) -> bool {
        matches!(self.value_type, ValueType::ScalarDouble | ValueType::Integer)
    }
}

/// Connection lifecycle for a `DataSource`. Re-entrant after a cool-down:
/// `Error` always transitions back to `Connecting` on the next retry, never
/// straight to `Connected`. Status is advisory — it does not gate reads.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// The source a tag belongs to, a first-class record because the
/// ingestion pipeline needs it to decide what and how often to poll.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataSource {
    pub id: uuid::Uuid,
    pub name: String,
    pub source_type: String,
    pub status: ConnectionStatus,
    pub enabled: bool,
    pub poll_interval_ms: Option<u64>,
    pub last_seen_at: Option<chrono::DateTime<chrono::Utc>>,
}
