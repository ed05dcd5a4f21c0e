//! Ingestion pipeline: poll-based live ingestion plus a backfill request
//! API, both built on a pluggable [`SourceAdapter`].

mod adapters;
mod backfill;
mod pipeline;
mod registry;

pub use adapters::{FileReplayAdapter, SimulatedAdapter};
pub use backfill::{slice_chunks, BackfillRequest, BackfillStats, BackfillWorker};
pub use pipeline::{consume_telemetry, poll_once, PollStats};
pub use registry::SourceRegistry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flywheel_core::Result;

/// A single sample as returned by a source, before type coercion. `value`
/// is whatever the wire format produced (number, string, bool) — the
/// pipeline decides what's usable; only finite numerics survive.
#[derive(Clone, Debug)]
pub struct RawSample {
    pub address: String,
    pub timestamp: DateTime<Utc>,
    pub value: serde_json::Value,
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_type(&self) -> &str;

    /// Current-value read for a set of tag addresses, used by the live
    /// poller.
    async fn read_current(&self, addresses: &[String]) -> Result<Vec<RawSample>>;

    /// Historical range read for a single address, used by backfill.
    async fn read_range(
        &self,
        address: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawSample>>;
}

/// Coerces a raw value to a finite `f64`. Strings, booleans, null, and
/// non-finite numbers are all rejected — the pipeline skips them with a
/// one-line log rather than treating them as a hard error.
pub fn coerce_finite_f64(value: &serde_json::Value) -> Option<f64> {
    let n = value.as_f64()?;
    n.is_finite().then_some(n)
}
