//! Durable queue gateway: the boundary every batch of telemetry and
//! every analytical output crosses between components that may live in
//! different processes.

mod kafka;
mod memory;

pub use kafka::KafkaQueue;
pub use memory::InMemoryQueue;

use async_trait::async_trait;
use flywheel_core::Result;

/// Well-known topic names. Every producer/consumer pair in the pipeline
/// names one of these rather than an ad hoc string.
pub mod topics {
    pub const TELEMETRY_LIVE: &str = "telemetry.live";
    pub const TELEMETRY_BACKFILL: &str = "telemetry.backfill";
    pub const PATTERNS_SUGGESTIONS: &str = "patterns.suggestions";
    pub const PATTERNS_UPDATED: &str = "patterns.updated";
    pub const PATTERNS_CLUSTERS: &str = "patterns.clusters";
}

#[derive(Clone, Debug)]
pub struct PublishResult {
    pub success: bool,
    pub partition: i32,
    pub offset: i64,
    pub error_message: Option<String>,
}

#[derive(Clone, Debug)]
pub struct QueueMessage {
    pub topic: String,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub partition: i32,
    pub offset: i64,
}

#[async_trait]
pub trait QueueProducer: Send + Sync {
    async fn publish(&self, topic: &str, key: Option<&str>, payload: &[u8]) -> Result<PublishResult>;
}

/// Consumers commit offsets manually after the message's side effects are
/// durable (write to the time-series store, etc.) — at-least-once, never
/// at-most-once.
#[async_trait]
pub trait QueueConsumer: Send + Sync {
    async fn poll(&mut self) -> Result<Option<QueueMessage>>;
    async fn commit(&mut self, message: &QueueMessage) -> Result<()>;
}
