//! Error types shared across the Pattern Flywheel crates.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Transient external I/O (queue unreachable, store timeout). Retried
    /// in-place by the caller with capped backoff; this variant is what
    /// survives the final retry attempt.
    #[error("transient failure in {op}: {reason}")]
    Transient { op: String, reason: String },

    /// Telemetry rejected at ingestion: non-numeric, non-finite, or
    /// pre-epoch timestamp. Never fatal — the batch continues.
    #[error("malformed telemetry for {sequence_id}: {reason}")]
    MalformedTelemetry { sequence_id: i64, reason: String },

    /// A queue message failed to deserialize. The consumer skips it and
    /// advances the offset.
    #[error("deserialization failure: {0}")]
    Deserialization(String),

    /// A pattern role's naming regex failed to compile. The role is
    /// treated as unmatched for the current matcher iteration.
    #[error("invalid role naming pattern {pattern:?}: {reason}")]
    InvalidRolePattern { pattern: String, reason: String },

    /// Caller-initiated cancellation. The component returns without
    /// committing in-flight side effects.
    #[error("cancelled")]
    Cancelled,

    /// Metadata store failure.
    #[error("metadata store error: {0}")]
    Store(String),

    /// Time-series store failure.
    #[error("time-series store error: {0}")]
    TimeSeries(String),

    /// Fast cache failure.
    #[error("cache error: {0}")]
    Cache(String),

    /// Durable queue failure.
    #[error("queue error: {0}")]
    Queue(String),

    /// Configuration could not be parsed. Fatal at startup (exit code 3).
    #[error("config error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn transient(op: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transient {
            op: op.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed(sequence_id: i64, reason: impl Into<String>) -> Self {
        Self::MalformedTelemetry {
            sequence_id,
            reason: reason.into(),
        }
    }

    pub fn invalid_role_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRolePattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error kind is fatal at process startup (metadata
    /// store unreachable, queue producer cannot establish, config parse
    /// failure). All other kinds are recoverable.
    pub fn is_startup_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

impl From<tokio_postgres::Error> for Error {
    fn from(e: tokio_postgres::Error) -> Self {
        Self::Store(e.to_string())
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Self::Cache(e.to_string())
    }
}

impl From<rdkafka::error::KafkaError> for Error {
    fn from(e: rdkafka::error::KafkaError) -> Self {
        Self::Queue(e.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Deserialization(e.to_string())
    }
}
