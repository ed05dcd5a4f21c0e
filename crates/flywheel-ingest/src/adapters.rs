//! The only two `SourceAdapter`s this crate ships: a deterministic
//! in-memory generator for tests, and a fixture replay adapter for local
//! operator runs. Protocol-specific adapters (OPC, PI) are out of scope.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use flywheel_core::Result;

use crate::{RawSample, SourceAdapter};

/// Generates a deterministic value per address on every call — a sine
/// wave keyed off the call count, so repeated polls produce varying but
/// reproducible data without any randomness dependency.
pub struct SimulatedAdapter {
    source_type: String,
    tick: Mutex<u64>,
}

impl SimulatedAdapter {
    pub fn new(source_type: impl Into<String>) -> Self {
        Self {
            source_type: source_type.into(),
            tick: Mutex::new(0),
        }
    }
}

#[async_trait]
impl SourceAdapter for SimulatedAdapter {
    fn source_type(&self) -> &str {
        &self.source_type
    }

    async fn read_current(&self, addresses: &[String]) -> Result<Vec<RawSample>> {
        let mut tick = self.tick.lock().expect("simulated adapter lock poisoned");
        *tick += 1;
        let t = *tick as f64;
        let now = Utc::now();
        Ok(addresses
            .iter()
            .enumerate()
            .map(|(i, address)| RawSample {
                address: address.clone(),
                timestamp: now,
                value: serde_json::json!(((t + i as f64) * 0.1).sin() * 10.0 + 50.0),
            })
            .collect())
    }

    async fn read_range(&self, address: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<RawSample>> {
        let mut samples = Vec::new();
        let mut t = start;
        let mut i = 0u32;
        while t < end {
            samples.push(RawSample {
                address: address.to_string(),
                timestamp: t,
                value: serde_json::json!((i as f64 * 0.1).sin() * 10.0 + 50.0),
            });
            t += chrono::Duration::minutes(1);
            i += 1;
        }
        Ok(samples)
    }
}

/// Replays a fixture of `{address, timestamp, value}` JSON lines loaded
/// once at construction — used for local operator runs against captured
/// data rather than a live or simulated source.
pub struct FileReplayAdapter {
    source_type: String,
    samples: Vec<RawSample>,
}

impl FileReplayAdapter {
    pub fn from_jsonl(source_type: impl Into<String>, contents: &str) -> Result<Self> {
        #[derive(serde::Deserialize)]
        struct Row {
            address: String,
            timestamp: DateTime<Utc>,
            value: serde_json::Value,
        }
        let mut samples = Vec::new();
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            let row: Row = serde_json::from_str(line).map_err(flywheel_core::Error::from)?;
            samples.push(RawSample {
                address: row.address,
                timestamp: row.timestamp,
                value: row.value,
            });
        }
        Ok(Self {
            source_type: source_type.into(),
            samples,
        })
    }
}

#[async_trait]
impl SourceAdapter for FileReplayAdapter {
    fn source_type(&self) -> &str {
        &self.source_type
    }

    async fn read_current(&self, addresses: &[String]) -> Result<Vec<RawSample>> {
        let wanted: HashMap<&str, ()> = addresses.iter().map(|a| (a.as_str(), ())).collect();
        let mut latest: HashMap<&str, &RawSample> = HashMap::new();
        for sample in &self.samples {
            if !wanted.contains_key(sample.address.as_str()) {
                continue;
            }
            latest
                .entry(sample.address.as_str())
                .and_modify(|cur| {
                    if sample.timestamp > cur.timestamp {
                        *cur = sample;
                    }
                })
                .or_insert(sample);
        }
        Ok(latest.into_values().cloned().collect())
    }

    async fn read_range(&self, address: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<RawSample>> {
        Ok(self
            .samples
            .iter()
            .filter(|s| s.address == address && s.timestamp >= start && s.timestamp < end)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simulated_adapter_produces_one_sample_per_address() {
        let adapter = SimulatedAdapter::new("simulated");
        let samples = adapter
            .read_current(&["PMP-101.DIS.PRESS".into(), "PMP-101.SUC.PRESS".into()])
            .await
            .unwrap();
        assert_eq!(samples.len(), 2);
        assert!(samples.iter().all(|s| s.value.as_f64().is_some()));
    }

    #[tokio::test]
    async fn file_replay_adapter_reads_only_matching_addresses() {
        let fixture = "{\"address\":\"A\",\"timestamp\":\"2024-01-01T00:00:00Z\",\"value\":1.0}\n\
                        {\"address\":\"B\",\"timestamp\":\"2024-01-01T00:00:00Z\",\"value\":2.0}\n";
        let adapter = FileReplayAdapter::from_jsonl("file", fixture).unwrap();
        let samples = adapter.read_current(&["A".into()]).await.unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].address, "A");
    }
}
