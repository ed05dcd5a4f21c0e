//! Live poll loop: fetch → coerce → batch → publish → cache, and the
//! telemetry-topic consumer that fans batches out into the time-series
//! store.

use std::collections::HashMap;

use chrono::Duration;

use flywheel_cache::FastCache;
use flywheel_core::model::{Batch, DataPoint, Quality};
use flywheel_core::Result;
use flywheel_queue::{topics, QueueConsumer, QueueProducer};
use flywheel_store::MetadataStore;
use flywheel_timeseries::TimeSeriesStore;

use crate::{coerce_finite_f64, SourceRegistry};

#[derive(Debug, Default, Clone, Copy)]
pub struct PollStats {
    pub sources_polled: u64,
    pub points_published: u64,
    pub points_skipped: u64,
}

/// One pass over every enabled data source. Adapter or per-source read
/// failures are logged and skip that source; they never abort the pass
/// for the remaining sources.
pub async fn poll_once(
    registry: &SourceRegistry,
    metadata: &dyn MetadataStore,
    cache: &dyn FastCache,
    queue: &dyn QueueProducer,
    cache_key_prefix: &str,
    cache_ttl: Duration,
) -> Result<PollStats> {
    let mut stats = PollStats::default();
    for source in metadata.list_enabled_data_sources().await? {
        stats.sources_polled += 1;
        let Some(adapter) = registry.get(&source.source_type) else {
            tracing::warn!(source_type = %source.source_type, "no adapter registered, skipping source");
            continue;
        };
        let tags = metadata.list_tags_for_source(source.id).await?;
        let enabled_tags: Vec<_> = tags.into_iter().filter(|t| t.enabled).collect();
        if enabled_tags.is_empty() {
            continue;
        }
        let addresses: Vec<String> = enabled_tags.iter().map(|t| t.address.clone()).collect();
        let raw = match adapter.read_current(&addresses).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(source = %source.name, error = %e, "read_current failed, skipping source");
                continue;
            }
        };
        let by_address: HashMap<&str, &flywheel_core::model::Tag> =
            enabled_tags.iter().map(|t| (t.address.as_str(), t)).collect();

        let mut points = Vec::with_capacity(raw.len());
        for sample in &raw {
            let Some(tag) = by_address.get(sample.address.as_str()) else {
                continue;
            };
            let Some(value) = coerce_finite_f64(&sample.value) else {
                stats.points_skipped += 1;
                tracing::debug!(address = %sample.address, "skipping non-numeric/non-finite sample");
                continue;
            };
            match DataPoint::new(tag.sequence_id, sample.timestamp, value, Quality::Good, Some(sample.address.clone())) {
                Ok(point) => points.push(point),
                Err(e) => {
                    stats.points_skipped += 1;
                    tracing::debug!(address = %sample.address, error = %e, "skipping malformed sample");
                }
            }
        }
        if points.is_empty() {
            continue;
        }

        let mut batch = Batch::new(points);
        batch.disambiguate_collisions();
        let payload = serde_json::to_vec(&batch).map_err(flywheel_core::Error::from)?;
        queue
            .publish(topics::TELEMETRY_LIVE, Some(&source.id.to_string()), &payload)
            .await?;

        for point in &batch.points {
            let key = format!("{cache_key_prefix}:last:{}", point.sequence_id);
            let value = serde_json::to_string(point).map_err(flywheel_core::Error::from)?;
            cache.set_with_ttl(&key, value, cache_ttl).await?;
        }
        stats.points_published += batch.points.len() as u64;
    }
    Ok(stats)
}

/// Drains one message from the telemetry topic and writes its points
/// into the time-series store, committing the offset only after the
/// write succeeds, giving at-least-once delivery into the store. A
/// deserialization failure is treated as a skip, not a fatal error —
/// the offset still advances.
pub async fn consume_telemetry(
    consumer: &mut dyn QueueConsumer,
    store: &dyn TimeSeriesStore,
) -> Result<Option<usize>> {
    let Some(message) = consumer.poll().await? else {
        return Ok(None);
    };
    let batch: Batch = match serde_json::from_slice(&message.payload) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(error = %e, "skipping undeserializable telemetry message");
            consumer.commit(&message).await?;
            return Ok(Some(0));
        }
    };
    store.append(&batch.points).await?;
    consumer.commit(&message).await?;
    Ok(Some(batch.points.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use flywheel_cache::MemoryCache;
    use flywheel_core::model::{ConnectionStatus, DataSource, Tag, ValueType};
    use flywheel_queue::InMemoryQueue;
    use flywheel_store::InMemoryMetadataStore;
    use flywheel_timeseries::InMemoryTimeSeriesStore;

    use crate::SimulatedAdapter;

    #[tokio::test]
    async fn poll_once_publishes_and_caches_points_for_enabled_sources() {
        let metadata = InMemoryMetadataStore::new();
        let cache = MemoryCache::new();
        let queue = InMemoryQueue::new(16);
        let mut registry = SourceRegistry::new();
        registry.register(SimulatedAdapter::new("simulated"));

        let source_id = uuid::Uuid::new_v4();
        metadata
            .upsert_data_source(DataSource {
                id: source_id,
                name: "pump-skid".into(),
                source_type: "simulated".into(),
                status: ConnectionStatus::Connected,
                enabled: true,
                poll_interval_ms: Some(5000),
                last_seen_at: None,
            })
            .await
            .unwrap();
        metadata
            .upsert_tag(Tag {
                id: uuid::Uuid::new_v4(),
                sequence_id: 1,
                name: "PMP-101.DIS.PRESS".into(),
                source_id,
                address: "PMP-101.DIS.PRESS".into(),
                description: String::new(),
                unit: "psi".into(),
                value_type: ValueType::ScalarDouble,
                enabled: true,
                typical_update_interval_secs: Some(5.0),
            })
            .await
            .unwrap();

        let mut consumer = queue.consumer(topics::TELEMETRY_LIVE).await;
        let stats = poll_once(&registry, &metadata, &cache, &queue, "flywheel", Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(stats.sources_polled, 1);
        assert_eq!(stats.points_published, 1);

        let cached = cache.get("flywheel:last:1").await.unwrap();
        assert!(cached.is_some());

        let message = consumer.poll().await.unwrap().unwrap();
        let batch: Batch = serde_json::from_slice(&message.payload).unwrap();
        assert_eq!(batch.points.len(), 1);
    }

    #[tokio::test]
    async fn consume_telemetry_writes_points_into_time_series_store() {
        let queue = InMemoryQueue::new(16);
        let mut consumer = queue.consumer(topics::TELEMETRY_LIVE).await;
        let store = InMemoryTimeSeriesStore::new();

        let point = DataPoint::new(1, Utc::now(), 42.0, Quality::Good, None).unwrap();
        let batch = Batch::new(vec![point]);
        let payload = serde_json::to_vec(&batch).unwrap();
        queue.publish(topics::TELEMETRY_LIVE, None, &payload).await.unwrap();

        let written = consume_telemetry(&mut consumer, &store).await.unwrap();
        assert_eq!(written, Some(1));
    }
}
