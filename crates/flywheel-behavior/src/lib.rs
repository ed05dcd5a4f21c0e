//! Behavioral aggregator: turns raw history into a windowed statistical
//! fingerprint per tag, on a cadence.

use chrono::{DateTime, Duration, Utc};

use flywheel_cache::FastCache;
use flywheel_core::model::Fingerprint;
use flywheel_core::Result;
use flywheel_store::MetadataStore;
use flywheel_timeseries::TimeSeriesStore;

#[derive(Debug, Default, Clone, Copy)]
pub struct BehaviorStats {
    pub tags_considered: u64,
    pub fingerprints_computed: u64,
    pub tags_below_sample_floor: u64,
}

/// Computes sample count, mean, sample standard deviation, min, max, and
/// update rate for a window of values. `None` if `values` is empty.
pub fn fingerprint_from_samples(
    sequence_id: i64,
    values: &[f64],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<Fingerprint> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = if values.len() > 1 {
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
    } else {
        0.0
    };
    let stddev = variance.sqrt();
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let window_seconds = (window_end - window_start).num_milliseconds() as f64 / 1000.0;
    let update_rate = if window_seconds > 0.0 { n / window_seconds } else { 0.0 };
    Some(Fingerprint {
        sequence_id,
        sample_count: values.len() as u64,
        mean,
        stddev,
        min,
        max,
        update_rate,
        window_start,
        window_end,
        computed_at: now,
    })
}

/// One pass over every enabled tag. Tags below `min_samples` yield
/// no fingerprint for this pass; any fingerprint they already had is left
/// untouched (readers apply staleness, this job never deletes).
pub async fn run_once(
    metadata: &dyn MetadataStore,
    timeseries: &dyn TimeSeriesStore,
    cache: &dyn FastCache,
    min_samples: u64,
    window_hours: i64,
    cache_ttl: Duration,
    cache_key_prefix: &str,
    now: DateTime<Utc>,
) -> Result<BehaviorStats> {
    let mut stats = BehaviorStats::default();
    let window_start = now - Duration::hours(window_hours);
    for tag in metadata.list_enabled_tags().await? {
        stats.tags_considered += 1;
        let points = timeseries.range(tag.sequence_id, window_start, now).await?;
        if (points.len() as u64) < min_samples {
            stats.tags_below_sample_floor += 1;
            continue;
        }
        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        let Some(fingerprint) = fingerprint_from_samples(tag.sequence_id, &values, window_start, now, now) else {
            continue;
        };
        metadata.upsert_fingerprint(fingerprint.clone()).await?;
        let key = format!("{cache_key_prefix}:fingerprint:{}", tag.sequence_id);
        let payload = serde_json::to_string(&fingerprint).map_err(flywheel_core::Error::from)?;
        cache.set_with_ttl(&key, payload, cache_ttl).await?;
        stats.fingerprints_computed += 1;
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flywheel_cache::MemoryCache;
    use flywheel_core::model::{ConnectionStatus, DataSource, Quality, Tag as CoreTag, ValueType};
    use flywheel_store::InMemoryMetadataStore;
    use flywheel_timeseries::InMemoryTimeSeriesStore;

    #[test]
    fn fingerprint_matches_known_sample_statistics() {
        let window_start = Utc::now() - Duration::hours(24);
        let window_end = Utc::now();
        let fp = fingerprint_from_samples(1, &[1.0, 2.0, 3.0, 4.0, 5.0], window_start, window_end, window_end).unwrap();
        assert_eq!(fp.sample_count, 5);
        assert!((fp.mean - 3.0).abs() < 1e-9);
        assert!((fp.stddev - 1.5811388300841898).abs() < 1e-9);
        assert_eq!(fp.min, 1.0);
        assert_eq!(fp.max, 5.0);
        assert!(fp.is_well_formed());
    }

    #[test]
    fn empty_window_yields_no_fingerprint() {
        let now = Utc::now();
        assert!(fingerprint_from_samples(1, &[], now - Duration::hours(24), now, now).is_none());
    }

    #[tokio::test]
    async fn run_once_skips_tags_below_sample_floor() {
        let metadata = InMemoryMetadataStore::new();
        let timeseries = InMemoryTimeSeriesStore::new();
        let cache = MemoryCache::new();

        let source_id = uuid::Uuid::new_v4();
        metadata
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
        metadata
            .upsert_tag(CoreTag {
                id: uuid::Uuid::new_v4(),
                sequence_id: 1,
                name: "t".into(),
                source_id,
                address: "t".into(),
                description: String::new(),
                unit: "psi".into(),
                value_type: ValueType::ScalarDouble,
                enabled: true,
                typical_update_interval_secs: None,
            })
            .await
            .unwrap();

        let now = Utc::now();
        let point = flywheel_core::model::DataPoint::new(1, now, 1.0, Quality::Good, None).unwrap();
        timeseries.append(&[point]).await.unwrap();

        let stats = run_once(&metadata, &timeseries, &cache, 50, 24, Duration::hours(48), "flywheel", now)
            .await
            .unwrap();
        assert_eq!(stats.tags_below_sample_floor, 1);
        assert_eq!(stats.fingerprints_computed, 0);
        assert!(metadata.get_fingerprint(1).await.unwrap().is_none());
    }
}
