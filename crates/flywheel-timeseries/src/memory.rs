//! In-process time-series store: one timestamp-sorted `Vec` per tag
//! behind a `DashMap`, sharded by key for concurrent per-tag access.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use flywheel_core::model::DataPoint;
use flywheel_core::Result;

use crate::TimeSeriesStore;

#[derive(Default)]
pub struct InMemoryTimeSeriesStore {
    series: DashMap<i64, RwLock<Vec<DataPoint>>>,
}

impl InMemoryTimeSeriesStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TimeSeriesStore for InMemoryTimeSeriesStore {
    async fn append(&self, points: &[DataPoint]) -> Result<()> {
        for point in points {
            let mut series = self
                .series
                .entry(point.sequence_id)
                .or_insert_with(|| RwLock::new(Vec::new()))
                .write()
                .expect("time series lock poisoned");
            let idx = series.partition_point(|p| p.timestamp <= point.timestamp);
            series.insert(idx, point.clone());
        }
        Ok(())
    }

    async fn range(&self, sequence_id: i64, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<DataPoint>> {
        Ok(self
            .series
            .get(&sequence_id)
            .map(|s| {
                s.read()
                    .expect("time series lock poisoned")
                    .iter()
                    .filter(|p| p.timestamp >= start && p.timestamp < end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn last(&self, sequence_id: i64, now: DateTime<Utc>) -> Result<Option<DataPoint>> {
        Ok(self.series.get(&sequence_id).and_then(|s| {
            s.read()
                .expect("time series lock poisoned")
                .iter()
                .rev()
                .find(|p| p.timestamp <= now)
                .cloned()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use flywheel_core::model::Quality;

    fn pt(seq: i64, secs: i64, value: f64) -> DataPoint {
        DataPoint::new(
            seq,
            DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(secs),
            value,
            Quality::Good,
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn append_keeps_series_sorted_regardless_of_insertion_order() {
        let store = InMemoryTimeSeriesStore::new();
        store.append(&[pt(1, 300, 3.0), pt(1, 100, 1.0), pt(1, 200, 2.0)]).await.unwrap();
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        let all = store.range(1, epoch, epoch + Duration::seconds(1000)).await.unwrap();
        let values: Vec<f64> = all.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn range_is_half_open() {
        let store = InMemoryTimeSeriesStore::new();
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        store.append(&[pt(1, 100, 1.0), pt(1, 200, 2.0)]).await.unwrap();
        let out = store.range(1, epoch + Duration::seconds(100), epoch + Duration::seconds(200)).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].value, 1.0);
    }

    #[tokio::test]
    async fn last_ignores_future_samples() {
        let store = InMemoryTimeSeriesStore::new();
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        store.append(&[pt(1, 100, 1.0), pt(1, 500, 5.0)]).await.unwrap();
        let last = store.last(1, epoch + Duration::seconds(200)).await.unwrap().unwrap();
        assert_eq!(last.value, 1.0);
    }
}
