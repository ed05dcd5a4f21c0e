//! Backfill request API: a bounded, drop-oldest request queue drained
//! by a single worker that slices each request into contiguous chunks
//! and checkpoints as it goes.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use flywheel_core::model::{Batch, DataPoint, Quality};
use flywheel_core::Result;
use flywheel_queue::{topics, QueueProducer};
use flywheel_timeseries::TimeSeriesStore;

use crate::{coerce_finite_f64, SourceRegistry};

#[derive(Clone, Debug)]
pub struct BackfillRequest {
    pub source_type: String,
    pub tag_addresses: Vec<(i64, String)>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub chunk_duration: Duration,
}

impl BackfillRequest {
    pub const DEFAULT_CHUNK_DURATION: Duration = Duration::days(30);
}

#[derive(Clone, Debug, Default)]
pub struct BackfillStats {
    pub chunks_total: usize,
    pub chunks_done: usize,
    pub chunks_failed: usize,
    pub points_processed: u64,
}

/// Slices `[start, end)` into contiguous chunks of `chunk_duration`. The
/// last chunk is truncated to `end` rather than overshooting it — e.g.
/// 65 days at a 30-day chunk size yields exactly 3 chunks.
pub fn slice_chunks(start: DateTime<Utc>, end: DateTime<Utc>, chunk_duration: Duration) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut chunks = Vec::new();
    let mut cursor = start;
    while cursor < end {
        let chunk_end = (cursor + chunk_duration).min(end);
        chunks.push((cursor, chunk_end));
        cursor = chunk_end;
    }
    chunks
}

/// Bounded request queue with drop-oldest-on-overflow semantics (default
/// capacity 20). `VecDeque` + `Notify` rather than `tokio::sync::mpsc`,
/// since `mpsc` blocks the sender on a full channel instead of evicting.
pub struct BackfillQueue {
    inner: Mutex<VecDeque<BackfillRequest>>,
    notify: tokio::sync::Notify,
    capacity: usize,
}

impl BackfillQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: tokio::sync::Notify::new(),
            capacity,
        }
    }

    pub fn submit(&self, request: BackfillRequest) {
        let mut queue = self.inner.lock().expect("backfill queue lock poisoned");
        if queue.len() >= self.capacity {
            queue.pop_front();
        }
        queue.push_back(request);
        drop(queue);
        self.notify.notify_one();
    }

    pub async fn recv(&self) -> BackfillRequest {
        loop {
            if let Some(request) = self.inner.lock().expect("backfill queue lock poisoned").pop_front() {
                return request;
            }
            self.notify.notified().await;
        }
    }
}

pub struct BackfillWorker {
    pub stats: DashMap<Uuid, BackfillStats>,
}

impl Default for BackfillWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl BackfillWorker {
    pub fn new() -> Self {
        Self {
            stats: DashMap::new(),
        }
    }

    /// Processes one request to completion. A chunk failure is logged and
    /// the next chunk proceeds — the request as a whole never aborts
    /// early.
    pub async fn process(
        &self,
        request_id: Uuid,
        request: &BackfillRequest,
        registry: &SourceRegistry,
        store: &dyn TimeSeriesStore,
        queue: &dyn QueueProducer,
    ) -> Result<()> {
        let chunks = slice_chunks(request.start_time, request.end_time, request.chunk_duration);
        self.stats.insert(
            request_id,
            BackfillStats {
                chunks_total: chunks.len(),
                ..Default::default()
            },
        );

        let Some(adapter) = registry.get(&request.source_type) else {
            tracing::warn!(source_type = %request.source_type, "no adapter registered for backfill request");
            if let Some(mut s) = self.stats.get_mut(&request_id) {
                s.chunks_failed = chunks.len();
            }
            return Ok(());
        };

        let addr_to_seq: HashMap<&str, i64> = request
            .tag_addresses
            .iter()
            .map(|(seq, addr)| (addr.as_str(), *seq))
            .collect();

        for (chunk_start, chunk_end) in chunks {
            match self
                .process_chunk(&*adapter, &addr_to_seq, chunk_start, chunk_end, store, queue)
                .await
            {
                Ok(points) => {
                    if let Some(mut s) = self.stats.get_mut(&request_id) {
                        s.chunks_done += 1;
                        s.points_processed += points as u64;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, ?chunk_start, ?chunk_end, "backfill chunk failed, continuing");
                    if let Some(mut s) = self.stats.get_mut(&request_id) {
                        s.chunks_failed += 1;
                    }
                }
            }
        }
        Ok(())
    }

    async fn process_chunk(
        &self,
        adapter: &dyn crate::SourceAdapter,
        addr_to_seq: &HashMap<&str, i64>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        store: &dyn TimeSeriesStore,
        queue: &dyn QueueProducer,
    ) -> Result<usize> {
        let mut all_points = Vec::new();
        for (&address, &sequence_id) in addr_to_seq {
            let raw = adapter.read_range(address, start, end).await?;
            for sample in raw {
                let Some(value) = coerce_finite_f64(&sample.value) else {
                    continue;
                };
                if let Ok(point) = DataPoint::new(sequence_id, sample.timestamp, value, Quality::Good, Some(address.to_string())) {
                    all_points.push(point);
                }
            }
        }
        if all_points.is_empty() {
            return Ok(0);
        }
        let mut batch = Batch::new(all_points);
        batch.disambiguate_collisions();
        let payload = serde_json::to_vec(&batch).map_err(flywheel_core::Error::from)?;
        queue.publish(topics::TELEMETRY_BACKFILL, None, &payload).await?;
        store.append(&batch.points).await?;
        Ok(batch.points.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(days: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + Duration::days(days)
    }

    #[test]
    fn slices_sixty_five_days_into_three_chunks() {
        let chunks = slice_chunks(t(0), t(65), Duration::days(30));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], (t(0), t(30)));
        assert_eq!(chunks[1], (t(30), t(60)));
        assert_eq!(chunks[2], (t(60), t(65)));
    }

    #[test]
    fn exact_multiple_produces_no_trailing_empty_chunk() {
        let chunks = slice_chunks(t(0), t(60), Duration::days(30));
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn backfill_queue_drops_oldest_on_overflow() {
        let queue = BackfillQueue::new(2);
        let req = |chunk: i64| BackfillRequest {
            source_type: "simulated".into(),
            tag_addresses: vec![],
            start_time: t(0),
            end_time: t(chunk),
            chunk_duration: Duration::days(30),
        };
        queue.submit(req(1));
        queue.submit(req(2));
        queue.submit(req(3));
        let mut remaining = Vec::new();
        while let Some(r) = queue.inner.lock().unwrap().pop_front() {
            remaining.push(r.end_time);
        }
        assert_eq!(remaining, vec![t(2), t(3)]);
    }
}
