//! Time-series store gateway: the append-only, range-queryable history
//! every downstream analytical job reads from.

mod memory;
mod timescale;

pub use memory::InMemoryTimeSeriesStore;
pub use timescale::TimescaleStore;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use flywheel_core::model::DataPoint;
use flywheel_core::Result;

#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// Appends a batch. Implementations assume collisions were already
    /// resolved by [`flywheel_core::model::Batch::disambiguate_collisions`].
    async fn append(&self, points: &[DataPoint]) -> Result<()>;

    /// Inclusive-start, exclusive-end range read, ordered by timestamp.
    async fn range(&self, sequence_id: i64, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<DataPoint>>;

    /// Most recent sample at or before `now`, if any.
    async fn last(&self, sequence_id: i64, now: DateTime<Utc>) -> Result<Option<DataPoint>>;
}

/// As-of join of two tags' samples over a shared window: for each sample
/// of `a`, the nearest sample of `b` within `tolerance` is paired with
/// it — correlation reads use ASOF-join semantics, not exact timestamp
/// equality, since two tags rarely sample in lockstep.
/// Samples of `a` with no `b` sample inside the tolerance are dropped.
pub fn asof_join(a: &[DataPoint], b: &[DataPoint], tolerance: Duration) -> Vec<(f64, f64)> {
    let mut pairs = Vec::with_capacity(a.len().min(b.len()));
    let mut j = 0usize;
    for pa in a {
        // advance j while b[j] is more than `tolerance` before pa's timestamp
        while j + 1 < b.len() && (pa.timestamp - b[j].timestamp) > tolerance {
            j += 1;
        }
        let mut best: Option<(usize, Duration)> = None;
        for (k, pb) in b.iter().enumerate().skip(j) {
            let delta = pa.timestamp - pb.timestamp;
            if delta > tolerance {
                continue;
            }
            if -delta > tolerance {
                break;
            }
            let abs_delta = if delta < Duration::zero() { -delta } else { delta };
            if best.map(|(_, d)| abs_delta < d).unwrap_or(true) {
                best = Some((k, abs_delta));
            }
        }
        if let Some((k, _)) = best {
            pairs.push((pa.value, b[k].value));
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
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

    #[test]
    fn asof_join_pairs_nearest_sample_within_tolerance() {
        let a = vec![pt(1, 100, 1.0), pt(1, 200, 2.0)];
        let b = vec![pt(2, 101, 10.0), pt(2, 205, 20.0)];
        let pairs = asof_join(&a, &b, Duration::seconds(5));
        assert_eq!(pairs, vec![(1.0, 10.0), (2.0, 20.0)]);
    }

    #[test]
    fn asof_join_drops_unmatched_samples() {
        let a = vec![pt(1, 100, 1.0), pt(1, 500, 2.0)];
        let b = vec![pt(2, 101, 10.0)];
        let pairs = asof_join(&a, &b, Duration::seconds(5));
        assert_eq!(pairs, vec![(1.0, 10.0)]);
    }
}
