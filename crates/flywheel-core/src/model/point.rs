//! DataPoint and Batch — the atomic units crossing the queue boundary.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Good,
    Uncertain,
    Bad,
    NotAvailable,
    Substituted,
}

/// Immutable telemetry sample. Construct via [`DataPoint::new`], which
/// rejects non-finite values and pre-epoch timestamps.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataPoint {
    pub sequence_id: i64,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub quality: Quality,
    pub source_tag: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl DataPoint {
    pub fn new(
        sequence_id: i64,
        timestamp: DateTime<Utc>,
        value: f64,
        quality: Quality,
        source_tag: Option<String>,
    ) -> Result<Self> {
        if !value.is_finite() {
            return Err(Error::malformed(sequence_id, format!("non-finite value {value}")));
        }
        if timestamp < DateTime::UNIX_EPOCH {
            return Err(Error::malformed(
                sequence_id,
                format!("timestamp {timestamp} precedes 1970-01-01 UTC"),
            ));
        }
        Ok(Self {
            sequence_id,
            timestamp,
            value,
            quality,
            source_tag,
            received_at: Utc::now(),
        })
    }
}

/// Ordered group of [`DataPoint`]s crossing the queue boundary atomically.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: uuid::Uuid,
    pub created_at: DateTime<Utc>,
    pub points: Vec<DataPoint>,
}

impl Batch {
    pub fn new(points: Vec<DataPoint>) -> Self {
        Self {
            batch_id: uuid::Uuid::new_v4(),
            created_at: Utc::now(),
            points,
        }
    }

    /// Disambiguates same-tag timestamp collisions within the batch by
    /// adding a deterministic microsecond offset per row: offset = row
    /// index among points sharing `(sequence_id, timestamp)` × 1µs.
    /// Idempotent: re-running on an already-disambiguated batch with
    /// distinct timestamps is a no-op.
    pub fn disambiguate_collisions(&mut self) {
        use std::collections::HashMap;
        let mut seen: HashMap<(i64, DateTime<Utc>), i64> = HashMap::new();
        for point in &mut self.points {
            let key = (point.sequence_id, point.timestamp);
            let offset = seen.entry(key).or_insert(0);
            if *offset > 0 {
                point.timestamp += chrono::Duration::microseconds(*offset);
            }
            *offset += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::seconds(secs)
    }

    #[test]
    fn rejects_non_finite_value() {
        assert!(DataPoint::new(1, ts(0), f64::NAN, Quality::Good, None).is_err());
        assert!(DataPoint::new(1, ts(0), f64::INFINITY, Quality::Good, None).is_err());
    }

    #[test]
    fn rejects_pre_epoch_timestamp() {
        let before = DateTime::<Utc>::UNIX_EPOCH - chrono::Duration::seconds(1);
        assert!(DataPoint::new(1, before, 1.0, Quality::Good, None).is_err());
    }

    #[test]
    fn accepts_epoch_exactly() {
        assert!(DataPoint::new(1, DateTime::<Utc>::UNIX_EPOCH, 1.0, Quality::Good, None).is_ok());
    }

    #[test]
    fn disambiguates_same_tag_collisions_deterministically() {
        let mut batch = Batch::new(vec![
            DataPoint::new(1, ts(100), 1.0, Quality::Good, None).unwrap(),
            DataPoint::new(1, ts(100), 2.0, Quality::Good, None).unwrap(),
            DataPoint::new(1, ts(100), 3.0, Quality::Good, None).unwrap(),
            DataPoint::new(2, ts(100), 9.0, Quality::Good, None).unwrap(),
        ]);
        batch.disambiguate_collisions();
        assert_eq!(batch.points[0].timestamp, ts(100));
        assert_eq!(batch.points[1].timestamp, ts(100) + chrono::Duration::microseconds(1));
        assert_eq!(batch.points[2].timestamp, ts(100) + chrono::Duration::microseconds(2));
        // different tag, same timestamp: untouched
        assert_eq!(batch.points[3].timestamp, ts(100));
    }

    #[test]
    fn round_trip_preserves_order_and_quality() {
        let batch = Batch::new(vec![
            DataPoint::new(1, ts(0), 1.0, Quality::Good, None).unwrap(),
            DataPoint::new(1, ts(1), 2.0, Quality::Uncertain, Some("raw".into())).unwrap(),
        ]);
        let json = serde_json::to_string(&batch).unwrap();
        let back: Batch = serde_json::from_str(&json).unwrap();
        assert_eq!(back.points.len(), batch.points.len());
        for (a, b) in batch.points.iter().zip(back.points.iter()) {
            assert_eq!(a.sequence_id, b.sequence_id);
            assert_eq!(a.timestamp, b.timestamp);
            assert_eq!(a.value, b.value);
            assert_eq!(a.quality, b.quality);
        }
    }
}
