//! Cluster — a behaviorally-correlated group of tags.
//!
//! Cluster identity is deterministic so re-detecting the same member set
//! yields the same ID: the MD5 digest of the comma-joined sorted member
//! sequence IDs, packed into a 128-bit value. This is intentional and
//! must never be salted or randomized — it is the idempotency mechanism
//! UPSERT relies on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Deterministic cluster ID from a member set. Order of `members` does not
/// matter — they are sorted before hashing.
pub fn cluster_id(members: &[i64]) -> u128 {
    let mut sorted = members.to_vec();
    sorted.sort_unstable();
    let joined = sorted
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(",");
    let digest = md5::compute(joined.as_bytes());
    u128::from_be_bytes(digest.0)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cluster {
    pub id: u128,
    pub members: Vec<i64>,
    /// Mean edge weight over the induced subgraph.
    pub cohesion: f64,
    pub is_active: bool,
    pub detected_at: DateTime<Utc>,
}

impl Cluster {
    /// Builds a cluster from a member set, computing its deterministic ID.
    /// `members` is stored sorted so two clusters with the same member set
    /// always compare equal field-for-field.
    pub fn new(mut members: Vec<i64>, cohesion: f64) -> Self {
        members.sort_unstable();
        let id = cluster_id(&members);
        Self {
            id,
            members,
            cohesion,
            is_active: true,
            detected_at: Utc::now(),
        }
    }

    pub fn is_well_formed(&self, min_size: usize, max_size: usize, min_cohesion: f64) -> bool {
        (min_size..=max_size).contains(&self.members.len())
            && self.cohesion >= min_cohesion
            && self.id == cluster_id(&self.members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_order_independent_and_deterministic() {
        let a = cluster_id(&[3, 1, 2]);
        let b = cluster_id(&[1, 2, 3]);
        let c = cluster_id(&[2, 3, 1]);
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn different_member_sets_differ() {
        assert_ne!(cluster_id(&[1, 2, 3]), cluster_id(&[1, 2, 4]));
    }

    #[test]
    fn re_detection_on_frozen_members_is_byte_identical() {
        let c1 = Cluster::new(vec![5, 1, 3], 0.7);
        let c2 = Cluster::new(vec![1, 3, 5], 0.7);
        assert_eq!(c1.id, c2.id);
        assert_eq!(c1.members, c2.members);
    }

    #[test]
    fn size_bounds_exact_thresholds() {
        let c3 = Cluster::new((0..3).collect(), 0.5);
        assert!(c3.is_well_formed(3, 50, 0.5));
        let c2 = Cluster::new((0..2).collect(), 0.5);
        assert!(!c2.is_well_formed(3, 50, 0.5));
        let c50 = Cluster::new((0..50).collect(), 0.5);
        assert!(c50.is_well_formed(3, 50, 0.5));
        let c51 = Cluster::new((0..51).collect(), 0.5);
        assert!(!c51.is_well_formed(3, 50, 0.5));
    }
}
