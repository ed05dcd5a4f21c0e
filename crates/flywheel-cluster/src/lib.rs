//! Cluster detector: builds a correlation graph and runs one level of
//! Louvain modularity optimization over it.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;

use flywheel_cache::FastCache;
use flywheel_core::config::ClusterConfig;
use flywheel_core::model::Cluster;
use flywheel_core::Result;
use flywheel_store::MetadataStore;

/// Undirected weighted graph keyed by node (tag sequence ID). No
/// self-loops; weights are symmetric by construction.
#[derive(Debug, Default, Clone)]
pub struct Graph {
    edges: HashMap<i64, HashMap<i64, f64>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, a: i64, b: i64, weight: f64) {
        if a == b {
            return;
        }
        self.edges.entry(a).or_default().insert(b, weight);
        self.edges.entry(b).or_default().insert(a, weight);
    }

    pub fn nodes(&self) -> impl Iterator<Item = &i64> {
        self.edges.keys()
    }

    fn neighbors(&self, node: i64) -> impl Iterator<Item = (&i64, &f64)> {
        self.edges.get(&node).into_iter().flat_map(|m| m.iter())
    }

    /// Sum of incident edge weights (weighted degree).
    fn degree(&self, node: i64) -> f64 {
        self.neighbors(node).map(|(_, w)| *w).sum()
    }

    /// Sum of all edge weights, each edge counted once.
    fn total_weight(&self) -> f64 {
        self.edges.values().flat_map(|m| m.values()).sum::<f64>() / 2.0
    }

    fn mean_internal_weight(&self, members: &[i64]) -> f64 {
        let member_set: std::collections::HashSet<i64> = members.iter().copied().collect();
        let mut total = 0.0;
        let mut count = 0usize;
        for &a in members {
            for (&b, &w) in self.neighbors(a) {
                if member_set.contains(&b) && a < b {
                    total += w;
                    count += 1;
                }
            }
        }
        if count == 0 {
            0.0
        } else {
            total / count as f64
        }
    }
}

/// Builds a graph from cached correlation scalars. Keys look like
/// `{prefix}:corr:{lo}:{hi}` (see [`flywheel_core::model::TagPair::cache_key`]);
/// values parse as `f64` absolute Pearson coefficients.
pub fn graph_from_cache_entries(entries: &[(String, String)]) -> Graph {
    let mut graph = Graph::new();
    for (key, value) in entries {
        let Some(tail) = key.rsplit_once(":corr:").map(|(_, t)| t) else {
            continue;
        };
        let mut parts = tail.split(':');
        let (Some(lo), Some(hi)) = (parts.next(), parts.next()) else {
            continue;
        };
        let (Ok(lo), Ok(hi), Ok(weight)) = (lo.parse::<i64>(), hi.parse::<i64>(), value.parse::<f64>()) else {
            continue;
        };
        graph.add_edge(lo, hi, weight);
    }
    graph
}

/// One level of Louvain modularity optimization: each node starts
/// in its own community; passes visit nodes in random order and move a
/// node to the neighbor community with the best gain if it exceeds
/// `0.001`; stop on a no-move pass or after 100 passes.
pub fn louvain_one_level(graph: &Graph) -> HashMap<i64, u64> {
    let nodes: Vec<i64> = graph.nodes().copied().collect();
    let mut community: HashMap<i64, u64> = nodes.iter().enumerate().map(|(i, &n)| (n, i as u64)).collect();
    let m = graph.total_weight();
    if m <= 0.0 || nodes.is_empty() {
        return community;
    }

    let degree: HashMap<i64, f64> = nodes.iter().map(|&n| (n, graph.degree(n))).collect();
    let mut sigma_tot: HashMap<u64, f64> = HashMap::new();
    for &n in &nodes {
        *sigma_tot.entry(community[&n]).or_insert(0.0) += degree[&n];
    }

    let mut rng = rand::thread_rng();
    let mut order = nodes.clone();

    for _pass in 0..100 {
        order.shuffle(&mut rng);
        let mut moved_any = false;

        for &v in &order {
            let current = community[&v];
            let dv = degree[&v];

            // weight from v into each neighboring community, excluding v itself
            let mut weight_into: HashMap<u64, f64> = HashMap::new();
            for (&w, &weight) in graph.neighbors(v) {
                if w == v {
                    continue;
                }
                *weight_into.entry(community[&w]).or_insert(0.0) += weight;
            }

            let sigma_current_excl_v = sigma_tot.get(&current).copied().unwrap_or(0.0) - dv;
            let weight_into_current = weight_into.get(&current).copied().unwrap_or(0.0);

            let mut best_target = current;
            let mut best_gain = 0.0f64;
            for (&target, &weight_into_target) in &weight_into {
                if target == current {
                    continue;
                }
                let sigma_target = sigma_tot.get(&target).copied().unwrap_or(0.0);
                let gain = (weight_into_target - weight_into_current) / m
                    - dv * (sigma_target - sigma_current_excl_v) / (2.0 * m * m);
                if gain > best_gain {
                    best_gain = gain;
                    best_target = target;
                }
            }

            if best_target != current && best_gain > 0.001 {
                *sigma_tot.entry(current).or_insert(0.0) -= dv;
                *sigma_tot.entry(best_target).or_insert(0.0) += dv;
                community.insert(v, best_target);
                moved_any = true;
            }
        }

        if !moved_any {
            break;
        }
    }

    community
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ClusterStats {
    pub candidate_communities: usize,
    pub clusters_kept: usize,
    pub clusters_deactivated: usize,
}

/// One detection pass: graph from cached edges, one Louvain level,
/// validate against size/cohesion bounds, upsert survivors, deactivate
/// previously-active clusters not redetected and older than 24h.
pub async fn run_once(
    metadata: &dyn MetadataStore,
    cache: &dyn FastCache,
    config: &ClusterConfig,
    cache_key_prefix: &str,
    now: DateTime<Utc>,
) -> Result<ClusterStats> {
    let entries = cache.scan_prefix(&format!("{cache_key_prefix}:corr:")).await?;
    let graph = graph_from_cache_entries(&entries);
    let community = louvain_one_level(&graph);

    let mut by_community: HashMap<u64, Vec<i64>> = HashMap::new();
    for (node, comm) in &community {
        by_community.entry(*comm).or_default().push(*node);
    }

    let mut stats = ClusterStats {
        candidate_communities: by_community.len(),
        ..Default::default()
    };

    let mut detected_ids = Vec::new();
    for mut members in by_community.into_values() {
        members.sort_unstable();
        let cohesion = graph.mean_internal_weight(&members);
        let cluster = Cluster {
            id: flywheel_core::model::cluster_id(&members),
            members,
            cohesion,
            is_active: true,
            detected_at: now,
        };
        if !cluster.is_well_formed(config.min_size, config.max_size, config.min_cohesion) {
            continue;
        }
        detected_ids.push(cluster.id);
        metadata.upsert_cluster(cluster).await?;
        stats.clusters_kept += 1;
    }

    let stale_before = now - Duration::hours(24);
    stats.clusters_deactivated = metadata.deactivate_stale_clusters(&detected_ids, stale_before).await?;

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flywheel_cache::MemoryCache;
    use flywheel_core::model::TagPair;
    use flywheel_store::InMemoryMetadataStore;

    fn two_triangles() -> Graph {
        let mut g = Graph::new();
        // triangle A: 1-2-3, strongly correlated
        g.add_edge(1, 2, 0.9);
        g.add_edge(2, 3, 0.9);
        g.add_edge(1, 3, 0.9);
        // triangle B: 4-5-6
        g.add_edge(4, 5, 0.85);
        g.add_edge(5, 6, 0.85);
        g.add_edge(4, 6, 0.85);
        // weak bridge
        g.add_edge(3, 4, 0.1);
        g
    }

    #[test]
    fn louvain_separates_two_dense_triangles() {
        let graph = two_triangles();
        let community = louvain_one_level(&graph);
        assert_eq!(community[&1], community[&2]);
        assert_eq!(community[&2], community[&3]);
        assert_eq!(community[&4], community[&5]);
        assert_eq!(community[&5], community[&6]);
        assert_ne!(community[&1], community[&4]);
    }

    #[test]
    fn graph_has_no_self_loops() {
        let mut g = Graph::new();
        g.add_edge(1, 1, 0.9);
        assert_eq!(g.nodes().count(), 0);
    }

    #[test]
    fn graph_from_cache_entries_parses_tag_pair_keys() {
        let entries = vec![
            (TagPair::new(1, 2).cache_key("flywheel"), "0.7".to_string()),
            (TagPair::new(2, 3).cache_key("flywheel"), "0.8".to_string()),
            ("flywheel:unrelated:1:2".to_string(), "9.9".to_string()),
        ];
        let graph = graph_from_cache_entries(&entries);
        assert_eq!(graph.nodes().count(), 3);
        assert!((graph.degree(2) - 1.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn run_once_upserts_well_formed_clusters_and_deactivates_stale_ones() {
        let metadata = InMemoryMetadataStore::new();
        let cache = MemoryCache::new();
        let now = Utc::now();

        for (a, b, r) in [(1i64, 2i64, 0.9), (2, 3, 0.9), (1, 3, 0.9)] {
            cache
                .set_with_ttl(&TagPair::new(a, b).cache_key("flywheel"), r.to_string(), Duration::hours(24))
                .await
                .unwrap();
        }

        let stale = Cluster {
            id: flywheel_core::model::cluster_id(&[7, 8, 9]),
            members: vec![7, 8, 9],
            cohesion: 0.8,
            is_active: true,
            detected_at: now - Duration::hours(48),
        };
        metadata.upsert_cluster(stale).await.unwrap();

        let config = ClusterConfig {
            min_size: 3,
            max_size: 50,
            min_cohesion: 0.5,
        };
        let stats = run_once(&metadata, &cache, &config, "flywheel", now).await.unwrap();
        assert_eq!(stats.clusters_kept, 1);
        assert_eq!(stats.clusters_deactivated, 1);

        let active = metadata.list_active_clusters().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].members, vec![1, 2, 3]);
    }
}
