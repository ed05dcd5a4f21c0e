//! Correlation engine: pairwise absolute Pearson coefficient between
//! tags that could plausibly be related, kept well under the n²/2
//! candidate-pair ceiling via cadence/range grouping.

use chrono::{DateTime, Duration, Utc};

use flywheel_cache::FastCache;
use flywheel_core::model::{CorrelationEdge, Fingerprint, TagPair};
use flywheel_core::config::CorrelationConfig;
use flywheel_core::Result;
use flywheel_queue::{topics, QueueProducer};
use flywheel_store::MetadataStore;
use flywheel_timeseries::{asof_join, TimeSeriesStore};

/// Tolerance window for pairing samples of two tags that rarely land on
/// the same instant. Not itself spec-numbered; chosen tight enough that
/// minute-cadence tags still pair while leaving slack for jitter.
const ASOF_TOLERANCE: Duration = Duration::seconds(30);

#[derive(Debug, Default, Clone, Copy)]
pub struct CorrelationStats {
    pub pairs_considered: u64,
    pub pairs_below_sample_floor: u64,
    pub edges_below_r_floor: u64,
    pub edges_stored: u64,
    pub edges_suppressed: u64,
}

/// `(max - min)` bucketed by order of magnitude, so tags whose observed
/// span differs by orders of magnitude never land in the same candidate
/// group even if their update rates happen to match.
fn range_bucket(fp: &Fingerprint) -> i64 {
    let span = (fp.max - fp.min).abs().max(1e-9);
    span.log10().floor() as i64
}

fn within_factor_of_two(a: f64, b: f64) -> bool {
    if a <= 0.0 || b <= 0.0 {
        return a == b;
    }
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    hi / lo <= 2.0
}

/// Greedy anchor grouping: anchors chosen by ascending update rate
/// over tags not yet assigned to a group; a tag joins the anchor's group
/// if its rate is within a factor of two of the anchor's and its value
/// range falls in the same order-of-magnitude bucket.
pub fn group_candidates(fingerprints: &[(i64, Fingerprint)]) -> Vec<Vec<i64>> {
    let mut remaining: Vec<&(i64, Fingerprint)> = fingerprints.iter().collect();
    remaining.sort_by(|a, b| a.1.update_rate.partial_cmp(&b.1.update_rate).unwrap());

    let mut groups = Vec::new();
    while !remaining.is_empty() {
        let anchor = remaining.remove(0);
        let anchor_bucket = range_bucket(&anchor.1);
        let mut group = vec![anchor.0];
        let mut leftover = Vec::with_capacity(remaining.len());
        for candidate in remaining {
            if within_factor_of_two(candidate.1.update_rate, anchor.1.update_rate) && range_bucket(&candidate.1) == anchor_bucket {
                group.push(candidate.0);
            } else {
                leftover.push(candidate);
            }
        }
        remaining = leftover;
        groups.push(group);
    }
    groups
}

/// Pearson correlation coefficient over aligned `(a, b)` sample pairs.
/// `None` if fewer than two pairs or either series has zero variance.
pub fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_a = pairs.iter().map(|(a, _)| a).sum::<f64>() / n;
    let mean_b = pairs.iter().map(|(_, b)| b).sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (a, b) in pairs {
        let da = a - mean_a;
        let db = b - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a <= 0.0 || var_b <= 0.0 {
        return None;
    }
    Some(cov / (var_a * var_b).sqrt())
}

/// Standard normal CDF via the Abramowitz & Stegun 26.2.17 approximation.
fn normal_cdf(x: f64) -> f64 {
    const B1: f64 = 0.319_381_530;
    const B2: f64 = -0.356_563_782;
    const B3: f64 = 1.781_477_937;
    const B4: f64 = -1.821_255_978;
    const B5: f64 = 1.330_274_429;
    const P: f64 = 0.231_641_9;

    let ax = x.abs();
    let t = 1.0 / (1.0 + P * ax);
    let poly = t * (B1 + t * (B2 + t * (B3 + t * (B4 + t * B5))));
    let phi = (-ax * ax / 2.0).exp() / (2.0 * std::f64::consts::PI).sqrt();
    let cdf = 1.0 - phi * poly;
    if x >= 0.0 {
        cdf
    } else {
        1.0 - cdf
    }
}

/// Two-tailed p-value for a Pearson `r` over `n` paired samples via the
/// Fisher z-transform. Informational only — never used to filter edges.
/// `None` if `n <= 3` or `|r| == 1.0` (undefined z).
pub fn p_value(r: f64, n: u64) -> Option<f64> {
    if n <= 3 || r.abs() >= 1.0 {
        return None;
    }
    let z_fisher = 0.5 * ((1.0 + r) / (1.0 - r)).ln();
    let se = 1.0 / ((n as f64 - 3.0).sqrt());
    let z = z_fisher / se;
    Some(2.0 * (1.0 - normal_cdf(z.abs())))
}

/// One pass over all candidate tag pairs. Tags with no current
/// fingerprint are excluded from grouping since rate/range are unknown.
#[allow(clippy::too_many_arguments)]
pub async fn run_once(
    metadata: &dyn MetadataStore,
    timeseries: &dyn TimeSeriesStore,
    cache: &dyn FastCache,
    queue: Option<&dyn QueueProducer>,
    config: &CorrelationConfig,
    cache_key_prefix: &str,
    now: DateTime<Utc>,
) -> Result<CorrelationStats> {
    let mut stats = CorrelationStats::default();
    let mut fingerprints = Vec::new();
    for tag in metadata.list_enabled_tags().await? {
        if let Some(fp) = metadata.get_fingerprint(tag.sequence_id).await? {
            fingerprints.push((tag.sequence_id, fp));
        }
    }

    let window_start = now - Duration::hours(config.window_hours);
    for group in group_candidates(&fingerprints) {
        for i in 0..group.len() {
            for j in (i + 1)..group.len() {
                let pair = TagPair::new(group[i], group[j]);
                stats.pairs_considered += 1;

                let series_a = timeseries.range(pair.lo, window_start, now).await?;
                let series_b = timeseries.range(pair.hi, window_start, now).await?;
                let joined = asof_join(&series_a, &series_b, ASOF_TOLERANCE);
                if (joined.len() as u64) < config.min_samples {
                    stats.pairs_below_sample_floor += 1;
                    continue;
                }
                let Some(r) = pearson(&joined) else {
                    continue;
                };
                let abs_r = r.abs();
                if abs_r < config.min_r {
                    stats.edges_below_r_floor += 1;
                    continue;
                }

                let cache_key = pair.cache_key(cache_key_prefix);
                let previous = cache.get(&cache_key).await?.and_then(|s| s.parse::<f64>().ok());
                let suppress = previous.map(|prev| (prev - abs_r).abs() < config.change_suppression_threshold).unwrap_or(false);

                cache
                    .set_with_ttl(&cache_key, abs_r.to_string(), Duration::hours(config.cache_ttl_hours))
                    .await?;
                stats.edges_stored += 1;

                if suppress {
                    stats.edges_suppressed += 1;
                    continue;
                }

                if let Some(queue) = queue {
                    let edge = CorrelationEdge {
                        pair,
                        abs_r,
                        sample_count: joined.len() as u64,
                        window_start,
                        window_end: now,
                        computed_at: now,
                    };
                    let payload = serde_json::to_vec(&edge).map_err(flywheel_core::Error::from)?;
                    queue.publish(topics::PATTERNS_UPDATED, Some(&cache_key), &payload).await?;
                }
            }
        }
    }
    Ok(stats)
}
