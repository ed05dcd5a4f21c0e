//! Flat configuration bag merged from a TOML file and `FLYWHEEL_*`
//! environment overrides.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub poll_interval_ms: u64,
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            batch_size: 10_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BehavioralConfig {
    pub min_samples: u64,
    pub window_hours: i64,
    pub cache_ttl_hours: i64,
}

impl Default for BehavioralConfig {
    fn default() -> Self {
        Self {
            min_samples: 50,
            window_hours: 24,
            cache_ttl_hours: 48,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    pub min_r: f64,
    pub window_hours: i64,
    pub min_samples: u64,
    pub cache_ttl_hours: i64,
    pub change_suppression_threshold: f64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            min_r: 0.60,
            window_hours: 168,
            min_samples: 100,
            cache_ttl_hours: 24,
            change_suppression_threshold: 0.10,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub min_size: usize,
    pub max_size: usize,
    pub min_cohesion: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            min_size: 3,
            max_size: 50,
            min_cohesion: 0.50,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchWeightsConfig {
    pub naming: f64,
    pub correlation: f64,
    pub range: f64,
    pub rate: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub min_confidence: f64,
    pub min_confidence_proactive: f64,
    pub max_per_cluster: usize,
    pub weights_behavioral: MatchWeightsConfig,
    pub weights_proactive: MatchWeightsConfig,
    pub knowledge_boost: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.50,
            min_confidence_proactive: 0.40,
            max_per_cluster: 5,
            weights_behavioral: MatchWeightsConfig {
                naming: 0.30,
                correlation: 0.40,
                range: 0.20,
                rate: 0.10,
            },
            weights_proactive: MatchWeightsConfig {
                naming: 0.50,
                correlation: 0.0,
                range: 0.25,
                rate: 0.15,
            },
            knowledge_boost: 0.10,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub boost: f64,
    pub penalty: f64,
    pub decay_per_day: f64,
    pub floor: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            boost: 0.05,
            penalty: 0.03,
            decay_per_day: 0.005,
            floor: 0.30,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Retention for correlation cache entries (TTL-enforced, not swept
    /// directly) and the feedback log.
    pub retention_days: i64,
    /// Shorter retention for expired suggestions, inactive clusters with
    /// no referencing suggestion, and behavioral fingerprints.
    pub short_retention_days: i64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            retention_days: 90,
            short_retention_days: 7,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    pub metadata_store_url: Option<String>,
    pub timeseries_store_url: Option<String>,
    pub cache_url: Option<String>,
    pub queue_brokers: Option<String>,
    pub cache_key_prefix: String,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            metadata_store_url: None,
            timeseries_store_url: None,
            cache_url: None,
            queue_brokers: None,
            cache_key_prefix: "flywheel".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub behavioral: BehavioralConfig,
    pub correlation: CorrelationConfig,
    pub cluster: ClusterConfig,
    pub matching: MatchingConfig,
    pub learning: LearningConfig,
    pub maintenance: MaintenanceConfig,
    pub backends: BackendsConfig,
}

impl Config {
    /// Loads configuration from an optional TOML file merged with
    /// `FLYWHEEL_`-prefixed environment overrides (e.g.
    /// `FLYWHEEL_CORRELATION__MIN_R=0.65`). A missing file is not an
    /// error; a malformed one is fatal at startup.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("FLYWHEEL")
                .separator("__")
                .try_parsing(true),
        );
        let raw = builder.build().map_err(Error::from)?;
        raw.try_deserialize().map_err(Error::from)
    }
}
