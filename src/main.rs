//! Pattern Flywheel operator CLI: runs the scheduled analytical pipeline
//! as a daemon, or drives one-off operator actions against the same
//! backends (backfill, status, manual match, suggestion review).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use prometheus::{IntCounter, Registry};
use tracing::{error, info, warn};

use flywheel_cache::{FastCache, MemoryCache, RedisCache};
use flywheel_core::config::Config;
use flywheel_core::Error;
use flywheel_ingest::{SimulatedAdapter, SourceRegistry};
use flywheel_queue::{topics, InMemoryQueue, KafkaQueue, QueueProducer};
use flywheel_scheduler::{Job, Scheduler};
use flywheel_store::{InMemoryMetadataStore, MetadataStore, PostgresMetadataStore};
use flywheel_timeseries::{InMemoryTimeSeriesStore, TimeSeriesStore, TimescaleStore};

#[derive(Parser)]
#[command(name = "flywheel", about = "Industrial telemetry pattern flywheel")]
struct Cli {
    /// Path to a TOML config file. Overridden by FLYWHEEL_* env vars.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon: scheduler plus the /health and /metrics HTTP surface.
    Run {
        #[arg(long, default_value = "0.0.0.0:9090")]
        bind: SocketAddr,
    },
    /// Submit a backfill request for a source over a time range.
    Backfill {
        source: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        #[arg(long, default_value = "30d")]
        chunk: String,
    },
    /// Print a snapshot of pattern/cluster/suggestion counts.
    Status,
    /// Run the pattern matcher once, outside its normal cadence.
    MatchNow {
        #[arg(long)]
        source: Option<String>,
    },
    /// Approve a pending suggestion.
    Approve {
        suggestion_id: uuid::Uuid,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Reject a pending suggestion.
    Reject {
        suggestion_id: uuid::Uuid,
        #[arg(long)]
        reason: String,
    },
}

/// How to build a telemetry consumer for the backend this process
/// connected to. Kept separate from `queue: Arc<dyn QueueProducer>` since
/// consumer construction isn't part of that trait (publishers and
/// consumers are independently creatable handles, per `flywheel-queue`).
enum QueueConsumerKind {
    Memory(InMemoryQueue),
    Kafka { brokers: String, group_id: String },
}

/// The set of trait-object backends every command needs, resolved once
/// from config at startup: an unreachable store or queue at startup is
/// fatal and never retried past process entry.
struct Backends {
    metadata: Arc<dyn MetadataStore>,
    timeseries: Arc<dyn TimeSeriesStore>,
    cache: Arc<dyn FastCache>,
    queue: Arc<dyn QueueProducer>,
    queue_consumer_kind: QueueConsumerKind,
}

async fn connect_backends(config: &Config) -> Result<Backends, Error> {
    let metadata: Arc<dyn MetadataStore> = match &config.backends.metadata_store_url {
        Some(url) => Arc::new(PostgresMetadataStore::connect(url).await?),
        None => Arc::new(InMemoryMetadataStore::new()),
    };
    let timeseries: Arc<dyn TimeSeriesStore> = match &config.backends.timeseries_store_url {
        Some(url) => Arc::new(TimescaleStore::connect(url).await?),
        None => Arc::new(InMemoryTimeSeriesStore::new()),
    };
    let cache: Arc<dyn FastCache> = match &config.backends.cache_url {
        Some(url) => Arc::new(RedisCache::connect(url).await?),
        None => Arc::new(MemoryCache::new()),
    };
    let (queue, queue_consumer_kind): (Arc<dyn QueueProducer>, QueueConsumerKind) = match &config.backends.queue_brokers {
        Some(brokers) => (
            Arc::new(KafkaQueue::new(brokers)?),
            QueueConsumerKind::Kafka { brokers: brokers.clone(), group_id: "flywheel".to_string() },
        ),
        None => {
            let memory = InMemoryQueue::new(1024);
            (Arc::new(memory.clone()), QueueConsumerKind::Memory(memory))
        }
    };

    flywheel_matcher::ensure_seeded(metadata.as_ref()).await?;

    Ok(Backends { metadata, timeseries, cache, queue, queue_consumer_kind })
}

fn demo_registry() -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    registry.register(SimulatedAdapter::new("simulated"));
    registry
}

/// Named counters surfaced on `/metrics`. Shared across every subcommand
/// so one-shot operator actions (approve,
/// reject, match-now) account into the same counters the daemon exposes
/// — only `run` actually serves them over HTTP.
struct Metrics {
    registry: Registry,
    batches_published: IntCounter,
    datapoints_rejected: IntCounter,
    pairs_evaluated: IntCounter,
    edges_retained: IntCounter,
    clusters_detected: IntCounter,
    suggestions_created: IntCounter,
    feedback_applied: IntCounter,
    job_failures: IntCounter,
}

impl Metrics {
    fn new() -> Self {
        let registry = Registry::new();
        let counter = |name: &str, help: &str| {
            let c = IntCounter::new(name, help).expect("valid metric name");
            registry.register(Box::new(c.clone())).expect("metric registered once");
            c
        };
        Self {
            batches_published: counter("flywheel_batches_published_total", "telemetry batches published"),
            datapoints_rejected: counter("flywheel_datapoints_rejected_total", "malformed datapoints rejected"),
            pairs_evaluated: counter("flywheel_pairs_evaluated_total", "tag pairs evaluated for correlation"),
            edges_retained: counter("flywheel_edges_retained_total", "correlation edges retained"),
            clusters_detected: counter("flywheel_clusters_detected_total", "clusters detected"),
            suggestions_created: counter("flywheel_suggestions_created_total", "suggestions created"),
            feedback_applied: counter("flywheel_feedback_applied_total", "approve/reject/defer decisions applied"),
            job_failures: counter("flywheel_job_failures_total", "scheduled job runs that returned an error"),
            registry,
        }
    }
}

#[tokio::main]
async fn main() {
    let code = run().await;
    std::process::exit(code);
}

async fn run() -> i32 {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "flywheel=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "configuration parse failure, cannot start");
            return 3;
        }
    };

    let backends = match connect_backends(&config).await {
        Ok(b) => b,
        Err(e) => {
            error!(error = %e, "could not reach required backends at startup");
            return 3;
        }
    };

    let metrics = Arc::new(Metrics::new());

    match cli.command {
        Commands::Run { bind } => cmd_run(config, backends, metrics, bind).await,
        Commands::Backfill { source, start, end, chunk } => {
            cmd_backfill(backends, source, start, end, chunk).await
        }
        Commands::Status => cmd_status(backends).await,
        Commands::MatchNow { source } => cmd_match_now(config, backends, metrics, source).await,
        Commands::Approve { suggestion_id, reason } => {
            cmd_approve(config, backends, metrics, suggestion_id, reason).await
        }
        Commands::Reject { suggestion_id, reason } => {
            cmd_reject(config, backends, metrics, suggestion_id, reason).await
        }
    }
}

struct ApiState {
    started_at: std::time::Instant,
    metrics: Arc<Metrics>,
}

async fn health_handler(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

async fn metrics_handler(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    use prometheus::{Encoder, TextEncoder};
    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).ok();
    (
        [(axum::http::header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
}

struct IngestJob {
    registry: Arc<SourceRegistry>,
    metadata: Arc<dyn MetadataStore>,
    cache: Arc<dyn FastCache>,
    queue: Arc<dyn QueueProducer>,
    config: Config,
    metrics: Arc<Metrics>,
}

#[async_trait::async_trait]
impl Job for IngestJob {
    fn name(&self) -> &str {
        "ingestion_poller"
    }

    async fn run_once(&self) -> flywheel_core::Result<()> {
        let stats = flywheel_ingest::poll_once(
            self.registry.as_ref(),
            self.metadata.as_ref(),
            self.cache.as_ref(),
            self.queue.as_ref(),
            &self.config.backends.cache_key_prefix,
            chrono::Duration::hours(self.config.behavioral.cache_ttl_hours),
        )
        .await?;
        self.metrics.batches_published.inc_by(stats.sources_polled);
        self.metrics.datapoints_rejected.inc_by(stats.points_skipped);
        info!(?stats, "ingestion poll pass complete");
        Ok(())
    }
}

struct BehaviorJob {
    metadata: Arc<dyn MetadataStore>,
    timeseries: Arc<dyn TimeSeriesStore>,
    cache: Arc<dyn FastCache>,
    config: Config,
}

#[async_trait::async_trait]
impl Job for BehaviorJob {
    fn name(&self) -> &str {
        "behavioral_aggregator"
    }

    async fn run_once(&self) -> flywheel_core::Result<()> {
        let stats = flywheel_behavior::run_once(
            self.metadata.as_ref(),
            self.timeseries.as_ref(),
            self.cache.as_ref(),
            self.config.behavioral.min_samples,
            self.config.behavioral.window_hours,
            chrono::Duration::hours(self.config.behavioral.cache_ttl_hours),
            &self.config.backends.cache_key_prefix,
            Utc::now(),
        )
        .await?;
        info!(?stats, "behavioral aggregation pass complete");
        Ok(())
    }
}

struct CorrelationJob {
    metadata: Arc<dyn MetadataStore>,
    timeseries: Arc<dyn TimeSeriesStore>,
    cache: Arc<dyn FastCache>,
    queue: Arc<dyn QueueProducer>,
    config: Config,
    metrics: Arc<Metrics>,
}

#[async_trait::async_trait]
impl Job for CorrelationJob {
    fn name(&self) -> &str {
        "correlation_engine"
    }

    async fn run_once(&self) -> flywheel_core::Result<()> {
        let stats = flywheel_correlation::run_once(
            self.metadata.as_ref(),
            self.timeseries.as_ref(),
            self.cache.as_ref(),
            Some(self.queue.as_ref()),
            &self.config.correlation,
            &self.config.backends.cache_key_prefix,
            Utc::now(),
        )
        .await?;
        self.metrics.pairs_evaluated.inc_by(stats.pairs_considered);
        self.metrics.edges_retained.inc_by(stats.edges_stored);
        info!(?stats, "correlation pass complete");
        Ok(())
    }
}

struct ClusterJob {
    metadata: Arc<dyn MetadataStore>,
    cache: Arc<dyn FastCache>,
    config: Config,
    metrics: Arc<Metrics>,
}

#[async_trait::async_trait]
impl Job for ClusterJob {
    fn name(&self) -> &str {
        "cluster_detector"
    }

    async fn run_once(&self) -> flywheel_core::Result<()> {
        let stats = flywheel_cluster::run_once(
            self.metadata.as_ref(),
            self.cache.as_ref(),
            &self.config.cluster,
            &self.config.backends.cache_key_prefix,
            Utc::now(),
        )
        .await?;
        self.metrics.clusters_detected.inc_by(stats.clusters_kept as u64);
        info!(?stats, "cluster detection pass complete");
        Ok(())
    }
}

struct MatcherJob {
    metadata: Arc<dyn MetadataStore>,
    config: Config,
    metrics: Arc<Metrics>,
}

#[async_trait::async_trait]
impl Job for MatcherJob {
    fn name(&self) -> &str {
        "pattern_matcher"
    }

    async fn run_once(&self) -> flywheel_core::Result<()> {
        let behavioral = flywheel_matcher::run_behavioral(self.metadata.as_ref(), &self.config.matching, Utc::now()).await?;
        let candidates = flywheel_matcher::unanalyzed_candidate_tags(self.metadata.as_ref()).await?;
        let proactive = flywheel_matcher::run_proactive(self.metadata.as_ref(), candidates, &self.config.matching, Utc::now()).await?;
        self.metrics
            .suggestions_created
            .inc_by(behavioral.suggestions_created + proactive.suggestions_created);
        info!(?behavioral, ?proactive, "pattern matcher pass complete");
        Ok(())
    }
}

struct MaintenanceJob {
    metadata: Arc<dyn MetadataStore>,
    config: Config,
}

#[async_trait::async_trait]
impl Job for MaintenanceJob {
    fn name(&self) -> &str {
        "learning_maintenance"
    }

    async fn run_once(&self) -> flywheel_core::Result<()> {
        let now = Utc::now();
        let decayed = flywheel_learning::decay_confidence(self.metadata.as_ref(), &self.config.learning, now).await?;
        let expired = flywheel_learning::expire_suggestions(self.metadata.as_ref(), now).await?;
        let swept = flywheel_learning::run_daily_maintenance(self.metadata.as_ref(), &self.config.maintenance, now).await?;
        info!(decayed, expired, ?swept, "learning and maintenance pass complete");
        Ok(())
    }
}

/// Wraps a [`Job`] so a failed `run_once` bumps `job_failures` before the
/// error reaches the scheduler's own warn-and-skip handling.
struct CountingJob {
    inner: Arc<dyn Job>,
    metrics: Arc<Metrics>,
}

#[async_trait::async_trait]
impl Job for CountingJob {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn run_once(&self) -> flywheel_core::Result<()> {
        let result = self.inner.run_once().await;
        if result.is_err() {
            self.metrics.job_failures.inc();
        }
        result
    }
}

async fn cmd_run(config: Config, backends: Backends, metrics: Arc<Metrics>, bind: SocketAddr) -> i32 {
    let registry = Arc::new(demo_registry());

    let mut scheduler = Scheduler::new();

    fn register(scheduler: &mut Scheduler, metrics: &Arc<Metrics>, job: Arc<dyn Job>, interval: StdDuration, reentrancy_timeout: StdDuration) {
        scheduler.register(
            Arc::new(CountingJob { inner: job, metrics: metrics.clone() }),
            interval,
            reentrancy_timeout,
        );
    }

    register(
        &mut scheduler,
        &metrics,
        Arc::new(IngestJob {
            registry: registry.clone(),
            metadata: backends.metadata.clone(),
            cache: backends.cache.clone(),
            queue: backends.queue.clone(),
            config: config.clone(),
            metrics: metrics.clone(),
        }),
        StdDuration::from_millis(config.pipeline.poll_interval_ms),
        StdDuration::from_secs(10),
    );
    register(
        &mut scheduler,
        &metrics,
        Arc::new(BehaviorJob {
            metadata: backends.metadata.clone(),
            timeseries: backends.timeseries.clone(),
            cache: backends.cache.clone(),
            config: config.clone(),
        }),
        StdDuration::from_secs(config.behavioral.window_hours.max(1) as u64 * 60),
        StdDuration::from_secs(30),
    );
    register(
        &mut scheduler,
        &metrics,
        Arc::new(CorrelationJob {
            metadata: backends.metadata.clone(),
            timeseries: backends.timeseries.clone(),
            cache: backends.cache.clone(),
            queue: backends.queue.clone(),
            config: config.clone(),
            metrics: metrics.clone(),
        }),
        StdDuration::from_secs(3600),
        StdDuration::from_secs(60),
    );
    register(
        &mut scheduler,
        &metrics,
        Arc::new(ClusterJob {
            metadata: backends.metadata.clone(),
            cache: backends.cache.clone(),
            config: config.clone(),
            metrics: metrics.clone(),
        }),
        StdDuration::from_secs(3600),
        StdDuration::from_secs(60),
    );
    register(
        &mut scheduler,
        &metrics,
        Arc::new(MatcherJob {
            metadata: backends.metadata.clone(),
            config: config.clone(),
            metrics: metrics.clone(),
        }),
        StdDuration::from_secs(900),
        StdDuration::from_secs(60),
    );
    register(
        &mut scheduler,
        &metrics,
        Arc::new(MaintenanceJob {
            metadata: backends.metadata.clone(),
            config: config.clone(),
        }),
        StdDuration::from_secs(86_400),
        StdDuration::from_secs(120),
    );

    // Telemetry consumer: a long-lived task draining the live-telemetry
    // topic into the time-series store, independent of the cadenced
    // analytical jobs above. Commits to the store at-least-once, same as
    // the cluster detector's cached-edge consumption.
    let consumer_timeseries = backends.timeseries.clone();
    let consumer_handle = match backends.queue_consumer_kind {
        QueueConsumerKind::Memory(memory_queue) => Some(tokio::spawn(async move {
            let mut consumer = memory_queue.consumer(topics::TELEMETRY_LIVE).await;
            loop {
                match flywheel_ingest::consume_telemetry(&mut consumer, consumer_timeseries.as_ref()).await {
                    Ok(Some(_)) => {}
                    Ok(None) => tokio::time::sleep(StdDuration::from_millis(500)).await,
                    Err(e) => warn!(error = %e, "telemetry consumer iteration failed"),
                }
            }
        })),
        QueueConsumerKind::Kafka { brokers, group_id } => match KafkaQueue::new(&brokers)
            .and_then(|q| q.consumer(&brokers, &group_id, topics::TELEMETRY_LIVE))
        {
            Ok(mut consumer) => Some(tokio::spawn(async move {
                loop {
                    match flywheel_ingest::consume_telemetry(&mut consumer, consumer_timeseries.as_ref()).await {
                        Ok(Some(_)) => {}
                        Ok(None) => tokio::time::sleep(StdDuration::from_millis(500)).await,
                        Err(e) => warn!(error = %e, "telemetry consumer iteration failed"),
                    }
                }
            })),
            Err(e) => {
                error!(error = %e, "failed to start telemetry consumer");
                None
            }
        },
    };

    let state = Arc::new(ApiState {
        started_at: std::time::Instant::now(),
        metrics,
    });
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    let listener = match tokio::net::TcpListener::bind(bind).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, "failed to bind operator HTTP surface");
            scheduler.cancel_all();
            scheduler.join_all().await;
            if let Some(h) = &consumer_handle {
                h.abort();
            }
            return 3;
        }
    };
    info!(%bind, "operator surface listening");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                error!(error = %e, "http server exited with error");
            }
        }
        _ = shutdown => {
            info!("shutdown signal received");
        }
    }

    scheduler.cancel_all();
    scheduler.join_all().await;
    if let Some(h) = &consumer_handle {
        h.abort();
    }
    4
}

async fn cmd_backfill(backends: Backends, source: String, start: DateTime<Utc>, end: DateTime<Utc>, chunk: String) -> i32 {
    let chunk_duration = match parse_duration_suffix(&chunk) {
        Some(d) => d,
        None => {
            error!(chunk = %chunk, "could not parse --chunk duration (expected e.g. 30d, 24h)");
            return 2;
        }
    };

    let tags = match backends.metadata.list_enabled_tags().await {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, "failed to list tags for backfill");
            return 3;
        }
    };
    let tag_addresses: Vec<(i64, String)> = tags.into_iter().map(|t| (t.sequence_id, t.address)).collect();

    let request = flywheel_ingest::BackfillRequest {
        source_type: source,
        tag_addresses,
        start_time: start,
        end_time: end,
        chunk_duration,
    };
    let registry = demo_registry();
    let worker = flywheel_ingest::BackfillWorker::new();
    let request_id = uuid::Uuid::new_v4();
    match worker
        .process(request_id, &request, &registry, backends.timeseries.as_ref(), backends.queue.as_ref())
        .await
    {
        Ok(()) => {
            if let Some(stats) = worker.stats.get(&request_id) {
                info!(?request_id, chunks_done = stats.chunks_done, chunks_failed = stats.chunks_failed, points = stats.points_processed, "backfill complete");
            }
            0
        }
        Err(e) => {
            error!(error = %e, "backfill failed");
            3
        }
    }
}

fn parse_duration_suffix(s: &str) -> Option<chrono::Duration> {
    let s = s.trim();
    let (number, unit) = s.split_at(s.len().checked_sub(1)?);
    let n: i64 = number.parse().ok()?;
    match unit {
        "d" => Some(chrono::Duration::days(n)),
        "h" => Some(chrono::Duration::hours(n)),
        "m" => Some(chrono::Duration::minutes(n)),
        _ => None,
    }
}

async fn cmd_status(backends: Backends) -> i32 {
    let patterns = match backends.metadata.list_active_patterns().await {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "status query failed");
            return 3;
        }
    };
    let clusters = match backends.metadata.list_active_clusters().await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "status query failed");
            return 3;
        }
    };
    let pending = match backends.metadata.list_pending_suggestions().await {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "status query failed");
            return 3;
        }
    };

    println!(
        "{}",
        serde_json::json!({
            "active_patterns": patterns.len(),
            "active_clusters": clusters.len(),
            "pending_suggestions": pending.len(),
        })
    );
    0
}

async fn cmd_match_now(config: Config, backends: Backends, metrics: Arc<Metrics>, source: Option<String>) -> i32 {
    if let Some(source) = &source {
        info!(%source, "match-now candidate resolution is not source-filtered; flag is informational only");
    }
    let behavioral = match flywheel_matcher::run_behavioral(backends.metadata.as_ref(), &config.matching, Utc::now()).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "behavioral match-now failed");
            return 3;
        }
    };
    let candidates = match flywheel_matcher::unanalyzed_candidate_tags(backends.metadata.as_ref()).await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "match-now candidate resolution failed");
            return 3;
        }
    };
    let proactive = match flywheel_matcher::run_proactive(backends.metadata.as_ref(), candidates, &config.matching, Utc::now()).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "proactive match-now failed");
            return 3;
        }
    };
    metrics
        .suggestions_created
        .inc_by(behavioral.suggestions_created + proactive.suggestions_created);
    println!(
        "{}",
        serde_json::json!({ "behavioral": format!("{:?}", behavioral), "proactive": format!("{:?}", proactive) })
    );
    0
}

async fn cmd_approve(config: Config, backends: Backends, metrics: Arc<Metrics>, suggestion_id: uuid::Uuid, reason: Option<String>) -> i32 {
    let reviewer = std::env::var("USER").unwrap_or_else(|_| "operator".to_string());
    match flywheel_learning::approve_suggestion(backends.metadata.as_ref(), suggestion_id, reviewer, &config.learning, Utc::now()).await {
        Ok(outcome) => {
            metrics.feedback_applied.inc();
            info!(?outcome, ?reason, "suggestion approved");
            0
        }
        Err(e) => {
            warn!(error = %e, "approve failed");
            3
        }
    }
}

async fn cmd_reject(config: Config, backends: Backends, metrics: Arc<Metrics>, suggestion_id: uuid::Uuid, reason: String) -> i32 {
    let reviewer = std::env::var("USER").unwrap_or_else(|_| "operator".to_string());
    match flywheel_learning::reject_suggestion(backends.metadata.as_ref(), suggestion_id, reviewer, reason, &config.learning, Utc::now()).await {
        Ok(outcome) => {
            metrics.feedback_applied.inc();
            info!(?outcome, "suggestion rejected");
            0
        }
        Err(e) => {
            warn!(error = %e, "reject failed");
            3
        }
    }
}
