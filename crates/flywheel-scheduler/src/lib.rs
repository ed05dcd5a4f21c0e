//! Cadenced job runner: each analytical stage — behavioral aggregation,
//! correlation, clustering, matching, learning, maintenance — ticks on
//! its own interval behind a reentrancy guard, generalizing a
//! single-consumer-single-queue loop to N independently-cadenced jobs
//! sharing one cancellation token.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use flywheel_core::Result;

/// One schedulable analytical stage. Implementors wrap a crate's
/// `run_once`-shaped function together with whatever config/handles it
/// needs; the scheduler only ever calls `run_once`.
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;
    async fn run_once(&self) -> Result<()>;
}

struct ScheduledJob {
    job: Arc<dyn Job>,
    lock: Arc<Mutex<()>>,
}

/// Owns one background task per registered job plus the cancellation
/// token that stops them all. Each job also carries a reentrancy lock
/// shared between its scheduled ticks and any manual [`Scheduler::trigger`]
/// call, so an operator-initiated run (e.g. a `match-now` CLI
/// invocation) never overlaps a scheduled run of the same job.
pub struct Scheduler {
    cancel: CancellationToken,
    jobs: Vec<ScheduledJob>,
    handles: Vec<JoinHandle<()>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            jobs: Vec::new(),
            handles: Vec::new(),
        }
    }

    /// Registers a job and spawns its ticking task. `reentrancy_timeout`
    /// bounds how long a tick waits for a prior in-flight run before it
    /// gives up and skips — the tick is never queued behind a slow run.
    pub fn register(&mut self, job: Arc<dyn Job>, interval: StdDuration, reentrancy_timeout: StdDuration) {
        let lock = Arc::new(Mutex::new(()));
        self.jobs.push(ScheduledJob {
            job: job.clone(),
            lock: lock.clone(),
        });
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(run_ticker(job, interval, reentrancy_timeout, lock, cancel));
        self.handles.push(handle);
    }

    /// Runs a registered job immediately, out of band with its ticking
    /// schedule, sharing the same reentrancy lock. Returns `None` if no
    /// job with that name is registered, or if the reentrancy lock
    /// couldn't be acquired within `reentrancy_timeout`.
    pub async fn trigger(&self, name: &str, reentrancy_timeout: StdDuration) -> Option<Result<()>> {
        let entry = self.jobs.iter().find(|j| j.job.name() == name)?;
        let guard = tokio::time::timeout(reentrancy_timeout, entry.lock.clone().lock_owned())
            .await
            .ok()?;
        let result = entry.job.run_once().await;
        drop(guard);
        Some(result)
    }

    /// Signals every job's ticking task to stop after its current tick.
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }

    /// Waits for every job's ticking task to exit. Call after
    /// [`Scheduler::cancel_all`] during shutdown.
    pub async fn join_all(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn run_ticker(
    job: Arc<dyn Job>,
    interval: StdDuration,
    reentrancy_timeout: StdDuration,
    lock: Arc<Mutex<()>>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match tokio::time::timeout(reentrancy_timeout, lock.clone().lock_owned()).await {
                    Ok(_guard) => {
                        if let Err(e) = job.run_once().await {
                            warn!(job = job.name(), error = %e, "scheduled job run failed");
                        }
                    }
                    Err(_) => {
                        warn!(job = job.name(), "previous run still in flight, skipping tick");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingJob {
        name: &'static str,
        runs: Arc<AtomicUsize>,
        hold: Option<Duration>,
    }

    #[async_trait]
    impl Job for CountingJob {
        fn name(&self) -> &str {
            self.name
        }

        async fn run_once(&self) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if let Some(hold) = self.hold {
                tokio::time::sleep(hold).await;
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_job_repeatedly_on_its_interval() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        scheduler.register(
            Arc::new(CountingJob { name: "behavioral", runs: runs.clone(), hold: None }),
            Duration::from_secs(10),
            Duration::from_secs(1),
        );

        tokio::time::advance(Duration::from_secs(35)).await;
        tokio::task::yield_now().await;

        assert!(runs.load(Ordering::SeqCst) >= 3);
        scheduler.cancel_all();
        scheduler.join_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn manual_trigger_shares_reentrancy_lock_with_ticker() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        scheduler.register(
            Arc::new(CountingJob {
                name: "correlation",
                runs: runs.clone(),
                hold: Some(Duration::from_secs(5)),
            }),
            Duration::from_secs(3600),
            Duration::from_millis(50),
        );

        let result = scheduler.trigger("correlation", Duration::from_secs(1)).await;
        assert!(result.is_some());
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        scheduler.cancel_all();
        scheduler.join_all().await;
    }

    #[tokio::test]
    async fn trigger_returns_none_for_unknown_job() {
        let scheduler = Scheduler::new();
        let result = scheduler.trigger("nonexistent", Duration::from_millis(10)).await;
        assert!(result.is_none());
    }
}
