use crate::executor::{SubmitError, WorkerPool};
use crate::metrics_utils::{
    ROWS_INSERTED, TASKS_FAILED, TASKS_REJECTED, TASKS_SUBMITTED, TASKS_SUCCEEDED, TASK_DURATION,
};
use crate::source::ConnectionSource;
use crate::task::{InsertPlan, InsertTask};
use metrics::{counter, histogram};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const BACKOFF_BASE: Duration = Duration::from_millis(10);
const BACKOFF_MAX: Duration = Duration::from_millis(1600);

/// Exponential delay applied after the worker queue turns a task away.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BACKOFF_BASE, BACKOFF_MAX)
    }
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    /// The delay for the next consecutive rejection.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self
            .base
            .saturating_mul(1u32 << self.attempt.min(16))
            .min(self.max);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Counters shared between the dispatcher and the tasks it submits.
#[derive(Debug, Default)]
struct DispatchStats {
    submitted: AtomicU64,
    rejected: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    rows: AtomicU64,
}

/// Totals of one dispatch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchReport {
    pub ticks: u64,
    pub submitted: u64,
    pub rejected: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub rows_inserted: u64,
}

/// Submits one insert task per tick to a bounded worker pool.
pub struct Dispatcher {
    workers: WorkerPool,
    source: Arc<dyn ConnectionSource>,
    plan: Arc<InsertPlan>,
    interval: Duration,
    backoff: Backoff,
    tick_limit: Option<u64>,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    /// Must be called from within a Tokio runtime; the workers are spawned
    /// right away.
    pub fn new(
        source: Arc<dyn ConnectionSource>,
        plan: InsertPlan,
        worker_count: usize,
        queue_size: usize,
        interval: Duration,
    ) -> Self {
        Self {
            workers: WorkerPool::new(worker_count, queue_size),
            source,
            plan: Arc::new(plan),
            interval,
            backoff: Backoff::default(),
            tick_limit: None,
            stats: Arc::new(DispatchStats::default()),
        }
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Stops after `ticks` iterations instead of running until shutdown.
    pub fn tick_limit(mut self, ticks: u64) -> Self {
        self.tick_limit = Some(ticks);
        self
    }

    /// Runs the dispatch loop until `shutdown` resolves or the tick limit is
    /// reached, then drains the workers.
    pub async fn run_until<F>(mut self, shutdown: F) -> DispatchReport
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut ticks = 0u64;

        loop {
            if self.tick_limit.is_some_and(|limit| ticks >= limit) {
                break;
            }
            ticks += 1;

            let pause = match self.submit() {
                Ok(()) => {
                    self.backoff.reset();
                    info!(
                        "thread pool size: {}, active pool size: {}",
                        self.workers.pool_size(),
                        self.workers.active_count()
                    );
                    self.interval
                }
                Err(SubmitError::Full) => {
                    let delay = self.backoff.next_delay();
                    warn!(
                        "worker queue full ({} waiting), task dropped, backing off {:?}",
                        self.workers.queued(),
                        delay
                    );
                    self.interval.max(delay)
                }
                Err(SubmitError::Closed) => break,
            };

            if pause.is_zero() {
                tokio::select! {
                    biased;
                    () = &mut shutdown => break,
                    () = tokio::task::yield_now() => {}
                }
            } else {
                tokio::select! {
                    biased;
                    () = &mut shutdown => break,
                    () = tokio::time::sleep(pause) => {}
                }
            }
        }

        self.workers.shutdown().await;
        let stats = &self.stats;
        let report = DispatchReport {
            ticks,
            submitted: stats.submitted.load(Ordering::Relaxed),
            rejected: stats.rejected.load(Ordering::Relaxed),
            succeeded: stats.succeeded.load(Ordering::Relaxed),
            failed: stats.failed.load(Ordering::Relaxed),
            rows_inserted: stats.rows.load(Ordering::Relaxed),
        };
        info!("dispatch stopped: {:?}", report);
        report
    }

    fn submit(&self) -> Result<(), SubmitError> {
        let task = InsertTask::new(self.source.clone(), self.plan.clone());
        let stats = self.stats.clone();
        let submitted = self.workers.try_submit(async move {
            match task.run().await {
                Ok(outcome) => {
                    stats.succeeded.fetch_add(1, Ordering::Relaxed);
                    stats.rows.fetch_add(outcome.affected_rows, Ordering::Relaxed);
                    counter!(TASKS_SUCCEEDED).increment(1);
                    counter!(ROWS_INSERTED).increment(outcome.affected_rows);
                    histogram!(TASK_DURATION).record(outcome.elapsed.as_secs_f64());
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    counter!(TASKS_FAILED).increment(1);
                    error!("insert task failed: {}", e);
                }
            }
        });

        match submitted {
            Ok(()) => {
                self.stats.submitted.fetch_add(1, Ordering::Relaxed);
                counter!(TASKS_SUBMITTED).increment(1);
            }
            Err(SubmitError::Full) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                counter!(TASKS_REJECTED).increment(1);
            }
            Err(SubmitError::Closed) => {}
        }
        submitted
    }
}
