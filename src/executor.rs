use crate::metrics_utils::{GaugeGuard, ACTIVE_WORKERS};
use futures_util::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// A unit of work run by the pool.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Why [`WorkerPool::try_submit`] turned a job away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// Every queue slot is taken.
    Full,
    /// The pool is shutting down.
    Closed,
}

impl fmt::Display for SubmitError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Full => fmt.write_str("worker queue is full"),
            SubmitError::Closed => fmt.write_str("worker pool is shut down"),
        }
    }
}

impl std::error::Error for SubmitError {}

/// A fixed set of workers fed from one bounded queue.
pub struct WorkerPool {
    sender: mpsc::Sender<Job>,
    workers: Vec<JoinHandle<()>>,
    active: Arc<AtomicUsize>,
    queue_size: usize,
}

impl WorkerPool {
    /// Spawns `size` workers onto the current runtime. At most `queue_size`
    /// jobs may wait for a worker.
    ///
    /// # Panics
    ///
    /// Panics if `size` or `queue_size` is zero, or outside a Tokio runtime.
    pub fn new(size: usize, queue_size: usize) -> Self {
        assert!(size > 0, "worker pool size must be positive");
        let (sender, receiver) = mpsc::channel::<Job>(queue_size);
        let receiver = Arc::new(Mutex::new(receiver));
        let active = Arc::new(AtomicUsize::new(0));

        let workers = (0..size)
            .map(|id| tokio::spawn(worker_loop(id, receiver.clone(), active.clone())))
            .collect();

        Self {
            sender,
            workers,
            active,
            queue_size,
        }
    }

    /// Queues `job` without waiting.
    pub fn try_submit<F>(&self, job: F) -> Result<(), SubmitError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.sender.try_send(Box::pin(job)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SubmitError::Full),
            Err(TrySendError::Closed(_)) => Err(SubmitError::Closed),
        }
    }

    /// Number of workers.
    pub fn pool_size(&self) -> usize {
        self.workers.len()
    }

    /// Number of workers running a job right now.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Number of jobs waiting for a worker.
    pub fn queued(&self) -> usize {
        self.queue_size - self.sender.capacity()
    }

    /// Stops accepting jobs, lets the workers drain the queue, and waits
    /// for them to exit.
    pub async fn shutdown(self) {
        drop(self.sender);
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::error!("worker exited abnormally: {}", e);
            }
        }
    }
}

async fn worker_loop(
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    active: Arc<AtomicUsize>,
) {
    loop {
        let job = receiver.lock().await.recv().await;
        let job = match job {
            Some(job) => job,
            None => break,
        };

        active.fetch_add(1, Ordering::Relaxed);
        let _gauge = GaugeGuard::increment(ACTIVE_WORKERS);
        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
            tracing::error!("worker {} caught a panicking job", id);
        }
        active.fetch_sub(1, Ordering::Relaxed);
    }
    tracing::debug!("worker {} stopped", id);
}
