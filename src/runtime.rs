//! The Tokio runtime the demo runs on.

use crate::config::Settings;
use std::future::Future;

/// Wrapper of the Tokio Runtime, sized for one run.
pub struct Runtime {
    rt: tokio::runtime::Runtime,
}

impl Runtime {
    /// Creates a multi-threaded runtime with one thread per configured
    /// worker.
    pub fn new(settings: &Settings) -> std::io::Result<Self> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(settings.worker_count.max(1) as usize)
            .thread_name("taos-pool-worker")
            .enable_all()
            .build()?;
        Ok(Runtime { rt })
    }

    /// Runs a future to completion on the runtime. This is the runtime's
    /// entry point.
    pub fn block_on<F, T>(&self, future: F) -> T
    where
        F: Future<Output = T>,
    {
        self.rt.block_on(future)
    }
}
