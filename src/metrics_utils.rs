use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};

pub const TASKS_SUBMITTED: &str = "demo_tasks_submitted_total";
pub const TASKS_REJECTED: &str = "demo_tasks_rejected_total";
pub const TASKS_SUCCEEDED: &str = "demo_tasks_succeeded_total";
pub const TASKS_FAILED: &str = "demo_tasks_failed_total";
pub const ROWS_INSERTED: &str = "demo_rows_inserted_total";
pub const ACTIVE_WORKERS: &str = "demo_active_workers";
pub const TASK_DURATION: &str = "demo_task_duration";

pub fn describe_metrics() {
    describe_counter!(
        TASKS_SUBMITTED,
        "The number of insert tasks accepted by the worker queue."
    );

    describe_counter!(
        TASKS_REJECTED,
        "The number of insert tasks dropped because the worker queue was full."
    );

    describe_counter!(TASKS_SUCCEEDED, "The number of insert tasks that completed.");

    describe_counter!(
        TASKS_FAILED,
        "The number of insert tasks that ended with an error."
    );

    describe_counter!(ROWS_INSERTED, "The number of rows reported as inserted.");

    describe_gauge!(
        ACTIVE_WORKERS,
        "The number of workers currently running an insert task."
    );

    describe_histogram!(
        TASK_DURATION,
        "Time from connection checkout to statement completion."
    );
}

/// Holds a gauge up by one for as long as it lives.
pub(crate) struct GaugeGuard {
    key: &'static str,
}

impl GaugeGuard {
    pub(crate) fn increment(key: &'static str) -> Self {
        gauge!(key).increment(1.0);
        Self { key }
    }
}

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        gauge!(self.key).decrement(1.0);
    }
}
