//! Drives insert load into TDengine through one of several connection
//! pools, so the pools can be compared under the same workload.
//!
//! A run resets the `pool_test` database, creates the `weather` super table
//! and its child tables, then keeps submitting batched inserts to a fixed
//! set of workers until the process is interrupted.
//!
//! ```no_run
//! use taos_pool_demo::{Runtime, Settings};
//!
//! fn main() -> Result<(), taos_pool_demo::Error> {
//!     let settings = Settings::from_args(["-host", "localhost", "-poolType", "bb8"])?;
//!     let rt = Runtime::new(&settings)?;
//!     rt.block_on(taos_pool_demo::run(settings))?;
//!     Ok(())
//! }
//! ```

pub mod config;
mod conn;
pub mod dispatch;
mod error;
pub mod executor;
pub mod metrics_utils;
mod runtime;
pub mod schema;
pub mod source;
pub mod taos;
pub mod task;

pub use config::{PoolKind, Settings, TableMode};
pub use conn::{Connector, Lease, Session};
pub use dispatch::{DispatchReport, Dispatcher};
pub use error::{Error, Result};
pub use runtime::Runtime;
pub use source::{
    build_source, build_source_with_timeout, create_source, ConnectionSource, PoolState,
};

use std::future::Future;
use task::InsertPlan;
use tracing::{info, warn};

/// Runs the benchmark described by `settings` until Ctrl-C.
pub async fn run(settings: Settings) -> Result<DispatchReport> {
    let source = create_source(&settings)?;
    run_with(source, &settings, shutdown_signal()).await
}

/// Runs the benchmark against an existing `source` until `shutdown`
/// resolves.
///
/// `settings` are validated first, so zero sizes fail with
/// [`Error::ZeroSetting`] before anything touches the database.
pub async fn run_with<F>(
    source: std::sync::Arc<dyn ConnectionSource>,
    settings: &Settings,
    shutdown: F,
) -> Result<DispatchReport>
where
    F: Future<Output = ()>,
{
    settings.validate()?;
    metrics_utils::describe_metrics();
    info!(">>>>>>>>>>>>>> connection pool type: {}", source.kind());

    let plan = prepare(source.as_ref(), settings).await?;
    let report = Dispatcher::new(
        source,
        plan,
        settings.worker_count as usize,
        settings.queue_size,
        settings.sleep,
    )
    .run_until(shutdown)
    .await;
    Ok(report)
}

/// Resets the schema and returns the plan every insert task follows.
///
/// If initialization stops part way, the load targets the child tables
/// that do exist. Without any child table the run cannot go on and the
/// schema error is returned.
pub async fn prepare(source: &dyn ConnectionSource, settings: &Settings) -> Result<InsertPlan> {
    settings.validate()?;
    let table_count = match schema::initialize(source, schema::DATABASE, settings.table_count).await
    {
        Ok(0) => return Err(Error::ZeroSetting { flag: "-tableSize" }),
        Ok(created) => created,
        Err(Error::Schema { created, source }) if created > 0 => {
            warn!(
                "schema initialization failed ({}), continuing with t_1..t_{} of {} tables",
                source, created, settings.table_count
            );
            created
        }
        Err(e) => return Err(e),
    };

    Ok(InsertPlan::new(
        schema::DATABASE,
        table_count,
        settings.batch_size,
        settings.table_mode,
    ))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for Ctrl-C, running until killed: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Ctrl-C received, shutting down");
}
