//! Connection sources: one pooling library per [`PoolKind`] behind a single
//! capability trait.

mod bb8_pool;
mod deadpool_pool;
mod mobc_pool;
mod r2d2_pool;

use crate::config::{PoolKind, Settings};
use crate::conn::{Connector, Lease};
use crate::error::Result;
use crate::taos::RestConnector;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// How long a checkout may wait before the pool gives up, unless
/// [`build_source_with_timeout`] says otherwise.
pub const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(30);

/// A point-in-time view of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolState {
    pub max_size: u32,
    /// Open sessions, checked out or idle.
    pub connections: u32,
    pub idle: u32,
}

/// A bounded, thread-safe supply of sessions.
#[async_trait]
pub trait ConnectionSource: Send + Sync + 'static {
    /// The library backing this source.
    fn kind(&self) -> PoolKind;

    fn max_size(&self) -> u32;

    /// Checks out a session, waiting under the pool's own timeout policy.
    async fn acquire(&self) -> Result<Lease>;

    async fn state(&self) -> PoolState;
}

/// Builds the source described by `settings`, talking REST to the
/// configured adapter.
///
/// No session is opened here; connectivity problems show up on the first
/// `acquire`.
pub fn create_source(settings: &Settings) -> Result<Arc<dyn ConnectionSource>> {
    let connector = RestConnector::new(settings.endpoint(), &settings.user, &settings.password);
    build_source(connector, settings.pool_size, settings.pool_kind)
}

/// Builds a source of `kind` holding at most `pool_size` sessions from
/// `connector`.
pub fn build_source<C: Connector>(
    connector: C,
    pool_size: u32,
    kind: PoolKind,
) -> Result<Arc<dyn ConnectionSource>> {
    build_source_with_timeout(connector, pool_size, kind, CHECKOUT_TIMEOUT)
}

/// Like [`build_source`], with checkouts giving up after `timeout` and
/// failing with [`Error::Timeout`](crate::Error::Timeout).
pub fn build_source_with_timeout<C: Connector>(
    connector: C,
    pool_size: u32,
    kind: PoolKind,
    timeout: Duration,
) -> Result<Arc<dyn ConnectionSource>> {
    let source: Arc<dyn ConnectionSource> = match kind {
        PoolKind::Mobc => Arc::new(mobc_pool::MobcSource::new(connector, pool_size, timeout)),
        PoolKind::Bb8 => Arc::new(bb8_pool::Bb8Source::new(connector, pool_size, timeout)),
        PoolKind::Deadpool => Arc::new(deadpool_pool::DeadpoolSource::new(
            connector, pool_size, timeout,
        )?),
        PoolKind::R2d2 => Arc::new(r2d2_pool::R2d2Source::new(connector, pool_size, timeout)?),
    };
    tracing::debug!("built {} source with max size {}", kind, pool_size);
    Ok(source)
}
