//! r2d2 is synchronous. Its callbacks run either on r2d2's own threads or
//! inside `spawn_blocking`, so they may block on the runtime handle; once
//! checked out, the session is driven asynchronously like any other.

use super::{ConnectionSource, PoolState};
use crate::config::PoolKind;
use crate::conn::{Connector, Lease, Session};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use r2d2::PooledConnection;
use tokio::runtime::Handle;

/// An `r2d2::ManageConnection` opening sessions from a [`Connector`].
pub(super) struct R2d2Manager<C> {
    connector: C,
    handle: Handle,
}

impl<C: Connector> r2d2::ManageConnection for R2d2Manager<C> {
    type Connection = C::Session;
    type Error = Error;

    fn connect(&self) -> Result<Self::Connection> {
        self.handle.block_on(self.connector.connect())
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<()> {
        self.handle.block_on(conn.ping())
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_broken()
    }
}

struct R2d2Lease<C: Connector>(PooledConnection<R2d2Manager<C>>);

#[async_trait]
impl<C: Connector> Session for R2d2Lease<C> {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        (*self.0).execute(sql).await
    }

    async fn use_database(&mut self, database: &str) -> Result<()> {
        (*self.0).use_database(database).await
    }

    async fn ping(&mut self) -> Result<()> {
        (*self.0).ping().await
    }

    fn is_broken(&self) -> bool {
        (*self.0).is_broken()
    }
}

pub(super) struct R2d2Source<C: Connector> {
    pool: r2d2::Pool<R2d2Manager<C>>,
    max_size: u32,
}

impl<C: Connector> R2d2Source<C> {
    /// Must be called from within a Tokio runtime.
    pub(super) fn new(connector: C, max_size: u32, timeout: Duration) -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| Error::Pool {
            kind: PoolKind::R2d2,
            message: e.to_string(),
        })?;
        let pool = r2d2::Pool::builder()
            .max_size(max_size)
            .min_idle(Some(0))
            .connection_timeout(timeout)
            .test_on_check_out(true)
            .build_unchecked(R2d2Manager { connector, handle });
        Ok(Self { pool, max_size })
    }
}

#[async_trait]
impl<C: Connector> ConnectionSource for R2d2Source<C> {
    fn kind(&self) -> PoolKind {
        PoolKind::R2d2
    }

    fn max_size(&self) -> u32 {
        self.max_size
    }

    async fn acquire(&self) -> Result<Lease> {
        let pool = self.pool.clone();
        let checkout = tokio::task::spawn_blocking(move || pool.get())
            .await
            .map_err(|e| Error::Pool {
                kind: PoolKind::R2d2,
                message: e.to_string(),
            })?;
        // `Pool::get` only fails once the connection timeout has elapsed;
        // the message carries the last connect error, if any.
        match checkout {
            Ok(conn) => Ok(Box::new(R2d2Lease(conn))),
            Err(e) => {
                tracing::warn!("r2d2 checkout failed: {}", e);
                Err(Error::Timeout(PoolKind::R2d2))
            }
        }
    }

    async fn state(&self) -> PoolState {
        let state = self.pool.state();
        PoolState {
            max_size: self.max_size,
            connections: state.connections,
            idle: state.idle_connections,
        }
    }
}
