use super::{ConnectionSource, PoolState};
use crate::config::PoolKind;
use crate::conn::{Connector, Lease, Session};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use deadpool::managed::{self, Metrics, Object, PoolError, RecycleError, RecycleResult};
use deadpool::Runtime;

/// A deadpool manager opening sessions from a [`Connector`].
pub(super) struct DeadpoolManager<C>(C);

impl<C: Connector> managed::Manager for DeadpoolManager<C> {
    type Type = C::Session;
    type Error = Error;

    async fn create(&self) -> Result<C::Session> {
        self.0.connect().await
    }

    async fn recycle(&self, conn: &mut C::Session, _: &Metrics) -> RecycleResult<Error> {
        if conn.is_broken() {
            return Err(RecycleError::Backend(Error::Pool {
                kind: PoolKind::Deadpool,
                message: "session is broken".to_string(),
            }));
        }
        Ok(())
    }
}

struct DeadpoolLease<C: Connector>(Object<DeadpoolManager<C>>);

#[async_trait]
impl<C: Connector> Session for DeadpoolLease<C> {
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

pub(super) struct DeadpoolSource<C: Connector> {
    pool: managed::Pool<DeadpoolManager<C>>,
    max_size: u32,
}

impl<C: Connector> DeadpoolSource<C> {
    pub(super) fn new(connector: C, max_size: u32, timeout: Duration) -> Result<Self> {
        let pool = managed::Pool::builder(DeadpoolManager(connector))
            .max_size(max_size as usize)
            .wait_timeout(Some(timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| Error::Pool {
                kind: PoolKind::Deadpool,
                message: e.to_string(),
            })?;
        Ok(Self { pool, max_size })
    }
}

#[async_trait]
impl<C: Connector> ConnectionSource for DeadpoolSource<C> {
    fn kind(&self) -> PoolKind {
        PoolKind::Deadpool
    }

    fn max_size(&self) -> u32 {
        self.max_size
    }

    async fn acquire(&self) -> Result<Lease> {
        match self.pool.get().await {
            Ok(conn) => Ok(Box::new(DeadpoolLease(conn))),
            Err(PoolError::Backend(e)) => Err(e),
            Err(PoolError::Timeout(_)) => Err(Error::Timeout(PoolKind::Deadpool)),
            Err(e) => Err(Error::Pool {
                kind: PoolKind::Deadpool,
                message: e.to_string(),
            }),
        }
    }

    async fn state(&self) -> PoolState {
        let status = self.pool.status();
        PoolState {
            max_size: self.max_size,
            connections: status.size as u32,
            idle: status.available.max(0) as u32,
        }
    }
}
