use super::{ConnectionSource, PoolState};
use crate::config::PoolKind;
use crate::conn::{Connector, Lease, Session};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// An `mobc::Manager` opening sessions from a [`Connector`].
pub(super) struct MobcManager<C>(C);

#[async_trait]
impl<C: Connector> mobc::Manager for MobcManager<C> {
    type Connection = C::Session;
    type Error = Error;

    async fn connect(&self) -> Result<Self::Connection> {
        self.0.connect().await
    }

    async fn check(&self, mut conn: Self::Connection) -> Result<Self::Connection> {
        conn.ping().await?;
        Ok(conn)
    }

    fn validate(&self, conn: &mut Self::Connection) -> bool {
        !conn.is_broken()
    }
}

struct MobcLease<C: Connector>(mobc::Connection<MobcManager<C>>);

#[async_trait]
impl<C: Connector> Session for MobcLease<C> {
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

pub(super) struct MobcSource<C: Connector> {
    pool: mobc::Pool<MobcManager<C>>,
    max_size: u32,
}

impl<C: Connector> MobcSource<C> {
    pub(super) fn new(connector: C, max_size: u32, timeout: Duration) -> Self {
        let pool = mobc::Pool::builder()
            .max_open(u64::from(max_size))
            .max_idle(u64::from(max_size))
            .get_timeout(Some(timeout))
            .test_on_check_out(true)
            .health_check_interval(Some(HEALTH_CHECK_INTERVAL))
            .build(MobcManager(connector));
        Self { pool, max_size }
    }
}

#[async_trait]
impl<C: Connector> ConnectionSource for MobcSource<C> {
    fn kind(&self) -> PoolKind {
        PoolKind::Mobc
    }

    fn max_size(&self) -> u32 {
        self.max_size
    }

    async fn acquire(&self) -> Result<Lease> {
        match self.pool.get().await {
            Ok(conn) => Ok(Box::new(MobcLease(conn))),
            Err(mobc::Error::Inner(e)) => Err(e),
            Err(mobc::Error::Timeout) => Err(Error::Timeout(PoolKind::Mobc)),
            Err(e) => Err(Error::Pool {
                kind: PoolKind::Mobc,
                message: e.to_string(),
            }),
        }
    }

    async fn state(&self) -> PoolState {
        let state = self.pool.state().await;
        PoolState {
            max_size: self.max_size,
            connections: state.connections as u32,
            idle: state.idle as u32,
        }
    }
}
