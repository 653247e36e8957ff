use super::{ConnectionSource, PoolState};
use crate::config::PoolKind;
use crate::conn::{Connector, Lease, Session};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use bb8::{PooledConnection, RunError};

/// A `bb8::ManageConnection` opening sessions from a [`Connector`].
pub(super) struct Bb8Manager<C>(C);

#[async_trait]
impl<C: Connector> bb8::ManageConnection for Bb8Manager<C> {
    type Connection = C::Session;
    type Error = Error;

    async fn connect(&self) -> Result<Self::Connection> {
        self.0.connect().await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<()> {
        conn.ping().await
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_broken()
    }
}

struct Bb8Lease<C: Connector>(PooledConnection<'static, Bb8Manager<C>>);

#[async_trait]
impl<C: Connector> Session for Bb8Lease<C> {
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

pub(super) struct Bb8Source<C: Connector> {
    pool: bb8::Pool<Bb8Manager<C>>,
    max_size: u32,
}

impl<C: Connector> Bb8Source<C> {
    pub(super) fn new(connector: C, max_size: u32, timeout: Duration) -> Self {
        let pool = bb8::Pool::builder()
            .max_size(max_size)
            .connection_timeout(timeout)
            .test_on_check_out(false)
            .build_unchecked(Bb8Manager(connector));
        Self { pool, max_size }
    }
}

#[async_trait]
impl<C: Connector> ConnectionSource for Bb8Source<C> {
    fn kind(&self) -> PoolKind {
        PoolKind::Bb8
    }

    fn max_size(&self) -> u32 {
        self.max_size
    }

    async fn acquire(&self) -> Result<Lease> {
        match self.pool.get_owned().await {
            Ok(conn) => Ok(Box::new(Bb8Lease(conn))),
            Err(RunError::User(e)) => Err(e),
            Err(RunError::TimedOut) => Err(Error::Timeout(PoolKind::Bb8)),
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
