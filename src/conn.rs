use crate::error::Result;
use async_trait::async_trait;

/// One open session with the database.
///
/// Sessions are what the pools hand out. A session remembers the database
/// selected with [`Session::use_database`] for the statements that follow.
#[async_trait]
pub trait Session: Send + 'static {
    /// Executes one statement and returns the number of affected rows.
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Makes `database` the default for unqualified table names.
    async fn use_database(&mut self, database: &str) -> Result<()>;

    /// Round-trips a trivial query.
    async fn ping(&mut self) -> Result<()>;

    /// Whether the session hit an error it cannot recover from.
    ///
    /// Pools discard broken sessions instead of recycling them.
    fn is_broken(&self) -> bool {
        false
    }
}

/// Opens new sessions. Shared by every pool backend.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Session: Session;

    async fn connect(&self) -> Result<Self::Session>;
}

/// A session checked out of a connection source.
///
/// Dropping the lease hands the session back to its pool.
pub type Lease = Box<dyn Session>;
