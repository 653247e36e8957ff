//! The fixed benchmark schema: one `weather` super table and child tables
//! `t_1..t_N` created from it.

use crate::conn::Session;
use crate::error::{Error, Result};
use crate::source::ConnectionSource;
use tracing::info;

pub const DATABASE: &str = "pool_test";
pub const SUPER_TABLE: &str = "weather";
pub const TABLE_PREFIX: &str = "t_";
const LOCATION: &str = "beijing";

/// Name of the `index`th child table, counting from 1.
pub fn table_name(index: u32) -> String {
    format!("{}{}", TABLE_PREFIX, index)
}

pub fn create_super_table_sql() -> String {
    format!(
        "create table {}(ts timestamp, temperature float, humidity int) tags(location nchar(64), groupId int)",
        SUPER_TABLE
    )
}

pub fn create_child_table_sql(index: u32) -> String {
    format!(
        "create table {} using {} tags('{}',{})",
        table_name(index),
        SUPER_TABLE,
        LOCATION,
        u64::from(index) + 1
    )
}

/// Drops and recreates `database`, then creates the super table and
/// `table_count` child tables, all on one session.
///
/// Returns the number of child tables created. The first failing statement
/// stops the run; what was created so far is kept and reported through
/// [`Error::Schema`].
pub async fn initialize(
    source: &dyn ConnectionSource,
    database: &str,
    table_count: u32,
) -> Result<u32> {
    let mut created = 0;
    let outcome = async {
        let mut conn = source.acquire().await?;

        execute(&mut *conn, &format!("drop database if exists {}", database)).await?;
        execute(&mut *conn, &format!("create database if not exists {}", database)).await?;
        conn.use_database(database).await?;
        info!("SQL >>> use {}", database);
        execute(&mut *conn, &create_super_table_sql()).await?;

        for index in 1..=table_count {
            execute(&mut *conn, &create_child_table_sql(index)).await?;
            created = index;
        }
        Ok::<_, Error>(())
    }
    .await;

    match outcome {
        Ok(()) => {
            info!("init finished: {} child tables under {}", created, SUPER_TABLE);
            Ok(created)
        }
        Err(e) => Err(Error::Schema {
            created,
            source: Box::new(e),
        }),
    }
}

async fn execute(conn: &mut dyn Session, sql: &str) -> Result<u64> {
    let affected = conn.execute(sql).await?;
    info!("SQL >>> {}", sql);
    Ok(affected)
}
