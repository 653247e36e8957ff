use crate::config::{Settings, TableMode};
use crate::error::Result;
use crate::schema::table_name;
use crate::source::ConnectionSource;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What every insert task writes: shared by all tasks of a run.
#[derive(Debug)]
pub struct InsertPlan {
    database: String,
    table_count: u32,
    batch_size: u32,
    mode: TableMode,
    cursor: AtomicU64,
}

/// One row of the `weather` schema.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Row {
    pub ts: i64,
    pub temperature: f32,
    pub humidity: i32,
}

impl InsertPlan {
    pub fn new(
        database: impl Into<String>,
        table_count: u32,
        batch_size: u32,
        mode: TableMode,
    ) -> Self {
        Self {
            database: database.into(),
            table_count,
            batch_size,
            mode,
            cursor: AtomicU64::new(0),
        }
    }

    pub fn from_settings(database: impl Into<String>, settings: &Settings) -> Self {
        Self::new(
            database,
            settings.table_count,
            settings.batch_size,
            settings.table_mode,
        )
    }

    pub fn table_count(&self) -> u32 {
        self.table_count
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// Picks the child table index, in `1..=table_count`, for each row of
    /// one batch.
    fn pick_tables<R: Rng>(&self, rng: &mut R) -> Vec<u32> {
        match self.mode {
            TableMode::Random => (0..self.batch_size)
                .map(|_| rng.random_range(1..=self.table_count))
                .collect(),
            TableMode::Sequential => {
                let start = self
                    .cursor
                    .fetch_add(u64::from(self.batch_size), Ordering::Relaxed);
                (0..u64::from(self.batch_size))
                    .map(|i| ((start + i) % u64::from(self.table_count)) as u32 + 1)
                    .collect()
            }
        }
    }

    /// Builds one multi-table insert of `batch_size` rows stamped from
    /// `start_ms` on.
    ///
    /// Rows bound for the same table are grouped, and tables appear in
    /// ascending order.
    pub fn build_statement<R: Rng>(&self, rng: &mut R, start_ms: i64) -> String {
        let mut by_table: BTreeMap<u32, Vec<Row>> = BTreeMap::new();
        for (i, table) in self.pick_tables(rng).into_iter().enumerate() {
            let row = Row {
                ts: start_ms + i as i64,
                temperature: rng.random::<f32>() * 30.0,
                humidity: rng.random_range(0..70),
            };
            by_table.entry(table).or_default().push(row);
        }

        let mut sql = String::from("insert into");
        for (table, rows) in by_table {
            sql.push_str(&format!(" {}.{} values", self.database, table_name(table)));
            for row in rows {
                sql.push_str(&format!(" ({}, {}, {})", row.ts, row.temperature, row.humidity));
            }
        }
        sql
    }
}

/// What a finished insert task reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    pub affected_rows: u64,
    pub elapsed: Duration,
}

/// One unit of insert load: lease a session, run one batched insert, give
/// the session back.
pub struct InsertTask {
    source: Arc<dyn ConnectionSource>,
    plan: Arc<InsertPlan>,
}

impl InsertTask {
    pub fn new(source: Arc<dyn ConnectionSource>, plan: Arc<InsertPlan>) -> Self {
        Self { source, plan }
    }

    /// Runs the task. The lease is dropped, and the session returned to
    /// the pool, on every path out of this function.
    pub async fn run(self) -> Result<InsertOutcome> {
        let start_ms = chrono::Utc::now().timestamp_millis();
        let sql = self.plan.build_statement(&mut rand::rng(), start_ms);

        let started = Instant::now();
        let mut conn = self.source.acquire().await?;
        let affected_rows = conn.execute(&sql).await?;
        drop(conn);

        let elapsed = started.elapsed();
        tracing::info!(
            "SQL >>> {} (affected rows: {}, cost: {:?})",
            sql,
            affected_rows,
            elapsed
        );
        Ok(InsertOutcome {
            affected_rows,
            elapsed,
        })
    }
}
