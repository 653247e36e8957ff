use crate::error::{Error, Result};
use std::fmt;
use std::time::Duration;

const DEFAULT_PORT: u16 = 6041;
const DEFAULT_USER: &str = "root";
const DEFAULT_PASSWORD: &str = "taosdata";
const DEFAULT_BATCH_SIZE: u32 = 10;
const DEFAULT_SLEEP_MS: u64 = 1000;
const DEFAULT_POOL_SIZE: u32 = 50;
const DEFAULT_TABLE_COUNT: u32 = 1000;
const DEFAULT_WORKER_COUNT: u32 = 50;

pub const USAGE: &str = "Usage: taos-pool-demo \
-host <hostname> \
-batchSize <batchSize> \
-sleep <sleep> \
-connectPoolSize <connectPoolSize> \
-tableSize <tableSize> \
-threadPoolSize <threadPoolSize> \
-poolType <mobc|bb8|deadpool|r2d2> \
[-port <port>] [-user <user>] [-password <password>] \
[-queueSize <queueSize>] [-tableMode <random|sequential>]";

/// The pooling library backing the connection source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolKind {
    #[default]
    Mobc,
    Bb8,
    Deadpool,
    R2d2,
}

impl PoolKind {
    /// Resolves a `-poolType` tag, ignoring case.
    ///
    /// The names used by the JDBC version of this demo are accepted as
    /// aliases. Anything unknown resolves to the default kind.
    pub fn resolve(tag: &str) -> PoolKind {
        match tag.to_ascii_lowercase().as_str() {
            "bb8" | "dbcp" => PoolKind::Bb8,
            "deadpool" | "druid" => PoolKind::Deadpool,
            "r2d2" | "c3p0" => PoolKind::R2d2,
            _ => PoolKind::Mobc,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolKind::Mobc => "mobc",
            PoolKind::Bb8 => "bb8",
            PoolKind::Deadpool => "deadpool",
            PoolKind::R2d2 => "r2d2",
        }
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the rows of one batch are spread over the child tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableMode {
    /// Every row picks a table uniformly at random.
    #[default]
    Random,
    /// Rows walk the tables round-robin, continuing where the last batch
    /// stopped.
    Sequential,
}

impl TableMode {
    fn resolve(tag: &str) -> TableMode {
        if tag.eq_ignore_ascii_case("sequential") {
            TableMode::Sequential
        } else {
            TableMode::Random
        }
    }
}

impl fmt::Display for TableMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableMode::Random => f.write_str("random"),
            TableMode::Sequential => f.write_str("sequential"),
        }
    }
}

/// Settings of one benchmark run.
///
/// Built once at startup, either from command-line tokens with
/// [`Settings::from_args`] or programmatically starting at [`Settings::new`],
/// and shared read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub batch_size: u32,
    pub sleep: Duration,
    pub pool_size: u32,
    pub table_count: u32,
    pub worker_count: u32,
    pub queue_size: usize,
    pub pool_kind: PoolKind,
    pub table_mode: TableMode,
}

impl Settings {
    /// Constructs settings for `host`.
    ///
    /// Every other parameter is initialized with its default value.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            user: DEFAULT_USER.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            sleep: Duration::from_millis(DEFAULT_SLEEP_MS),
            pool_size: DEFAULT_POOL_SIZE,
            table_count: DEFAULT_TABLE_COUNT,
            worker_count: DEFAULT_WORKER_COUNT,
            queue_size: DEFAULT_WORKER_COUNT as usize,
            pool_kind: PoolKind::default(),
            table_mode: TableMode::default(),
        }
    }

    /// Sets the number of rows written by one insert statement.
    ///
    /// - Defaults to 10.
    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the pause between two dispatch ticks.
    ///
    /// - Zero means submit as fast as the queue accepts.
    /// - Defaults to 1 second.
    pub fn sleep(mut self, sleep: Duration) -> Self {
        self.sleep = sleep;
        self
    }

    /// Sets the maximum number of connections held by the pool.
    ///
    /// - Defaults to 50.
    pub fn pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Sets the number of child tables created under `weather`.
    ///
    /// - Defaults to 1000.
    pub fn table_count(mut self, table_count: u32) -> Self {
        self.table_count = table_count;
        self
    }

    /// Sets the number of workers, and the default queue size with it.
    ///
    /// - Defaults to 50.
    pub fn worker_count(mut self, worker_count: u32) -> Self {
        self.worker_count = worker_count;
        self.queue_size = worker_count as usize;
        self
    }

    /// Sets how many submitted tasks may wait for a free worker.
    ///
    /// - Defaults to the worker count.
    pub fn queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    pub fn pool_kind(mut self, pool_kind: PoolKind) -> Self {
        self.pool_kind = pool_kind;
        self
    }

    pub fn table_mode(mut self, table_mode: TableMode) -> Self {
        self.table_mode = table_mode;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// Parses command-line tokens, program name excluded.
    ///
    /// Flags match case-insensitively and take the following token as their
    /// value. Unknown tokens, and a flag in last position, are ignored.
    pub fn from_args<I, S>(args: I) -> Result<Settings>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<S> = args.into_iter().collect();
        let mut host = None;
        let mut port = None;
        let mut user = None;
        let mut password = None;
        let mut batch_size = None;
        let mut sleep = None;
        let mut pool_size = None;
        let mut table_count = None;
        let mut worker_count = None;
        let mut queue_size = None;
        let mut pool_kind = None;
        let mut table_mode = None;

        let mut i = 0;
        while i + 1 < args.len() {
            let flag = args[i].as_ref().to_ascii_lowercase();
            let value = args[i + 1].as_ref();
            match flag.as_str() {
                "-host" => host = Some(value.to_string()),
                "-port" => port = Some(parse_number::<u16>("-port", value)?),
                "-user" => user = Some(value.to_string()),
                "-password" => password = Some(value.to_string()),
                "-batchsize" => batch_size = Some(parse_number::<u32>("-batchSize", value)?),
                "-sleep" => sleep = Some(parse_number::<u64>("-sleep", value)?),
                "-connectpoolsize" => {
                    pool_size = Some(parse_number::<u32>("-connectPoolSize", value)?)
                }
                "-tablesize" => table_count = Some(parse_number::<u32>("-tableSize", value)?),
                "-threadpoolsize" => {
                    worker_count = Some(parse_number::<u32>("-threadPoolSize", value)?)
                }
                "-queuesize" => queue_size = Some(parse_number::<usize>("-queueSize", value)?),
                "-pooltype" => pool_kind = Some(PoolKind::resolve(value)),
                "-tablemode" => table_mode = Some(TableMode::resolve(value)),
                _ => {
                    i += 1;
                    continue;
                }
            }
            i += 2;
        }

        let mut settings = Settings::new(host.ok_or(Error::MissingHost)?);
        if let Some(port) = port {
            settings = settings.port(port);
        }
        if user.is_some() || password.is_some() {
            let user = user.unwrap_or_else(|| settings.user.clone());
            let password = password.unwrap_or_else(|| settings.password.clone());
            settings = settings.credentials(user, password);
        }
        if let Some(batch_size) = batch_size {
            settings = settings.batch_size(batch_size);
        }
        if let Some(sleep) = sleep {
            settings = settings.sleep(Duration::from_millis(sleep));
        }
        if let Some(pool_size) = pool_size {
            settings = settings.pool_size(pool_size);
        }
        if let Some(table_count) = table_count {
            settings = settings.table_count(table_count);
        }
        if let Some(worker_count) = worker_count {
            settings = settings.worker_count(worker_count);
        }
        if let Some(queue_size) = queue_size {
            settings = settings.queue_size(queue_size);
        }
        if let Some(pool_kind) = pool_kind {
            settings = settings.pool_kind(pool_kind);
        }
        if let Some(table_mode) = table_mode {
            settings = settings.table_mode(table_mode);
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Rejects sizes that would leave nothing to run.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("-batchSize", self.batch_size as usize),
            ("-connectPoolSize", self.pool_size as usize),
            ("-tableSize", self.table_count as usize),
            ("-threadPoolSize", self.worker_count as usize),
            ("-queueSize", self.queue_size),
        ];
        for (flag, value) in checks {
            if value == 0 {
                return Err(Error::ZeroSetting { flag });
            }
        }
        Ok(())
    }

    /// Base URL of the REST adapter.
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

fn parse_number<T>(flag: &'static str, value: &str) -> Result<T>
where
    T: std::str::FromStr<Err = std::num::ParseIntError>,
{
    value.parse().map_err(|source| Error::InvalidNumber {
        flag,
        value: value.to_string(),
        source,
    })
}
