use crate::config::PoolKind;
use thiserror::Error;

/// The error type returned by methods in this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// `-host` was never given
    #[error("missing required flag -host")]
    MissingHost,
    /// A numeric flag could not be parsed
    #[error("invalid value `{value}` for {flag}: {source}")]
    InvalidNumber {
        flag: &'static str,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
    /// A size flag was set to zero
    #[error("{flag} must be greater than zero")]
    ZeroSetting { flag: &'static str },
    /// The HTTP request to the REST adapter failed
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The adapter answered with a non-JSON error page
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    /// The adapter answered with JSON we could not read
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    /// TDengine rejected the statement
    #[error("TDengine error {code:#06x}: {desc}")]
    Server { code: i32, desc: String },
    /// Checkout waited longer than the pool allows
    #[error("timed out waiting for a {0} connection")]
    Timeout(PoolKind),
    /// Any other pool failure
    #[error("{kind} pool error: {message}")]
    Pool { kind: PoolKind, message: String },
    /// Schema initialization stopped early
    #[error("schema initialization stopped after {created} child tables: {source}")]
    Schema {
        created: u32,
        #[source]
        source: Box<Error>,
    },
    /// Runtime construction failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
