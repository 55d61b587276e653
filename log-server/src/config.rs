use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub(crate) const BIND_ADDR: &str = "127.0.0.1:4567";
pub(crate) const DEFAULT_SHARDS: usize = 1;

/// Сколько спать, когда accept вернул WouldBlock
pub(crate) const ACCEPT_TICK: Duration = Duration::from_millis(50);

/// Таймаут чтения сессии: тик для проверки shutdown
pub(crate) use stream_core::SHUTDOWN_POLL_TICK as SESSION_READ_TICK;
pub(crate) const SESSION_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum StreamSpecError {
    #[error("stream name is empty")]
    EmptyName,
    #[error("invalid shard count {0:?}, expected a positive integer")]
    BadShardCount(String),
}

/// Стрим, создаваемый при старте: `NAME` или `NAME:SHARDS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StreamSpec {
    pub(crate) name: String,
    pub(crate) shards: usize,
}

impl FromStr for StreamSpec {
    type Err = StreamSpecError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (name, shards) = match raw.rsplit_once(':') {
            Some((name, count)) => {
                let shards = count
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .filter(|&n| n > 0)
                    .ok_or_else(|| StreamSpecError::BadShardCount(count.to_string()))?;
                (name, shards)
            }
            None => (raw, DEFAULT_SHARDS),
        };

        let name = name.trim();
        if name.is_empty() {
            return Err(StreamSpecError::EmptyName);
        }
        Ok(Self {
            name: name.to_string(),
            shards,
        })
    }
}

impl fmt::Display for StreamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.shards)
    }
}
