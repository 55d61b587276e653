use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use stream_core::{SequenceNumber, StartingPosition};

pub(crate) const DEFAULT_LOG_SERVER: &str = "127.0.0.1:4567";
pub(crate) const DEFAULT_STREAM: &str = "stocks-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum Position {
    TrimHorizon,
    Latest,
    AtSequenceNumber,
}

/// Quote Consumer - читает все шарды стрима и логирует декодированные события.
///
/// По умолчанию один поток опрашивает шарды по кругу; `--concurrent` даёт
/// по потоку на шард.
#[derive(Parser, Debug, Clone)]
#[command(name = "quote-consumer", version, about)]
pub(crate) struct Args {
    /// Адрес log-server, например 127.0.0.1:4567
    #[arg(long, env = "LOG_SERVER_ADDR", default_value = DEFAULT_LOG_SERVER)]
    pub(crate) log_server: String,

    #[arg(long, env = "STREAM_NAME", default_value = DEFAULT_STREAM)]
    pub(crate) stream: String,

    /// С какой позиции открывать итераторы шардов
    #[arg(long, value_enum, default_value_t = Position::AtSequenceNumber)]
    pub(crate) position: Position,

    /// Для at-sequence-number; без него стартовый номер каждого шарда
    #[arg(long)]
    pub(crate) sequence_number: Option<u64>,

    /// Записей за один get_records
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..=10_000))]
    pub(crate) limit: u64,

    /// Пауза после прохода по всем шардам, мс
    #[arg(long, default_value_t = 3_000)]
    pub(crate) interval_ms: u64,

    /// Остановиться после N проходов
    #[arg(long)]
    pub(crate) max_passes: Option<u64>,

    /// По потоку на шард
    #[arg(long)]
    pub(crate) concurrent: bool,

    /// Логировать только эти символы: "MSFT,AMZN"
    #[arg(long)]
    pub(crate) symbols: Option<String>,
}

impl Args {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.sequence_number.is_some() && self.position != Position::AtSequenceNumber {
            bail!("--sequence-number only makes sense with --position at-sequence-number");
        }
        Ok(())
    }

    pub(crate) fn starting_position(&self) -> StartingPosition {
        match self.position {
            Position::TrimHorizon => StartingPosition::TrimHorizon,
            Position::Latest => StartingPosition::Latest,
            Position::AtSequenceNumber => {
                StartingPosition::AtSequenceNumber(self.sequence_number.map(SequenceNumber))
            }
        }
    }

    pub(crate) fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub(crate) fn log_server_addr(&self) -> Result<SocketAddr> {
        if !self.log_server.contains(':') {
            bail!("--log-server must look like HOST:PORT (got: {})", self.log_server);
        }
        self.log_server
            .to_socket_addrs()
            .with_context(|| format!("resolve {}", self.log_server))?
            .next()
            .with_context(|| format!("no addresses resolved for {}", self.log_server))
    }
}
