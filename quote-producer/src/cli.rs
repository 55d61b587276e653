use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use crate::bootstrap::SymbolSource;
use crate::config;
use crate::fetch::FetchAction;
use crate::market_data::{ChartInterval, ChartRange};
use crate::retry::{Backoff, RetryPolicy};
use crate::transform::IncompletePolicy;

/// Quote Producer - забирает котировки из market-data API и пишет их в стрим.
///
/// `run` запускается планировщиком: проверка торгового окна, затем несколько
/// итераций fetch → publish. `fetch` и `replay` для ручной работы, `synth`
/// гоняет конвейер на сгенерированных котировках без ключа API.
#[derive(Parser, Debug, Clone)]
#[command(name = "quote-producer", version, about)]
pub(crate) struct Args {
    /// Адрес log-server, например 127.0.0.1:4567
    #[arg(long, global = true, env = "LOG_SERVER_ADDR", default_value = config::DEFAULT_LOG_SERVER)]
    pub(crate) log_server: String,

    /// Имя стрима
    #[arg(long, global = true, env = "STREAM_NAME", default_value = config::DEFAULT_STREAM)]
    pub(crate) stream: String,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum Command {
    /// Один запуск по расписанию
    Run(RunArgs),
    /// Разовый запрос котировок / истории / сводки
    Fetch(FetchArgs),
    /// Переотправка записанного файла по кругу
    Replay(ReplayArgs),
    /// Синтетические котировки без market-data API
    Synth(SynthArgs),
}

/// Источник символов; приоритет: --symbols, --symbols-file, --symbols-url
#[derive(clap::Args, Debug, Clone)]
pub(crate) struct SymbolArgs {
    /// Список строкой: "MSFT,AMZN"
    #[arg(long)]
    pub(crate) symbols: Option<String>,

    /// Файл: {"symbols": [...]} или watchlist (строки, запятые, # комментарии)
    #[arg(long)]
    pub(crate) symbols_file: Option<PathBuf>,

    /// URL JSON-документа {"symbols": [...]}
    #[arg(long, env = "SYMBOLS_URL")]
    pub(crate) symbols_url: Option<String>,
}

impl SymbolArgs {
    pub(crate) fn source(&self) -> Result<SymbolSource> {
        if let Some(raw) = &self.symbols {
            return Ok(SymbolSource::Inline(raw.clone()));
        }
        if let Some(path) = &self.symbols_file {
            return Ok(SymbolSource::File(path.clone()));
        }
        if let Some(url) = &self.symbols_url {
            return Ok(SymbolSource::Url(url.clone()));
        }
        bail!("one of --symbols, --symbols-file, --symbols-url (or SYMBOLS_URL) is required")
    }
}

/// Повторы put_records
#[derive(clap::Args, Debug, Clone)]
pub(crate) struct RetryArgs {
    /// Попыток на пачку, включая первую
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    pub(crate) max_attempts: u32,

    #[arg(long, value_enum, default_value_t = Backoff::Exponential)]
    pub(crate) backoff: Backoff,

    /// Базовая задержка между попытками, мс
    #[arg(long, default_value_t = 200)]
    pub(crate) retry_base_ms: u64,

    /// Потолок задержки, мс
    #[arg(long, default_value_t = 5_000)]
    pub(crate) retry_max_ms: u64,
}

impl RetryArgs {
    pub(crate) fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            base_delay: std::time::Duration::from_millis(self.retry_base_ms),
            max_delay: std::time::Duration::from_millis(self.retry_max_ms),
            ..RetryPolicy::default()
        }
    }
}

#[derive(clap::Args, Debug, Clone)]
pub(crate) struct RunArgs {
    #[command(flatten)]
    pub(crate) symbols: SymbolArgs,

    #[command(flatten)]
    pub(crate) retry: RetryArgs,

    /// Итераций fetch → publish
    #[arg(long, default_value_t = config::DEFAULT_ITERATIONS)]
    pub(crate) iterations: u32,

    /// Пауза между итерациями, секунды
    #[arg(long, default_value_t = config::DEFAULT_PAUSE.as_secs())]
    pub(crate) pause_secs: u64,

    /// Записей в одном put_records (1..=500)
    #[arg(long, default_value_t = stream_core::MAX_PUT_RECORDS)]
    pub(crate) batch_size: usize,

    /// Открытие торгового окна, UTC
    #[arg(long, default_value = config::DEFAULT_MARKET_OPEN)]
    pub(crate) market_open: String,

    /// Закрытие торгового окна, UTC
    #[arg(long, default_value = config::DEFAULT_MARKET_CLOSE)]
    pub(crate) market_close: String,

    /// Работать вне торгового окна
    #[arg(long)]
    pub(crate) ignore_market_hours: bool,

    #[arg(long, value_enum, default_value_t = IncompletePolicy::Abort)]
    pub(crate) on_incomplete: IncompletePolicy,

    /// Бюджет времени на весь запуск, секунды
    #[arg(long)]
    pub(crate) time_budget_secs: Option<u64>,

    /// Создать стрим с этим числом шардов, если его нет
    #[arg(long)]
    pub(crate) create_shards: Option<usize>,
}

#[derive(clap::Args, Debug, Clone)]
pub(crate) struct FetchArgs {
    #[arg(long, value_enum, default_value_t = FetchAction::Quotes)]
    pub(crate) action: FetchAction,

    #[command(flatten)]
    pub(crate) symbols: SymbolArgs,

    #[arg(long, value_enum, default_value_t = ChartInterval::FiveMinutes)]
    pub(crate) interval: ChartInterval,

    #[arg(long, value_enum, default_value_t = ChartRange::Day)]
    pub(crate) range: ChartRange,

    #[arg(long, value_enum, default_value_t = IncompletePolicy::Abort)]
    pub(crate) on_incomplete: IncompletePolicy,

    /// Кроме печати, опубликовать события в стрим
    #[arg(long)]
    pub(crate) publish: bool,

    #[command(flatten)]
    pub(crate) retry: RetryArgs,
}

#[derive(clap::Args, Debug, Clone)]
pub(crate) struct ReplayArgs {
    /// JSON-массив котировок или JSON Lines событий
    #[arg(long)]
    pub(crate) file: PathBuf,

    #[arg(long, default_value_t = 10)]
    pub(crate) batch_size: usize,

    /// Пауза после каждой пачки, секунды (дробные допустимы)
    #[arg(long, default_value_t = 1.0)]
    pub(crate) pause_secs: f64,

    /// Остановиться после N пачек
    #[arg(long)]
    pub(crate) max_batches: Option<usize>,

    #[command(flatten)]
    pub(crate) retry: RetryArgs,
}

#[derive(clap::Args, Debug, Clone)]
pub(crate) struct SynthArgs {
    /// Символы через запятую
    #[arg(long, default_value = config::DEFAULT_SYNTH_SYMBOLS)]
    pub(crate) symbols: String,

    /// Записей в одном put_records
    #[arg(long, default_value_t = config::DEFAULT_SYNTH_BATCH)]
    pub(crate) batch_size: usize,

    /// Пауза между тиками, мс
    #[arg(long, default_value_t = config::DEFAULT_SYNTH_TICK.as_millis() as u64)]
    pub(crate) tick_ms: u64,

    /// Остановиться после N тиков
    #[arg(long)]
    pub(crate) max_ticks: Option<u64>,

    /// Seed генератора; без него каждый прогон свой
    #[arg(long)]
    pub(crate) seed: Option<u64>,

    /// Создать стрим с этим числом шардов, если его нет
    #[arg(long)]
    pub(crate) create_shards: Option<usize>,

    #[command(flatten)]
    pub(crate) retry: RetryArgs,
}

impl ReplayArgs {
    pub(crate) fn pause(&self) -> Result<std::time::Duration> {
        std::time::Duration::try_from_secs_f64(self.pause_secs)
            .with_context(|| format!("--pause-secs must be a non-negative number (got: {})", self.pause_secs))
    }
}

impl Args {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults() {
        let args = Args::try_parse_from(["quote-producer", "run", "--symbols", "MSFT"]).unwrap();
        let Command::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.iterations, 3);
        assert_eq!(run.pause_secs, 10);
        assert_eq!(run.batch_size, 500);
        assert_eq!(run.on_incomplete, IncompletePolicy::Abort);
        assert_eq!(run.retry.policy().max_attempts, 3);
        assert_eq!(
            run.symbols.source().unwrap(),
            SymbolSource::Inline("MSFT".into())
        );
    }

    #[test]
    fn global_stream_flag_after_subcommand() {
        let args = Args::try_parse_from([
            "quote-producer",
            "replay",
            "--file",
            "stocks.json",
            "--stream",
            "replayed",
        ])
        .unwrap();
        assert_eq!(args.stream, "replayed");
    }

    #[test]
    fn fetch_history_parses_interval_and_range() {
        let args = Args::try_parse_from([
            "quote-producer",
            "fetch",
            "--action",
            "history",
            "--symbols",
            "MSFT",
            "--interval",
            "1wk",
            "--range",
            "6mo",
        ])
        .unwrap();
        let Command::Fetch(f) = args.command else {
            panic!("expected fetch");
        };
        assert_eq!(f.action, FetchAction::History);
        assert_eq!(f.interval, ChartInterval::Week);
        assert_eq!(f.range, ChartRange::SixMonths);
    }

    #[test]
    fn zero_attempts_rejected() {
        assert!(
            Args::try_parse_from(["quote-producer", "run", "--symbols", "A", "--max-attempts", "0"])
                .is_err()
        );
    }

    #[test]
    fn negative_replay_pause_rejected() {
        let args = Args::try_parse_from([
            "quote-producer",
            "replay",
            "--file",
            "x.json",
            "--pause-secs=-1",
        ])
        .unwrap();
        let Command::Replay(r) = args.command else {
            panic!("expected replay");
        };
        assert!(r.pause().is_err());
    }

    #[test]
    fn synth_defaults_and_seed() {
        let args = Args::try_parse_from(["quote-producer", "synth", "--seed", "7", "--max-ticks", "100"])
            .unwrap();
        let Command::Synth(s) = args.command else {
            panic!("expected synth");
        };
        assert_eq!(s.symbols, "MSFT,AMZN");
        assert_eq!(s.batch_size, 20);
        assert_eq!(s.tick_ms, 250);
        assert_eq!(s.seed, Some(7));
        assert_eq!(s.max_ticks, Some(100));
    }

    #[test]
    fn log_server_must_have_port() {
        let args = Args::try_parse_from([
            "quote-producer",
            "--log-server",
            "localhost",
            "run",
            "--symbols",
            "A",
        ])
        .unwrap();
        assert!(args.log_server_addr().is_err());
    }
}
