//! Точка входа `quote-producer`.
//!
//! Жизненный цикл `run`:
//! - конфиг market-data API из окружения и список символов
//! - подключение к log-server
//! - проверка торгового окна и итерации fetch → transform → publish
//! - корректная остановка по `Ctrl+C`
//!
//! `synth` пишет в стрим сгенерированные котировки, ключ API не нужен.

mod bootstrap;
mod cli;
mod config;
mod fetch;
mod gate;
mod market_data;
mod producer;
mod publisher;
mod replay;
mod retry;
mod synth;
mod transform;

use std::io;
use std::sync::{Arc, atomic::AtomicBool, atomic::Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use chrono::Utc;
use clap::Parser;
use log::{info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use stream_core::codec::to_stream_records;
use stream_core::symbols::parse_symbols_csv;
use stream_core::{LogService, LogServiceError, TcpLogClient};

use crate::cli::{Args, Command, FetchArgs, ReplayArgs, RunArgs, SynthArgs};
use crate::config::MarketDataConfig;
use crate::fetch::{FetchOutput, FetchRequest};
use crate::market_data::MarketDataClient;
use crate::producer::{ProducerLoop, ProducerSettings};
use crate::publisher::BatchPublisher;
use crate::replay::ReplaySettings;
use crate::synth::{QuoteSynth, SynthSettings};

fn main() -> anyhow::Result<()> {
    // Логи через RUST_LOG=info/debug
    env_logger::init();

    let shutdown = Arc::new(AtomicBool::new(false));

    // Ctrl+C => shutdown=true
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::Relaxed);
            info!("shutting down...");
        })?;
    }

    let args = Args::parse();

    match &args.command {
        Command::Run(run) => run_scheduled(&args, run, &shutdown),
        Command::Fetch(f) => run_fetch(&args, f, &shutdown),
        Command::Replay(r) => run_replay(&args, r, &shutdown),
        Command::Synth(s) => run_synthetic(&args, s, &shutdown),
    }
}

fn connect_log(args: &Args) -> anyhow::Result<TcpLogClient> {
    let addr = args.log_server_addr()?;
    TcpLogClient::connect(addr).with_context(|| format!("connect to log-server {addr}"))
}

/// Создаёт стрим, если его ещё нет
fn ensure_stream(log: &impl LogService, stream: &str, shards: usize) -> anyhow::Result<()> {
    match log.describe_stream(stream) {
        Ok(desc) => {
            info!("stream {stream} exists with {} shards", desc.shard_count);
            Ok(())
        }
        Err(LogServiceError::StreamNotFound(_)) => {
            log.create_stream(stream, shards)
                .with_context(|| format!("create stream {stream}"))?;
            info!("action=create_stream stream={stream} shards={shards}");
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("describe stream {stream}")),
    }
}

fn run_scheduled(args: &Args, run: &RunArgs, shutdown: &AtomicBool) -> anyhow::Result<()> {
    let started = Instant::now();
    let deadline = run.time_budget_secs.map(|s| started + Duration::from_secs(s));

    let market = MarketDataClient::new(MarketDataConfig::from_env()?)?;
    let symbols = bootstrap::load_symbols(&run.symbols.source()?, market.http())?;
    let window = gate::TradingWindow::parse(&run.market_open, &run.market_close)?;

    let log = connect_log(args)?;
    if let Some(shards) = run.create_shards {
        ensure_stream(&log, &args.stream, shards)?;
    }

    info!(
        "Starting quote-producer run: stream={}, window={}, iterations={}, symbols={}",
        args.stream,
        window,
        run.iterations,
        symbols.join(",")
    );

    let publisher = BatchPublisher::new(&log, run.retry.policy())
        .with_deadline(deadline)
        .with_shutdown(shutdown);
    let settings = ProducerSettings {
        stream: args.stream.clone(),
        symbols,
        window,
        ignore_market_hours: run.ignore_market_hours,
        iterations: run.iterations,
        pause: Duration::from_secs(run.pause_secs),
        max_batch_size: run.batch_size,
        on_incomplete: run.on_incomplete,
    };

    let report = ProducerLoop::new(&market, publisher, settings, shutdown).run(Utc::now().time())?;

    info!(
        "quote-producer run finished in {:?}: {report:?}",
        started.elapsed()
    );
    Ok(())
}

fn run_fetch(args: &Args, f: &FetchArgs, shutdown: &AtomicBool) -> anyhow::Result<()> {
    let market = MarketDataClient::new(MarketDataConfig::from_env()?)?;
    let symbols = bootstrap::load_symbols(&f.symbols.source()?, market.http())?;

    let req = FetchRequest {
        action: f.action,
        symbols,
        interval: f.interval,
        range: f.range,
        on_incomplete: f.on_incomplete,
    };
    let output = fetch::fetch(&market, &req)?;
    output.write_to(&mut io::stdout().lock())?;

    if !f.publish {
        return Ok(());
    }
    let FetchOutput::Events(events) = &output else {
        warn!("--publish ignored: {:?} output is not a stream event", f.action);
        return Ok(());
    };

    let log = connect_log(args)?;
    let records = to_stream_records(events.iter().map(|f| &f.event))?;
    let result = BatchPublisher::new(&log, f.retry.policy())
        .with_shutdown(shutdown)
        .publish(&args.stream, &records, stream_core::MAX_PUT_RECORDS)?;

    if let Some(partial) = result.partial_failure() {
        warn!("{partial}");
    }
    Ok(())
}

fn run_replay(args: &Args, r: &ReplayArgs, shutdown: &AtomicBool) -> anyhow::Result<()> {
    let events = replay::load_recorded(&r.file)?;
    let log = connect_log(args)?;

    info!(
        "Starting replay: file={}, records={}, stream={}, batch_size={}",
        r.file.display(),
        events.len(),
        args.stream,
        r.batch_size
    );

    let settings = ReplaySettings {
        stream: args.stream.clone(),
        batch_size: r.batch_size,
        pause: r.pause()?,
        max_batches: r.max_batches,
    };
    let publisher = BatchPublisher::new(&log, r.retry.policy()).with_shutdown(shutdown);
    let report = replay::replay(&publisher, &events, &settings, shutdown)?;

    info!("replay finished: {report:?}");
    Ok(())
}

fn run_synthetic(args: &Args, s: &SynthArgs, shutdown: &AtomicBool) -> anyhow::Result<()> {
    let symbols = parse_symbols_csv(&s.symbols);
    if symbols.is_empty() {
        bail!("--symbols must name at least one symbol");
    }
    let rng = match s.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let mut synth = QuoteSynth::new(&symbols, rng);

    let log = connect_log(args)?;
    if let Some(shards) = s.create_shards {
        ensure_stream(&log, &args.stream, shards)?;
    }

    info!(
        "Starting synth: stream={}, symbols={}, batch_size={}, tick_ms={}, seed={:?}",
        args.stream,
        symbols.join(","),
        s.batch_size,
        s.tick_ms,
        s.seed
    );

    let settings = SynthSettings {
        stream: args.stream.clone(),
        batch_size: s.batch_size,
        tick: Duration::from_millis(s.tick_ms),
        max_ticks: s.max_ticks,
    };
    let publisher = BatchPublisher::new(&log, s.retry.policy()).with_shutdown(shutdown);
    let report = synth::run_synth(&mut synth, &publisher, &settings, || Utc::now().timestamp(), shutdown)?;

    info!("synth finished: {report:?}");
    Ok(())
}
