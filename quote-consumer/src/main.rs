//! Точка входа `quote-consumer`.
//!
//! Жизненный цикл:
//! - парсинг CLI и подключение к log-server
//! - обнаружение шардов и открытие курсоров
//! - опрос шардов (по кругу или по потоку на шард)
//! - корректная остановка по `Ctrl+C`

mod cli;
mod cursor;
mod poll;
mod sink;

use std::sync::{Arc, atomic::AtomicBool, atomic::Ordering};

use anyhow::Context;
use clap::Parser;
use log::info;
use stream_core::TcpLogClient;
use stream_core::symbols::parse_symbols_csv;

use crate::poll::PollSettings;
use crate::sink::LogSink;

fn main() -> anyhow::Result<()> {
    // Логи через RUST_LOG=info/trace
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

    let args = cli::Args::parse();
    args.validate()?;

    let addr = args.log_server_addr()?;
    let log = TcpLogClient::connect(addr).with_context(|| format!("connect to log-server {addr}"))?;

    let position = args.starting_position();
    info!(
        "Starting quote-consumer: log_server={}, stream={}, position={position}, limit={}, concurrent={}",
        log.addr(),
        args.stream,
        args.limit,
        args.concurrent
    );

    let cursors = cursor::discover(&log, &args.stream, position)?;

    let settings = PollSettings {
        limit: usize::try_from(args.limit)?,
        interval: args.interval(),
        max_passes: args.max_passes,
    };
    let mut sink = LogSink::with_symbols(args.symbols.as_deref().map(parse_symbols_csv));

    let report = if args.concurrent {
        poll::run_concurrent(&log, cursors, &settings, &mut sink, &shutdown)?
    } else {
        poll::run_round_robin(&log, cursors, &settings, &mut sink, &shutdown)?
    };

    info!(
        "quote-consumer finished: {report:?}, emitted={}, filtered={}",
        sink.emitted, sink.filtered
    );
    Ok(())
}
