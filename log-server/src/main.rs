//! Точка входа `log-server`.
//!
//! Жизненный цикл:
//! - парсинг CLI, создание стримов из `--stream`
//! - accept loop, по потоку на соединение
//! - корректная остановка по `Ctrl+C`

mod cli;
mod config;
mod session;
mod tcp;

use std::sync::{Arc, atomic::AtomicBool, atomic::Ordering};

use anyhow::Context;
use clap::Parser;
use log::info;
use stream_core::{LogService, MemoryLog};

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

    let args = cli::Args::parse();

    let log = match args.shard_write_limit {
        Some(limit) => MemoryLog::with_shard_write_limit(usize::try_from(limit)?),
        None => MemoryLog::new(),
    };
    for spec in &args.streams {
        log.create_stream(&spec.name, spec.shards)
            .with_context(|| format!("create stream {spec}"))?;
        info!("action=create_stream stream={} shards={}", spec.name, spec.shards);
    }

    let listener = tcp::bind(args.bind)?;
    info!(
        "Starting log-server: bind={}, streams={}, shard_write_limit={:?}",
        args.bind,
        args.streams.len(),
        args.shard_write_limit
    );

    tcp::run_tcp_listener(listener, Arc::new(log), shutdown)?;

    Ok(())
}
