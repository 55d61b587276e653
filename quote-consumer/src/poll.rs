use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender};
use log::{debug, info, warn};
use stream_core::codec::decode;
use stream_core::pause::pause;
use stream_core::{
    ConsumedRecord, LogService, LogServiceError, PipelineError, SHUTDOWN_POLL_TICK,
};

use crate::cursor::ShardCursor;
use crate::sink::{Delivery, EventSink};

/// Ёмкость канала воркеры → sink в конкурентном режиме
const DELIVERY_CHANNEL_CAP: usize = 1024;

#[derive(Debug, Clone)]
pub(crate) struct PollSettings {
    /// Записей за один get_records
    pub(crate) limit: usize,
    /// Пауза после полного прохода по шардам
    pub(crate) interval: Duration,
    /// Для тестов и разовых прогонов
    pub(crate) max_passes: Option<u64>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct PollReport {
    pub(crate) passes: u64,
    /// Вызовов get_records
    pub(crate) polls: u64,
    pub(crate) delivered: u64,
    pub(crate) malformed: u64,
}

enum Decoded {
    Event(Delivery),
    Malformed,
}

fn decode_record(shard_id: &str, rec: ConsumedRecord) -> Decoded {
    match decode(&rec.payload) {
        Ok(event) => Decoded::Event(Delivery {
            shard_id: shard_id.to_string(),
            sequence_number: rec.sequence_number,
            partition_key: rec.partition_key,
            event,
        }),
        Err(e) => {
            warn!(
                "action=skip_record shard={shard_id} seq={} key={} reason={e}",
                rec.sequence_number, rec.partition_key
            );
            Decoded::Malformed
        }
    }
}

/// Один get_records по курсору; токен заменяется даже при пустом ответе.
fn poll_shard<L: LogService + ?Sized>(
    log: &L,
    cursor: &mut ShardCursor,
    limit: usize,
) -> Result<Vec<Decoded>, PipelineError> {
    let Some(token) = cursor.token() else {
        return Ok(Vec::new());
    };

    let out = log
        .get_records(token, limit)
        .map_err(PipelineError::TransportFailure)?;
    debug!("shard={} records={}", cursor.shard_id, out.records.len());

    let decoded = out
        .records
        .into_iter()
        .map(|rec| decode_record(&cursor.shard_id, rec))
        .collect();
    cursor.advance(out.next_iterator);
    Ok(decoded)
}

/// Один проход: каждый живой курсор опрашивается ровно раз, по порядку.
pub(crate) fn poll_pass<L, S>(
    log: &L,
    cursors: &mut [ShardCursor],
    limit: usize,
    sink: &mut S,
    report: &mut PollReport,
) -> Result<(), PipelineError>
where
    L: LogService + ?Sized,
    S: EventSink + ?Sized,
{
    for cursor in cursors.iter_mut().filter(|c| !c.is_retired()) {
        let decoded = poll_shard(log, cursor, limit)?;
        report.polls += 1;
        for d in decoded {
            match d {
                Decoded::Event(delivery) => {
                    sink.emit(delivery);
                    report.delivered += 1;
                }
                Decoded::Malformed => report.malformed += 1,
            }
        }
    }
    report.passes += 1;
    Ok(())
}

/// Однопоточный round-robin до `shutdown`, `max_passes` или закрытия всех шардов.
pub(crate) fn run_round_robin<L, S>(
    log: &L,
    mut cursors: Vec<ShardCursor>,
    settings: &PollSettings,
    sink: &mut S,
    shutdown: &AtomicBool,
) -> Result<PollReport, PipelineError>
where
    L: LogService + ?Sized,
    S: EventSink + ?Sized,
{
    let mut report = PollReport::default();

    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("shutting down poll loop");
            break;
        }
        if settings.max_passes.is_some_and(|max| report.passes >= max) {
            break;
        }
        if cursors.iter().all(ShardCursor::is_retired) {
            info!("all shards closed");
            break;
        }

        poll_pass(log, &mut cursors, settings.limit, sink, &mut report)?;

        if settings.max_passes.is_some_and(|max| report.passes >= max) {
            break;
        }
        if !pause(settings.interval, shutdown) {
            break;
        }
    }

    Ok(report)
}

/// Поднимает `halt`, если воркер уходит паникой: остальные шарды тоже встают.
struct HaltOnPanic<'a>(&'a AtomicBool);

impl Drop for HaltOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.store(true, Ordering::Relaxed);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

// Воркер владеет своим курсором: чтения и смена токена шарда идут строго по очереди
fn shard_worker<L: LogService + ?Sized>(
    log: &L,
    mut cursor: ShardCursor,
    settings: &PollSettings,
    tx: Sender<Decoded>,
    halt: &AtomicBool,
) -> Result<u64, PipelineError> {
    let mut polls = 0u64;

    while !halt.load(Ordering::Relaxed) && !cursor.is_retired() {
        if settings.max_passes.is_some_and(|max| polls >= max) {
            break;
        }

        let decoded = poll_shard(log, &mut cursor, settings.limit)?;
        polls += 1;
        for d in decoded {
            if tx.send(d).is_err() {
                // приёмник ушёл
                return Ok(polls);
            }
        }

        if settings.max_passes.is_some_and(|max| polls >= max) {
            break;
        }
        if !pause(settings.interval, halt) {
            break;
        }
    }

    Ok(polls)
}

/// По потоку на шард; события идут в `sink` на вызывающем потоке.
///
/// Ошибка любого воркера останавливает остальных и возвращается наружу.
pub(crate) fn run_concurrent<L, S>(
    log: &L,
    cursors: Vec<ShardCursor>,
    settings: &PollSettings,
    sink: &mut S,
    shutdown: &AtomicBool,
) -> Result<PollReport, PipelineError>
where
    L: LogService + Sync + ?Sized,
    S: EventSink + ?Sized,
{
    let (tx, rx) = crossbeam_channel::bounded::<Decoded>(DELIVERY_CHANNEL_CAP);
    let halt = AtomicBool::new(false);
    let mut report = PollReport::default();

    let results: Vec<Result<u64, PipelineError>> = thread::scope(|s| {
        let handles: Vec<_> = cursors
            .into_iter()
            .map(|cursor| {
                let tx = tx.clone();
                let halt = &halt;
                let shard_id = cursor.shard_id.clone();
                let h = s.spawn(move || {
                    let _guard = HaltOnPanic(halt);
                    let res = shard_worker(log, cursor, settings, tx, halt);
                    if res.is_err() {
                        halt.store(true, Ordering::Relaxed);
                    }
                    res
                });
                debug!("started worker for {shard_id}");
                (shard_id, h)
            })
            .collect();
        // иначе recv не увидит Disconnected
        drop(tx);

        loop {
            if shutdown.load(Ordering::Relaxed) && !halt.load(Ordering::Relaxed) {
                info!("shutting down shard workers");
                halt.store(true, Ordering::Relaxed);
            }
            match rx.recv_timeout(SHUTDOWN_POLL_TICK) {
                Ok(Decoded::Event(delivery)) => {
                    sink.emit(delivery);
                    report.delivered += 1;
                }
                Ok(Decoded::Malformed) => report.malformed += 1,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        handles
            .into_iter()
            .map(|(shard_id, h)| match h.join() {
                Ok(res) => res,
                Err(panic) => {
                    let msg = panic_message(&*panic);
                    warn!("shard worker for {shard_id} panicked: {msg}");
                    Err(PipelineError::TransportFailure(LogServiceError::Transport(
                        format!("shard worker for {shard_id} panicked: {msg}"),
                    )))
                }
            })
            .collect()
    });

    for res in results {
        let polls = res?;
        report.polls += polls;
        report.passes = report.passes.max(polls);
    }
    Ok(report)
}
