use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use log::info;
use serde::Deserialize;
use stream_core::codec::to_stream_records;
use stream_core::pause::pause;
use stream_core::{
    HistoryPoint, LogService, PipelineError, QuoteRecord, StreamEvent, StreamRecord,
};

use crate::publisher::BatchPublisher;

/// Элемент записанного файла: событие с тегом `kind`, голая котировка
/// или голая точка истории.
#[derive(Deserialize)]
#[serde(untagged)]
enum RecordedItem {
    Event(StreamEvent),
    Quote(QuoteRecord),
    History(HistoryPoint),
}

impl From<RecordedItem> for StreamEvent {
    fn from(item: RecordedItem) -> Self {
        match item {
            RecordedItem::Event(ev) => ev,
            RecordedItem::Quote(q) => StreamEvent::Quote(q),
            RecordedItem::History(h) => StreamEvent::History(h),
        }
    }
}

/// Читает JSON-массив или JSON Lines и сортирует по `market_time`.
/// Элементы могут быть с тегом `kind` или без него.
pub(crate) fn load_recorded(path: &Path) -> anyhow::Result<Vec<StreamEvent>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read replay file {}", path.display()))?;
    parse_recorded(&raw).with_context(|| format!("parse replay file {}", path.display()))
}

fn parse_recorded(raw: &str) -> anyhow::Result<Vec<StreamEvent>> {
    let mut events: Vec<StreamEvent> = if raw.trim_start().starts_with('[') {
        serde_json::from_str::<Vec<RecordedItem>>(raw)?
            .into_iter()
            .map(StreamEvent::from)
            .collect()
    } else {
        raw.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .enumerate()
            .map(|(i, l)| {
                serde_json::from_str::<RecordedItem>(l)
                    .map(StreamEvent::from)
                    .with_context(|| format!("line {}", i + 1))
            })
            .collect::<anyhow::Result<_>>()?
    };

    // стабильная сортировка: одинаковое время сохраняет порядок файла
    events.sort_by_key(StreamEvent::market_time);
    Ok(events)
}

#[derive(Debug, Clone)]
pub(crate) struct ReplaySettings {
    pub(crate) stream: String,
    pub(crate) batch_size: usize,
    pub(crate) pause: Duration,
    /// `None`: до Ctrl+C
    pub(crate) max_batches: Option<usize>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ReplayReport {
    pub(crate) batches: usize,
    pub(crate) published: usize,
    pub(crate) failed: usize,
}

/// Публикует записи по кругу пачками по `batch_size` с паузой после каждой.
pub(crate) fn replay<L: LogService + ?Sized>(
    publisher: &BatchPublisher<'_, L>,
    events: &[StreamEvent],
    settings: &ReplaySettings,
    shutdown: &AtomicBool,
) -> Result<ReplayReport, PipelineError> {
    if events.is_empty() {
        return Err(PipelineError::ConfigUnavailable("nothing to replay".into()));
    }

    let records = to_stream_records(events)?;
    let batch_size = settings.batch_size.max(1);
    let mut cycle = records.iter().cycle();
    let mut report = ReplayReport::default();

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        if settings.max_batches.is_some_and(|max| report.batches >= max) {
            break;
        }

        let batch: Vec<StreamRecord> = cycle.by_ref().take(batch_size).cloned().collect();
        let result = publisher.publish(&settings.stream, &batch, batch_size)?;
        report.batches += 1;
        report.published += result.succeeded;
        report.failed += result.failed.len();

        let keys: Vec<&str> = batch.iter().map(|r| r.partition_key.as_str()).collect();
        info!(
            "action=replay_batch n={} keys={}",
            report.batches,
            keys.join(",")
        );

        if !pause(settings.pause, shutdown) {
            break;
        }
    }

    Ok(report)
}
