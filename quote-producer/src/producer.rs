use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::NaiveTime;
use log::{debug, error, info, warn};
use stream_core::codec::to_stream_records;
use stream_core::pause::pause;
use stream_core::{LogService, PipelineError, StreamEvent};

use crate::gate::TradingWindow;
use crate::market_data::QuoteSource;
use crate::publisher::BatchPublisher;
use crate::transform::{IncompletePolicy, transform_quotes};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProducerState {
    Idle,
    Gated,
    Fetching,
    Transforming,
    Publishing,
    Pausing,
    Done,
}

#[derive(Debug, Clone)]
pub(crate) struct ProducerSettings {
    pub(crate) stream: String,
    pub(crate) symbols: Vec<String>,
    pub(crate) window: TradingWindow,
    /// Запуск вне окна (ручной прогон)
    pub(crate) ignore_market_hours: bool,
    pub(crate) iterations: u32,
    pub(crate) pause: Duration,
    pub(crate) max_batch_size: usize,
    pub(crate) on_incomplete: IncompletePolicy,
}

/// Итог одного запуска.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct ProducerReport {
    pub(crate) gated: bool,
    /// Завершённые итерации fetch → publish
    pub(crate) iterations: u32,
    pub(crate) published: usize,
    pub(crate) failed: usize,
    pub(crate) skipped_symbols: Vec<String>,
    pub(crate) cancelled: bool,
}

/// Один запуск по расписанию: гейт, затем N итераций с паузой между ними.
pub(crate) struct ProducerLoop<'a, S: QuoteSource + ?Sized, L: LogService + ?Sized> {
    source: &'a S,
    publisher: BatchPublisher<'a, L>,
    settings: ProducerSettings,
    shutdown: &'a AtomicBool,
    state: ProducerState,
}

impl<'a, S: QuoteSource + ?Sized, L: LogService + ?Sized> ProducerLoop<'a, S, L> {
    pub(crate) fn new(
        source: &'a S,
        publisher: BatchPublisher<'a, L>,
        settings: ProducerSettings,
        shutdown: &'a AtomicBool,
    ) -> Self {
        Self {
            source,
            publisher,
            settings,
            shutdown,
            state: ProducerState::Idle,
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> ProducerState {
        self.state
    }

    fn enter(&mut self, next: ProducerState) {
        debug!("producer state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Ошибки fetch/transform/publish завершают запуск сразу.
    /// Частичный отказ публикации только логируется.
    pub(crate) fn run(&mut self, now: NaiveTime) -> Result<ProducerReport, PipelineError> {
        let mut report = ProducerReport::default();

        if !self.settings.ignore_market_hours && !self.settings.window.is_open(now) {
            self.enter(ProducerState::Gated);
            info!(
                "action=market_closed now={} window={}",
                now.format("%H:%M:%S"),
                self.settings.window
            );
            report.gated = true;
            return Ok(report);
        }

        for iteration in 1..=self.settings.iterations {
            if iteration > 1 {
                self.enter(ProducerState::Pausing);
                if !pause(self.settings.pause, self.shutdown) {
                    report.cancelled = true;
                    break;
                }
            }
            if self.shutdown.load(Ordering::Relaxed) {
                report.cancelled = true;
                break;
            }

            self.iterate(iteration, &mut report).inspect_err(|e| {
                error!("action=producer_failed iteration={iteration} error={e}");
            })?;
            report.iterations = iteration;
        }

        self.enter(ProducerState::Done);
        info!(
            "action=producer_done stream={} iterations={} published={} failed={} skipped={} cancelled={}",
            self.settings.stream,
            report.iterations,
            report.published,
            report.failed,
            report.skipped_symbols.len(),
            report.cancelled
        );
        Ok(report)
    }

    fn iterate(&mut self, iteration: u32, report: &mut ProducerReport) -> Result<(), PipelineError> {
        self.enter(ProducerState::Fetching);
        let raws = self.source.fetch_quotes(&self.settings.symbols)?;
        info!(
            "action=fetch_quotes iteration={iteration} symbols={} results={}",
            self.settings.symbols.len(),
            raws.len()
        );

        self.enter(ProducerState::Transforming);
        let outcome = transform_quotes(&raws, self.settings.on_incomplete)?;
        for rejected in &outcome.rejected {
            warn!("action=skip_symbol reason={rejected}");
            if let PipelineError::IncompleteQuote { symbol, .. } = rejected {
                report.skipped_symbols.push(symbol.clone());
            }
        }

        let events: Vec<StreamEvent> = outcome.records.into_iter().map(StreamEvent::Quote).collect();
        let records = to_stream_records(&events)?;

        self.enter(ProducerState::Publishing);
        let result = self
            .publisher
            .publish(&self.settings.stream, &records, self.settings.max_batch_size)?;
        report.published += result.succeeded;
        report.failed += result.failed.len();

        if let Some(partial) = result.partial_failure() {
            warn!("action=partial_publish iteration={iteration} {partial}");
        }
        Ok(())
    }
}
