use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, info, warn};
use rand::Rng;
use stream_core::codec::to_stream_records;
use stream_core::pause::pause;
use stream_core::{LogService, PipelineError, QuoteRecord, StreamEvent};

use crate::publisher::BatchPublisher;

/// Насколько следующая цена может выйти за текущие low/high (0.02 = 2%)
const BAND_BUMP: f64 = 0.02;

/// Стартовые дневные диапазоны известных символов
const SEED_BANDS: [(&str, f64, f64); 2] = [("MSFT", 246.88, 249.40), ("AMZN", 3217.06, 3247.31)];

const SYNTH_QUOTE_SOURCE: &str = "Synthetic";

/// Дневной диапазон символа; только расширяется.
#[derive(Debug, Clone, PartialEq)]
struct Band {
    open: f64,
    low: f64,
    high: f64,
}

/// Котировки без market-data API.
///
/// Цена каждого тика равномерно случайна в `[low * 0.98, high * 1.02]`,
/// после чего low/high подтягиваются к ней.
pub(crate) struct QuoteSynth<R> {
    rng: R,
    bands: BTreeMap<String, Band>,
}

impl<R: Rng> QuoteSynth<R> {
    pub(crate) fn new(symbols: &[String], mut rng: R) -> Self {
        let bands = symbols
            .iter()
            .map(|symbol| {
                let (low, high) = SEED_BANDS
                    .iter()
                    .find(|(known, ..)| *known == symbol.as_str())
                    .map(|&(_, low, high)| (low, high))
                    .unwrap_or_else(|| {
                        let mid: f64 = rng.random_range(20.0..500.0);
                        (mid * 0.995, mid * 1.005)
                    });
                let band = Band {
                    open: (low + high) / 2.0,
                    low,
                    high,
                };
                (symbol.clone(), band)
            })
            .collect();

        Self { rng, bands }
    }

    /// `None`, если символ генератору не известен
    pub(crate) fn next_quote(&mut self, symbol: &str, market_time: i64) -> Option<QuoteRecord> {
        let band = self.bands.get_mut(symbol)?;

        let current = self
            .rng
            .random_range(band.low * (1.0 - BAND_BUMP)..=band.high * (1.0 + BAND_BUMP));
        band.low = band.low.min(current);
        band.high = band.high.max(current);

        Some(QuoteRecord {
            symbol: symbol.to_string(),
            short_name: symbol.to_string(),
            market_time,
            quote_source: SYNTH_QUOTE_SOURCE.to_string(),
            current,
            low_day: band.low,
            high_day: band.high,
            open: band.open,
            previous_close: band.open,
            low_52wk: band.low,
            high_52wk: band.high,
        })
    }

    /// По котировке на каждый символ, символы по алфавиту
    pub(crate) fn tick(&mut self, market_time: i64) -> Vec<QuoteRecord> {
        let symbols: Vec<String> = self.bands.keys().cloned().collect();
        symbols
            .iter()
            .filter_map(|s| self.next_quote(s, market_time))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SynthSettings {
    pub(crate) stream: String,
    /// Сколько записей копится до одного put_records
    pub(crate) batch_size: usize,
    /// Пауза между тиками
    pub(crate) tick: Duration,
    /// `None`: до Ctrl+C
    pub(crate) max_ticks: Option<u64>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct SynthReport {
    pub(crate) ticks: u64,
    pub(crate) batches: usize,
    pub(crate) published: usize,
    pub(crate) failed: usize,
}

/// Тикает генератором, копит котировки и публикует их пачками.
/// `clock` даёт `market_time` очередного тика.
pub(crate) fn run_synth<R, L>(
    synth: &mut QuoteSynth<R>,
    publisher: &BatchPublisher<'_, L>,
    settings: &SynthSettings,
    mut clock: impl FnMut() -> i64,
    shutdown: &AtomicBool,
) -> Result<SynthReport, PipelineError>
where
    R: Rng,
    L: LogService + ?Sized,
{
    let batch_size = settings.batch_size.max(1);
    let mut pending: Vec<StreamEvent> = Vec::with_capacity(batch_size);
    let mut report = SynthReport::default();

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        if settings.max_ticks.is_some_and(|max| report.ticks >= max) {
            break;
        }

        let market_time = clock();
        pending.extend(synth.tick(market_time).into_iter().map(StreamEvent::Quote));
        report.ticks += 1;
        debug!("tick {} market_time={market_time} pending={}", report.ticks, pending.len());

        if pending.len() >= batch_size {
            flush(publisher, &settings.stream, &mut pending, &mut report)?;
        }

        if settings.max_ticks.is_some_and(|max| report.ticks >= max) {
            break;
        }
        if !pause(settings.tick, shutdown) {
            break;
        }
    }

    if shutdown.load(Ordering::Relaxed) {
        if !pending.is_empty() {
            info!("dropping {} unsent synthetic quotes on shutdown", pending.len());
        }
    } else if !pending.is_empty() {
        flush(publisher, &settings.stream, &mut pending, &mut report)?;
    }

    Ok(report)
}

fn flush<L: LogService + ?Sized>(
    publisher: &BatchPublisher<'_, L>,
    stream: &str,
    pending: &mut Vec<StreamEvent>,
    report: &mut SynthReport,
) -> Result<(), PipelineError> {
    let records = to_stream_records(pending.iter())?;
    let result = publisher.publish(stream, &records, records.len())?;
    pending.clear();

    report.batches += 1;
    report.published += result.succeeded;
    report.failed += result.failed.len();
    info!(
        "action=synth_batch n={} records={} succeeded={}",
        report.batches,
        records.len(),
        result.succeeded
    );
    if let Some(partial) = result.partial_failure() {
        warn!("action=partial_publish batch={} {partial}", report.batches);
    }
    Ok(())
}
