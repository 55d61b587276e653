use log::debug;
use stream_core::{HistoryPoint, PipelineError, QuoteRecord};

use crate::market_data::{ChartEnvelope, RawQuote};

/// Что делать с символом, у которого не хватает полей
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub(crate) enum IncompletePolicy {
    /// Первый неполный символ прерывает вызов
    #[default]
    Abort,
    /// Неполные символы пропускаются, ошибки собираются
    Skip,
}

#[derive(Debug, Default)]
pub(crate) struct TransformOutcome {
    pub(crate) records: Vec<QuoteRecord>,
    /// Только при `IncompletePolicy::Skip`
    pub(crate) rejected: Vec<PipelineError>,
}

fn missing(symbol: &str, field: &'static str) -> PipelineError {
    PipelineError::IncompleteQuote {
        symbol: symbol.to_string(),
        field,
    }
}

/// Один сырой результат → одна котировка; пустое поле даёт ошибку.
pub(crate) fn to_quote_record(raw: &RawQuote) -> Result<QuoteRecord, PipelineError> {
    let symbol = raw
        .symbol
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| missing("<unknown>", "symbol"))?;

    macro_rules! field {
        ($name:ident, $wire:literal) => {
            raw.$name.clone().ok_or_else(|| missing(symbol, $wire))?
        };
    }

    Ok(QuoteRecord {
        symbol: symbol.to_string(),
        short_name: field!(short_name, "shortName"),
        market_time: field!(regular_market_time, "regularMarketTime"),
        quote_source: field!(quote_source_name, "quoteSourceName"),
        current: field!(regular_market_price, "regularMarketPrice"),
        low_day: field!(regular_market_day_low, "regularMarketDayLow"),
        high_day: field!(regular_market_day_high, "regularMarketDayHigh"),
        open: field!(regular_market_open, "regularMarketOpen"),
        previous_close: field!(regular_market_previous_close, "regularMarketPreviousClose"),
        low_52wk: field!(fifty_two_week_low, "fiftyTwoWeekLow"),
        high_52wk: field!(fifty_two_week_high, "fiftyTwoWeekHigh"),
    })
}

/// Порядок результатов сохраняется.
pub(crate) fn transform_quotes(
    raws: &[RawQuote],
    policy: IncompletePolicy,
) -> Result<TransformOutcome, PipelineError> {
    let mut out = TransformOutcome {
        records: Vec::with_capacity(raws.len()),
        rejected: Vec::new(),
    };

    for raw in raws {
        match to_quote_record(raw) {
            Ok(q) => out.records.push(q),
            Err(e) => match policy {
                IncompletePolicy::Abort => return Err(e),
                IncompletePolicy::Skip => out.rejected.push(e),
            },
        }
    }

    Ok(out)
}

/// График → точки истории. Интервалы с `null` в OHLC пропускаются.
pub(crate) fn transform_chart(chart: &ChartEnvelope) -> Result<Vec<HistoryPoint>, PipelineError> {
    let Some(result) = chart.chart.result.first() else {
        return Err(PipelineError::FetchFailed("chart response has no result".into()));
    };
    let symbol = result.meta.symbol.as_str();
    let Some(q) = result.indicators.quote.first() else {
        return Err(missing(symbol, "indicators.quote"));
    };

    let mut points = Vec::with_capacity(result.timestamp.len());
    for (i, &ts) in result.timestamp.iter().enumerate() {
        let at = |v: &Vec<Option<f64>>| v.get(i).copied().flatten();
        match (at(&q.low), at(&q.high), at(&q.open), at(&q.close)) {
            (Some(low), Some(high), Some(open), Some(close)) => {
                points.push(HistoryPoint::new(symbol.to_string(), ts, low, high, open, close));
            }
            _ => debug!("skipping {symbol} interval at {ts}: incomplete OHLC"),
        }
    }

    Ok(points)
}
