use std::collections::HashMap;
use std::io::Write;

use log::info;
use serde::Serialize;
use stream_core::{PipelineError, StreamEvent};

use crate::market_data::{ChartInterval, ChartRange, MarketDataClient, QuoteSource};
use crate::transform::{IncompletePolicy, transform_chart, transform_quotes};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum FetchAction {
    /// Текущие котировки
    Quotes,
    /// Исторический график по каждому символу
    History,
    /// Сводка, как её отдаёт API
    Summary,
}

#[derive(Debug, Clone)]
pub(crate) struct FetchRequest {
    pub(crate) action: FetchAction,
    pub(crate) symbols: Vec<String>,
    pub(crate) interval: ChartInterval,
    pub(crate) range: ChartRange,
    pub(crate) on_incomplete: IncompletePolicy,
}

/// Событие плюс поля, которые печатаются, но в стрим не идут.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct FetchedEvent {
    #[serde(flatten)]
    pub(crate) event: StreamEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) bid: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) ask: Option<f64>,
}

impl From<StreamEvent> for FetchedEvent {
    fn from(event: StreamEvent) -> Self {
        Self {
            event,
            bid: None,
            ask: None,
        }
    }
}

#[derive(Debug)]
pub(crate) enum FetchOutput {
    /// Можно публиковать в стрим
    Events(Vec<FetchedEvent>),
    Raw(serde_json::Value),
}

impl FetchOutput {
    /// JSON Lines для событий, pretty JSON для сырого ответа
    pub(crate) fn write_to(&self, out: &mut impl Write) -> anyhow::Result<()> {
        match self {
            FetchOutput::Events(events) => {
                for ev in events {
                    serde_json::to_writer(&mut *out, ev)?;
                    out.write_all(b"\n")?;
                }
            }
            FetchOutput::Raw(value) => {
                serde_json::to_writer_pretty(&mut *out, value)?;
                out.write_all(b"\n")?;
            }
        }
        out.flush()?;
        Ok(())
    }
}

/// Разовый запрос к market-data API.
pub(crate) fn fetch(client: &MarketDataClient, req: &FetchRequest) -> Result<FetchOutput, PipelineError> {
    let output = match req.action {
        FetchAction::Quotes => {
            let raws = client.fetch_quotes(&req.symbols)?;
            let outcome = transform_quotes(&raws, req.on_incomplete)?;
            let book: HashMap<&str, (Option<f64>, Option<f64>)> = raws
                .iter()
                .filter_map(|r| Some((r.symbol.as_deref()?, (r.bid, r.ask))))
                .collect();
            let events = outcome
                .records
                .into_iter()
                .map(|q| {
                    let (bid, ask) = book.get(q.symbol.as_str()).copied().unwrap_or_default();
                    FetchedEvent {
                        event: StreamEvent::Quote(q),
                        bid,
                        ask,
                    }
                })
                .collect();
            FetchOutput::Events(events)
        }
        FetchAction::History => {
            let mut events = Vec::new();
            for symbol in &req.symbols {
                let chart = client.fetch_chart(symbol, req.interval, req.range)?;
                events.extend(
                    transform_chart(&chart)?
                        .into_iter()
                        .map(|p| FetchedEvent::from(StreamEvent::History(p))),
                );
            }
            FetchOutput::Events(events)
        }
        FetchAction::Summary => FetchOutput::Raw(client.fetch_summary(&req.symbols)?),
    };

    if let FetchOutput::Events(events) = &output {
        info!("action=fetch kind={:?} events={}", req.action, events.len());
    }
    Ok(output)
}
