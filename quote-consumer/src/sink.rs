use std::collections::HashSet;

use log::{debug, info};
use stream_core::{SequenceNumber, StreamEvent};

/// Декодированная запись вместе с тем, откуда она пришла.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Delivery {
    pub(crate) shard_id: String,
    pub(crate) sequence_number: SequenceNumber,
    pub(crate) partition_key: String,
    pub(crate) event: StreamEvent,
}

/// Куда consumer отдаёт события.
pub(crate) trait EventSink {
    fn emit(&mut self, delivery: Delivery);
}

/// Пишет каждое событие в лог; опционально только по выбранным символам.
#[derive(Debug, Default)]
pub(crate) struct LogSink {
    symbols: Option<HashSet<String>>,
    pub(crate) emitted: usize,
    pub(crate) filtered: usize,
}

impl LogSink {
    pub(crate) fn with_symbols(symbols: Option<Vec<String>>) -> Self {
        Self {
            symbols: symbols.map(|s| s.into_iter().collect()),
            ..Self::default()
        }
    }

    fn accepts(&self, event: &StreamEvent) -> bool {
        self.symbols
            .as_ref()
            .is_none_or(|set| set.contains(event.symbol()))
    }
}

impl EventSink for LogSink {
    fn emit(&mut self, d: Delivery) {
        if !self.accepts(&d.event) {
            debug!("filtered {} from {}", d.partition_key, d.shard_id);
            self.filtered += 1;
            return;
        }
        info!("shard={} seq={} {}", d.shard_id, d.sequence_number, d.event);
        self.emitted += 1;
    }
}

/// Собирает всё в память
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct CollectSink(pub(crate) Vec<Delivery>);

#[cfg(test)]
impl EventSink for CollectSink {
    fn emit(&mut self, delivery: Delivery) {
        self.0.push(delivery);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stream_core::HistoryPoint;

    fn delivery(symbol: &str) -> Delivery {
        Delivery {
            shard_id: "shardId-000000000000".into(),
            sequence_number: SequenceNumber(1),
            partition_key: symbol.into(),
            event: StreamEvent::History(HistoryPoint::new(symbol.into(), 1, 1.0, 2.0, 1.0, 2.0)),
        }
    }

    #[test]
    fn without_filter_everything_is_emitted() {
        let mut sink = LogSink::with_symbols(None);
        sink.emit(delivery("MSFT"));
        sink.emit(delivery("AMZN"));
        assert_eq!(sink.emitted, 2);
        assert_eq!(sink.filtered, 0);
    }

    #[test]
    fn filter_drops_other_symbols() {
        let mut sink = LogSink::with_symbols(Some(vec!["MSFT".into()]));
        sink.emit(delivery("MSFT"));
        sink.emit(delivery("AMZN"));
        assert_eq!(sink.emitted, 1);
        assert_eq!(sink.filtered, 1);
    }
}
