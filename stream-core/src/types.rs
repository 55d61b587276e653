use std::fmt;

use serde::{Deserialize, Serialize};

/// Нормализованная котировка по одному символу.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub symbol: String,
    pub short_name: String,
    /// epoch seconds
    pub market_time: i64,
    pub quote_source: String,
    pub current: f64,
    pub low_day: f64,
    pub high_day: f64,
    pub open: f64,
    pub previous_close: f64,
    pub low_52wk: f64,
    pub high_52wk: f64,
}

impl fmt::Display for QuoteRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} current={} low_day={} high_day={} market_time={}",
            self.symbol, self.current, self.low_day, self.high_day, self.market_time
        )
    }
}

/// Одна точка исторического графика (OHLC за интервал).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub symbol: String,
    pub market_time: i64,
    pub midpoint: f64,
    pub low: f64,
    pub high: f64,
    pub open: f64,
    pub close: f64,
}

impl HistoryPoint {
    /// midpoint всегда считается из low/high
    pub fn new(symbol: String, market_time: i64, low: f64, high: f64, open: f64, close: f64) -> Self {
        Self {
            symbol,
            market_time,
            midpoint: (low + high) / 2.0,
            low,
            high,
            open,
            close,
        }
    }
}

impl fmt::Display for HistoryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} open={} close={} midpoint={} market_time={}",
            self.symbol, self.open, self.close, self.midpoint, self.market_time
        )
    }
}

/// То, что лежит в payload записи стрима.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamEvent {
    Quote(QuoteRecord),
    History(HistoryPoint),
}

impl StreamEvent {
    /// Символ события; он же partition key
    pub fn symbol(&self) -> &str {
        match self {
            StreamEvent::Quote(q) => &q.symbol,
            StreamEvent::History(h) => &h.symbol,
        }
    }

    pub fn market_time(&self) -> i64 {
        match self {
            StreamEvent::Quote(q) => q.market_time,
            StreamEvent::History(h) => h.market_time,
        }
    }
}

impl fmt::Display for StreamEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamEvent::Quote(q) => write!(f, "quote {q}"),
            StreamEvent::History(h) => write!(f, "history {h}"),
        }
    }
}

impl From<QuoteRecord> for StreamEvent {
    fn from(q: QuoteRecord) -> Self {
        StreamEvent::Quote(q)
    }
}

impl From<HistoryPoint> for StreamEvent {
    fn from(h: HistoryPoint) -> Self {
        StreamEvent::History(h)
    }
}

/// Запись на запись в стрим: partition key + непрозрачный payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub partition_key: String,
    pub payload: Vec<u8>,
}

/// Порядковый номер записи внутри шарда (монотонно растёт).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Непрозрачный маркер позиции чтения шарда.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IteratorToken(pub String);

impl IteratorToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IteratorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Откуда начинать чтение шарда.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartingPosition {
    /// Самая старая доступная запись
    TrimHorizon,
    /// Только новые записи
    Latest,
    /// Конкретный номер; `None` значит стартовый номер самого шарда
    AtSequenceNumber(Option<SequenceNumber>),
}

impl fmt::Display for StartingPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartingPosition::TrimHorizon => f.write_str("TRIM_HORIZON"),
            StartingPosition::Latest => f.write_str("LATEST"),
            StartingPosition::AtSequenceNumber(Some(seq)) => write!(f, "AT_SEQUENCE_NUMBER({seq})"),
            StartingPosition::AtSequenceNumber(None) => f.write_str("AT_SEQUENCE_NUMBER(shard start)"),
        }
    }
}

/// Позиция, с которой сервис открывает итератор (номер уже разрешён).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IteratorPosition {
    TrimHorizon,
    Latest,
    AtSequenceNumber(SequenceNumber),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    pub shard_id: String,
    pub starting_sequence_number: SequenceNumber,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescription {
    pub stream_name: String,
    pub shard_count: usize,
}

/// Запись, прочитанная из шарда.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumedRecord {
    pub sequence_number: SequenceNumber,
    pub partition_key: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRecordsOutput {
    pub records: Vec<ConsumedRecord>,
    /// `None`: шард закрыт, читать дальше нечего
    pub next_iterator: Option<IteratorToken>,
}

/// Результат по одной записи из put-batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PutOutcome {
    Accepted {
        shard_id: String,
        sequence_number: SequenceNumber,
    },
    Failed {
        error_code: String,
        error_message: String,
    },
}

impl PutOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, PutOutcome::Failed { .. })
    }
}

/// Ответ на put-batch; `outcomes[i]` соответствует i-й записи запроса.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutRecordsOutput {
    pub failed_record_count: usize,
    pub outcomes: Vec<PutOutcome>,
}
