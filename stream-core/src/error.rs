use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::StreamRecord;

/// Ошибки кодека записей
#[derive(Debug, Error)]
pub enum CodecError {
    /// Payload не является корректно закодированным событием
    #[error("malformed payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),

    /// Событие не удалось сериализовать (например, NaN в цене)
    #[error("failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Ошибки разбора списка символов
#[derive(Debug, Error)]
pub enum SymbolsError {
    #[error("symbol list is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),

    #[error("bad symbols document: {0}")]
    Document(#[from] serde_json::Error),
}

/// Ошибки фрейминга wire-протокола log-server
#[derive(Debug, Error)]
pub enum WireError {
    /// Фрейм слишком короткий (не соотв. заявленной длине)
    #[error("frame too short")]
    FrameTooShort,

    /// Заявленная длина больше допустимой
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// Неверная версия протокола
    #[error("unsupported wire version: {0}")]
    UnsupportedWireVersion(u8),

    /// Ошибка сериализации/десериализации
    #[error("postcard encode/decode error: {0}")]
    Postcard(#[from] postcard::Error),

    /// Ошибка чтения/записи сокета
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ошибки лог-сервиса. Переживают передачу по сети, поэтому только строки.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum LogServiceError {
    #[error("stream not found: {0}")]
    StreamNotFound(String),

    #[error("stream already exists: {0}")]
    StreamAlreadyExists(String),

    #[error("shard {shard_id} not found in stream {stream}")]
    ShardNotFound { stream: String, shard_id: String },

    #[error("invalid shard iterator: {0}")]
    InvalidIterator(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Вызов целиком не дошёл до сервиса (или ответ не разобран)
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<WireError> for LogServiceError {
    fn from(e: WireError) -> Self {
        LogServiceError::Transport(e.to_string())
    }
}

/// Таксономия ошибок конвейера producer/consumer
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Не удалось загрузить стартовую конфигурацию (список символов, env)
    #[error("config unavailable: {0}")]
    ConfigUnavailable(String),

    /// HTTP-запрос к market-data API не удался
    #[error("market data fetch failed: {0}")]
    FetchFailed(String),

    /// В ответе по символу нет обязательного поля
    #[error("incomplete quote for {symbol}: missing field `{field}`")]
    IncompleteQuote { symbol: String, field: &'static str },

    /// Часть записей так и не принята после всех попыток
    #[error("{} records still failed after {attempts} attempts", failed.len())]
    PartialPublishFailure {
        failed: Vec<StreamRecord>,
        attempts: u32,
    },

    /// Put-batch не выполнился целиком
    #[error("transport failure: {0}")]
    TransportFailure(#[source] LogServiceError),

    /// Не удалось описать стрим / получить шарды / открыть итераторы
    #[error("stream {stream} unavailable: {source}")]
    StreamUnavailable {
        stream: String,
        #[source]
        source: LogServiceError,
    },

    /// Прочитанная запись не декодируется
    #[error(transparent)]
    MalformedPayload(#[from] CodecError),
}
