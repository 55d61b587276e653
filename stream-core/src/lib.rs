//! # stream-core
//!
//! Базовые типы и протоколы для конвейера котировок: producer пишет в
//! шардированный лог, consumer читает его по курсорам шардов.
//!
//! Этот крейт содержит:
//!
//! - [`types`] — доменные типы (котировка, точка истории, записи стрима, шарды)
//! - [`codec`] — кодек payload записей (JSON с тегом `kind`)
//! - [`log_service`] — трейт шардированного лога, шов между конвейером и хранилищем
//! - [`memory`] — реализация лога в памяти процесса
//! - [`protocol`] / [`wire`] — запросы к log-server и их фрейминг
//! - [`client`] — TCP-клиент log-server
//! - [`symbols`] — чтение и нормализация списка символов
//! - [`pause`] — пауза, прерываемая флагом остановки
//! - [`error`] — типы ошибок, включая таксономию ошибок конвейера
//!
//! ## Быстрый пример: кодек
//!
//! ```rust
//! use stream_core::codec::{decode, to_stream_record};
//! use stream_core::{HistoryPoint, StreamEvent};
//!
//! let ev = StreamEvent::History(HistoryPoint::new("MSFT".into(), 1_614_000_000, 246.0, 250.0, 247.0, 249.0));
//! let rec = to_stream_record(&ev).unwrap();
//!
//! assert_eq!(rec.partition_key, "MSFT");
//! assert_eq!(decode(&rec.payload).unwrap(), ev);
//! ```
//!
//! ## Пример: лог в памяти
//!
//! ```rust
//! use stream_core::{IteratorPosition, LogService, MemoryLog, StreamRecord};
//!
//! let log = MemoryLog::new();
//! log.create_stream("quotes", 1).unwrap();
//! log.put_records("quotes", &[StreamRecord { partition_key: "MSFT".into(), payload: b"{}".to_vec() }]).unwrap();
//!
//! let shard = &log.list_shards("quotes").unwrap()[0];
//! let it = log.get_shard_iterator("quotes", &shard.shard_id, IteratorPosition::TrimHorizon).unwrap();
//! let out = log.get_records(&it, 10).unwrap();
//! assert_eq!(out.records.len(), 1);
//! ```
//!
//! ## Пример: чтение символов
//!
//! ```rust
//! use stream_core::symbols::parse_symbols;
//!
//! let input = b"msft, goog # core\n# comment\n amzn \nMSFT\n";
//! let symbols = parse_symbols(input).unwrap();
//! assert_eq!(symbols, vec!["AMZN", "GOOG", "MSFT"]);
//! ```
//!
//! ## Дизайн
//!
//! `stream-core` — общая зависимость для log-server, producer и consumer.
//! Здесь только чистые типы, сериализация и блокирующий std-ввод-вывод,
//! без async и без HTTP.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Доменные типы.
pub mod types;

/// Кодек payload записей стрима.
pub mod codec;

/// Трейт шардированного лога.
pub mod log_service;

/// Шардированный лог в памяти.
pub mod memory;

/// Запросы/ответы log-server.
pub mod protocol;

/// Фрейминг (длина + версия + postcard).
pub mod wire;

/// TCP-клиент log-server.
pub mod client;

/// Чтение/нормализация списка символов.
pub mod symbols;

/// Прерываемая пауза.
pub mod pause;

/// Ошибки `stream-core`.
pub mod error;

/// Общие константы
mod constants;
pub use constants::{MAX_GET_RECORDS, MAX_PUT_RECORDS, SHUTDOWN_POLL_TICK, THROTTLED_ERROR_CODE};

// --- Re-exports (публичный фасад API) ---

pub use crate::client::TcpLogClient;
pub use crate::error::{CodecError, LogServiceError, PipelineError, SymbolsError, WireError};
pub use crate::log_service::LogService;
pub use crate::memory::MemoryLog;
pub use crate::types::{
    ConsumedRecord, GetRecordsOutput, HistoryPoint, IteratorPosition, IteratorToken, PutOutcome,
    PutRecordsOutput, QuoteRecord, SequenceNumber, Shard, StartingPosition, StreamDescription,
    StreamEvent, StreamRecord,
};
