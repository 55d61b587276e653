use serde::{Deserialize, Serialize};

use crate::error::LogServiceError;
use crate::log_service::LogService;
use crate::types::{
    GetRecordsOutput, IteratorPosition, IteratorToken, PutRecordsOutput, Shard, StreamDescription,
    StreamRecord,
};

/// Запросы к log-server, по одному на фрейм
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    CreateStream {
        stream: String,
        shard_count: usize,
    },
    DescribeStream {
        stream: String,
    },
    ListShards {
        stream: String,
    },
    GetShardIterator {
        stream: String,
        shard_id: String,
        position: IteratorPosition,
    },
    GetRecords {
        iterator: IteratorToken,
        limit: usize,
    },
    PutRecords {
        stream: String,
        records: Vec<StreamRecord>,
    },
}

impl Request {
    /// Короткое имя операции для логов
    pub fn op_name(&self) -> &'static str {
        match self {
            Request::CreateStream { .. } => "create_stream",
            Request::DescribeStream { .. } => "describe_stream",
            Request::ListShards { .. } => "list_shards",
            Request::GetShardIterator { .. } => "get_shard_iterator",
            Request::GetRecords { .. } => "get_records",
            Request::PutRecords { .. } => "put_records",
        }
    }
}

/// Ответ на [`Request`]; ошибки сервиса едут как `Error`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    StreamCreated,
    Stream(StreamDescription),
    Shards(Vec<Shard>),
    Iterator(IteratorToken),
    Records(GetRecordsOutput),
    Put(PutRecordsOutput),
    Error(LogServiceError),
}

/// Выполняет запрос против любого [`LogService`].
pub fn dispatch<L: LogService + ?Sized>(log: &L, req: Request) -> Response {
    let res = match req {
        Request::CreateStream {
            stream,
            shard_count,
        } => log
            .create_stream(&stream, shard_count)
            .map(|()| Response::StreamCreated),
        Request::DescribeStream { stream } => log.describe_stream(&stream).map(Response::Stream),
        Request::ListShards { stream } => log.list_shards(&stream).map(Response::Shards),
        Request::GetShardIterator {
            stream,
            shard_id,
            position,
        } => log
            .get_shard_iterator(&stream, &shard_id, position)
            .map(Response::Iterator),
        Request::GetRecords { iterator, limit } => {
            log.get_records(&iterator, limit).map(Response::Records)
        }
        Request::PutRecords { stream, records } => {
            log.put_records(&stream, &records).map(Response::Put)
        }
    };

    res.unwrap_or_else(Response::Error)
}
