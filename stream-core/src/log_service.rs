use crate::error::LogServiceError;
use crate::types::{
    GetRecordsOutput, IteratorPosition, IteratorToken, PutRecordsOutput, Shard, StreamDescription,
    StreamRecord,
};

/// Шардированный append-only лог.
///
/// Порядок гарантируется только внутри шарда. `put_records` может принять
/// часть пачки: ответ содержит исход по каждой записи в порядке запроса.
/// `Err` из `put_records` означает, что вызов не выполнился целиком.
pub trait LogService {
    fn create_stream(&self, stream: &str, shard_count: usize) -> Result<(), LogServiceError>;

    fn describe_stream(&self, stream: &str) -> Result<StreamDescription, LogServiceError>;

    fn list_shards(&self, stream: &str) -> Result<Vec<Shard>, LogServiceError>;

    fn get_shard_iterator(
        &self,
        stream: &str,
        shard_id: &str,
        position: IteratorPosition,
    ) -> Result<IteratorToken, LogServiceError>;

    fn get_records(
        &self,
        iterator: &IteratorToken,
        limit: usize,
    ) -> Result<GetRecordsOutput, LogServiceError>;

    fn put_records(
        &self,
        stream: &str,
        records: &[StreamRecord],
    ) -> Result<PutRecordsOutput, LogServiceError>;
}
