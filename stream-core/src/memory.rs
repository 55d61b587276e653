use std::collections::HashMap;
use std::collections::hash_map::{DefaultHasher, Entry};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::debug;

use crate::constants::{MAX_GET_RECORDS, MAX_PUT_RECORDS, THROTTLED_ERROR_CODE};
use crate::error::LogServiceError;
use crate::log_service::LogService;
use crate::types::{
    ConsumedRecord, GetRecordsOutput, IteratorPosition, IteratorToken, PutOutcome,
    PutRecordsOutput, SequenceNumber, Shard, StreamDescription, StreamRecord,
};

/// Номер первой записи в каждом шарде
const FIRST_SEQUENCE_NUMBER: u64 = 1;

/// Шардированный лог в памяти процесса.
///
/// Запись попадает в шард по хэшу partition key, так что записи с одним
/// ключом всегда лежат в одном шарде и читаются в порядке записи.
/// Опциональный `shard_write_limit` ограничивает число записей, которое шард
/// принимает за один `put_records`; остальные получают
/// `ProvisionedThroughputExceeded`, как при троттлинге у настоящего сервиса.
pub struct MemoryLog {
    streams: RwLock<HashMap<String, StreamState>>,
    /// Счётчик для уникальности токенов итераторов
    token_nonce: AtomicU64,
    shard_write_limit: Option<usize>,
}

struct StreamState {
    shards: Vec<ShardState>,
}

struct ShardState {
    shard_id: String,
    records: Vec<ConsumedRecord>,
}

impl ShardState {
    fn next_sequence_number(&self) -> SequenceNumber {
        SequenceNumber(FIRST_SEQUENCE_NUMBER + self.records.len() as u64)
    }
}

/// Разобранный токен: куда смотрит итератор.
struct IteratorState {
    stream: String,
    shard_index: usize,
    offset: usize,
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLog {
    pub fn new() -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            token_nonce: AtomicU64::new(1),
            shard_write_limit: None,
        }
    }

    /// Лог, у которого каждый шард принимает не больше `limit` записей за вызов.
    pub fn with_shard_write_limit(limit: usize) -> Self {
        Self {
            shard_write_limit: Some(limit.max(1)),
            ..Self::new()
        }
    }

    /// Сколько записей лежит в шарде (для тестов и диагностики).
    pub fn shard_len(&self, stream: &str, shard_id: &str) -> Option<usize> {
        let streams = self.read();
        streams
            .get(stream)?
            .shards
            .iter()
            .find(|s| s.shard_id == shard_id)
            .map(|s| s.records.len())
    }

    /// Шард, в который попадёт запись с данным ключом.
    pub fn shard_for_key(shard_count: usize, partition_key: &str) -> usize {
        // DefaultHasher::new() детерминирован в рамках одной сборки
        let mut h = DefaultHasher::new();
        partition_key.hash(&mut h);
        (h.finish() % shard_count as u64) as usize
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, StreamState>> {
        match self.streams.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(), // продолжаем, несмотря на poison
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, StreamState>> {
        match self.streams.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn issue_token(&self, stream: &str, shard_index: usize, offset: usize) -> IteratorToken {
        let nonce = self.token_nonce.fetch_add(1, Ordering::Relaxed);
        // stream в конце: в имени стрима может встретиться ':'
        IteratorToken(format!("{shard_index}:{offset}:{nonce}:{stream}"))
    }

    fn parse_token(token: &IteratorToken) -> Result<IteratorState, LogServiceError> {
        let invalid = || LogServiceError::InvalidIterator(token.to_string());

        let mut parts = token.as_str().splitn(4, ':');
        let shard_index = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
        let offset = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
        let _nonce: u64 = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
        let stream = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;

        Ok(IteratorState {
            stream: stream.to_string(),
            shard_index,
            offset,
        })
    }
}

impl LogService for MemoryLog {
    fn create_stream(&self, stream: &str, shard_count: usize) -> Result<(), LogServiceError> {
        if stream.is_empty() {
            return Err(LogServiceError::InvalidArgument("stream name is empty".into()));
        }
        if shard_count == 0 {
            return Err(LogServiceError::InvalidArgument(
                "shard count must be positive".into(),
            ));
        }

        let mut streams = self.write();
        match streams.entry(stream.to_string()) {
            Entry::Occupied(_) => Err(LogServiceError::StreamAlreadyExists(stream.to_string())),
            Entry::Vacant(e) => {
                let shards = (0..shard_count)
                    .map(|i| ShardState {
                        shard_id: format!("shardId-{i:012}"),
                        records: Vec::new(),
                    })
                    .collect();
                e.insert(StreamState { shards });
                debug!("created stream {stream} with {shard_count} shards");
                Ok(())
            }
        }
    }

    fn describe_stream(&self, stream: &str) -> Result<StreamDescription, LogServiceError> {
        let streams = self.read();
        let st = streams
            .get(stream)
            .ok_or_else(|| LogServiceError::StreamNotFound(stream.to_string()))?;

        Ok(StreamDescription {
            stream_name: stream.to_string(),
            shard_count: st.shards.len(),
        })
    }

    fn list_shards(&self, stream: &str) -> Result<Vec<Shard>, LogServiceError> {
        let streams = self.read();
        let st = streams
            .get(stream)
            .ok_or_else(|| LogServiceError::StreamNotFound(stream.to_string()))?;

        Ok(st
            .shards
            .iter()
            .map(|s| Shard {
                shard_id: s.shard_id.clone(),
                starting_sequence_number: SequenceNumber(FIRST_SEQUENCE_NUMBER),
            })
            .collect())
    }

    fn get_shard_iterator(
        &self,
        stream: &str,
        shard_id: &str,
        position: IteratorPosition,
    ) -> Result<IteratorToken, LogServiceError> {
        let (shard_index, offset) = {
            let streams = self.read();
            let st = streams
                .get(stream)
                .ok_or_else(|| LogServiceError::StreamNotFound(stream.to_string()))?;
            let (shard_index, shard) = st
                .shards
                .iter()
                .enumerate()
                .find(|(_, s)| s.shard_id == shard_id)
                .ok_or_else(|| LogServiceError::ShardNotFound {
                    stream: stream.to_string(),
                    shard_id: shard_id.to_string(),
                })?;

            let offset = match position {
                IteratorPosition::TrimHorizon => 0,
                IteratorPosition::Latest => shard.records.len(),
                IteratorPosition::AtSequenceNumber(seq) => {
                    if seq.0 < FIRST_SEQUENCE_NUMBER || seq > shard.next_sequence_number() {
                        return Err(LogServiceError::InvalidArgument(format!(
                            "sequence number {seq} is out of range for {shard_id}"
                        )));
                    }
                    (seq.0 - FIRST_SEQUENCE_NUMBER) as usize
                }
            };
            (shard_index, offset)
        };

        Ok(self.issue_token(stream, shard_index, offset))
    }

    fn get_records(
        &self,
        iterator: &IteratorToken,
        limit: usize,
    ) -> Result<GetRecordsOutput, LogServiceError> {
        let it = Self::parse_token(iterator)?;
        let limit = limit.clamp(1, MAX_GET_RECORDS);

        let (records, next_offset) = {
            let streams = self.read();
            let st = streams
                .get(&it.stream)
                .ok_or_else(|| LogServiceError::StreamNotFound(it.stream.clone()))?;
            let shard = st
                .shards
                .get(it.shard_index)
                .ok_or_else(|| LogServiceError::InvalidIterator(iterator.to_string()))?;
            if it.offset > shard.records.len() {
                return Err(LogServiceError::InvalidIterator(iterator.to_string()));
            }

            let end = (it.offset + limit).min(shard.records.len());
            (shard.records[it.offset..end].to_vec(), end)
        };

        Ok(GetRecordsOutput {
            records,
            next_iterator: Some(self.issue_token(&it.stream, it.shard_index, next_offset)),
        })
    }

    fn put_records(
        &self,
        stream: &str,
        records: &[StreamRecord],
    ) -> Result<PutRecordsOutput, LogServiceError> {
        if records.is_empty() || records.len() > MAX_PUT_RECORDS {
            return Err(LogServiceError::InvalidArgument(format!(
                "put_records accepts 1..={MAX_PUT_RECORDS} records, got {}",
                records.len()
            )));
        }

        let mut streams = self.write();
        let st = streams
            .get_mut(stream)
            .ok_or_else(|| LogServiceError::StreamNotFound(stream.to_string()))?;

        let shard_count = st.shards.len();
        let mut written_per_shard = vec![0usize; shard_count];
        let mut outcomes = Vec::with_capacity(records.len());
        let mut failed_record_count = 0;

        for rec in records {
            let idx = Self::shard_for_key(shard_count, &rec.partition_key);

            if self
                .shard_write_limit
                .is_some_and(|limit| written_per_shard[idx] >= limit)
            {
                failed_record_count += 1;
                outcomes.push(PutOutcome::Failed {
                    error_code: THROTTLED_ERROR_CODE.to_string(),
                    error_message: format!("rate exceeded for {}", st.shards[idx].shard_id),
                });
                continue;
            }

            let shard = &mut st.shards[idx];
            let sequence_number = shard.next_sequence_number();
            shard.records.push(ConsumedRecord {
                sequence_number,
                partition_key: rec.partition_key.clone(),
                payload: rec.payload.clone(),
            });
            written_per_shard[idx] += 1;

            outcomes.push(PutOutcome::Accepted {
                shard_id: shard.shard_id.clone(),
                sequence_number,
            });
        }

        Ok(PutRecordsOutput {
            failed_record_count,
            outcomes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(key: &str, body: &str) -> StreamRecord {
        StreamRecord {
            partition_key: key.to_string(),
            payload: body.as_bytes().to_vec(),
        }
    }

    fn read_all(log: &MemoryLog, stream: &str, shard_id: &str) -> Vec<ConsumedRecord> {
        let it = log
            .get_shard_iterator(stream, shard_id, IteratorPosition::TrimHorizon)
            .unwrap();
        log.get_records(&it, MAX_GET_RECORDS).unwrap().records
    }

    #[test]
    fn create_describe_and_list() {
        let log = MemoryLog::new();
        log.create_stream("quotes", 3).unwrap();

        let d = log.describe_stream("quotes").unwrap();
        assert_eq!(d.shard_count, 3);

        let shards = log.list_shards("quotes").unwrap();
        let ids: Vec<&str> = shards.iter().map(|s| s.shard_id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["shardId-000000000000", "shardId-000000000001", "shardId-000000000002"]
        );
    }

    #[test]
    fn create_twice_and_unknown_stream_fail() {
        let log = MemoryLog::new();
        log.create_stream("quotes", 1).unwrap();

        assert_eq!(
            log.create_stream("quotes", 1).unwrap_err(),
            LogServiceError::StreamAlreadyExists("quotes".into())
        );
        assert_eq!(
            log.describe_stream("nope").unwrap_err(),
            LogServiceError::StreamNotFound("nope".into())
        );
        assert!(matches!(
            log.create_stream("zero", 0).unwrap_err(),
            LogServiceError::InvalidArgument(_)
        ));
    }

    #[test]
    fn same_key_lands_in_same_shard_in_write_order() {
        let log = MemoryLog::new();
        log.create_stream("quotes", 4).unwrap();

        let batch = vec![rec("MSFT", "1"), rec("AMZN", "2"), rec("MSFT", "3")];
        let out = log.put_records("quotes", &batch).unwrap();
        assert_eq!(out.failed_record_count, 0);
        assert_eq!(out.outcomes.len(), 3);

        let msft_shard = match &out.outcomes[0] {
            PutOutcome::Accepted { shard_id, .. } => shard_id.clone(),
            other => panic!("unexpected {other:?}"),
        };

        let payloads: Vec<Vec<u8>> = read_all(&log, "quotes", &msft_shard)
            .into_iter()
            .filter(|r| r.partition_key == "MSFT")
            .map(|r| r.payload)
            .collect();
        assert_eq!(payloads, vec![b"1".to_vec(), b"3".to_vec()]);
    }

    #[test]
    fn iterator_positions() {
        let log = MemoryLog::new();
        log.create_stream("s", 1).unwrap();
        let shard = "shardId-000000000000";
        log.put_records("s", &[rec("A", "1"), rec("A", "2"), rec("A", "3")])
            .unwrap();

        let latest = log
            .get_shard_iterator("s", shard, IteratorPosition::Latest)
            .unwrap();
        assert!(log.get_records(&latest, 10).unwrap().records.is_empty());

        let at2 = log
            .get_shard_iterator("s", shard, IteratorPosition::AtSequenceNumber(SequenceNumber(2)))
            .unwrap();
        let got = log.get_records(&at2, 10).unwrap().records;
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].sequence_number, SequenceNumber(2));

        let bad = log.get_shard_iterator(
            "s",
            shard,
            IteratorPosition::AtSequenceNumber(SequenceNumber(99)),
        );
        assert!(matches!(bad, Err(LogServiceError::InvalidArgument(_))));
    }

    #[test]
    fn get_records_pages_with_limit_and_tokens_are_unique() {
        let log = MemoryLog::new();
        log.create_stream("s", 1).unwrap();
        let shard = "shardId-000000000000";
        let batch: Vec<StreamRecord> = (0..5).map(|i| rec("A", &i.to_string())).collect();
        log.put_records("s", &batch).unwrap();

        let mut token = log
            .get_shard_iterator("s", shard, IteratorPosition::TrimHorizon)
            .unwrap();
        let mut seen_tokens = vec![token.clone()];
        let mut sizes = Vec::new();

        for _ in 0..4 {
            let out = log.get_records(&token, 2).unwrap();
            sizes.push(out.records.len());
            token = out.next_iterator.unwrap();
            assert!(!seen_tokens.contains(&token), "token reused: {token}");
            seen_tokens.push(token.clone());
        }

        // пустой ответ не конец стрима, токен всё равно новый
        assert_eq!(sizes, vec![2, 2, 1, 0]);
    }

    #[test]
    fn new_records_are_visible_through_old_position() {
        let log = MemoryLog::new();
        log.create_stream("s", 1).unwrap();
        let shard = "shardId-000000000000";

        let it = log
            .get_shard_iterator("s", shard, IteratorPosition::Latest)
            .unwrap();
        let out = log.get_records(&it, 10).unwrap();
        assert!(out.records.is_empty());

        log.put_records("s", &[rec("A", "x")]).unwrap();
        let out = log.get_records(&out.next_iterator.unwrap(), 10).unwrap();
        assert_eq!(out.records.len(), 1);
    }

    #[test]
    fn garbage_token_is_invalid_iterator() {
        let log = MemoryLog::new();
        log.create_stream("s", 1).unwrap();

        for raw in ["", "abc", "0:0:1:", "0:x:1:s", "7:0:1:s"] {
            let err = log.get_records(&IteratorToken(raw.into()), 1).unwrap_err();
            assert!(
                matches!(err, LogServiceError::InvalidIterator(_)),
                "{raw:?} -> {err:?}"
            );
        }
    }

    #[test]
    fn shard_write_limit_throttles_excess_records() {
        let log = MemoryLog::with_shard_write_limit(2);
        log.create_stream("s", 1).unwrap();

        let batch: Vec<StreamRecord> = (0..5).map(|i| rec("A", &i.to_string())).collect();
        let out = log.put_records("s", &batch).unwrap();

        assert_eq!(out.failed_record_count, 3);
        let failed: Vec<usize> = out
            .outcomes
            .iter()
            .enumerate()
            .filter(|(_, o)| o.is_failed())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(failed, vec![2, 3, 4]);
        match &out.outcomes[2] {
            PutOutcome::Failed { error_code, .. } => assert_eq!(error_code, THROTTLED_ERROR_CODE),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(log.shard_len("s", "shardId-000000000000"), Some(2));
    }

    #[test]
    fn put_rejects_empty_and_oversized_batches() {
        let log = MemoryLog::new();
        log.create_stream("s", 1).unwrap();

        assert!(matches!(
            log.put_records("s", &[]).unwrap_err(),
            LogServiceError::InvalidArgument(_)
        ));

        let big: Vec<StreamRecord> = (0..=MAX_PUT_RECORDS).map(|_| rec("A", "x")).collect();
        assert!(matches!(
            log.put_records("s", &big).unwrap_err(),
            LogServiceError::InvalidArgument(_)
        ));
    }
}
