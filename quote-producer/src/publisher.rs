use std::borrow::Cow;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use log::{debug, info, warn};
use stream_core::pause::pause;
use stream_core::{
    LogService, LogServiceError, MAX_PUT_RECORDS, PipelineError, PutOutcome, StreamRecord,
};

use crate::retry::RetryPolicy;

/// Итог публикации одной последовательности записей.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct PublishResult {
    pub(crate) submitted: usize,
    pub(crate) succeeded: usize,
    /// Записи, так и не принятые после всех попыток, в исходном порядке
    pub(crate) failed: Vec<StreamRecord>,
    /// Сколько раз вызывался put_records
    pub(crate) calls: usize,
    /// Сколько попыток реально сделала самая неудачная пачка
    pub(crate) attempts: u32,
}

impl PublishResult {
    pub(crate) fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// `PartialPublishFailure`, если что-то осталось неотправленным
    pub(crate) fn partial_failure(&self) -> Option<PipelineError> {
        if self.is_complete() {
            return None;
        }
        Some(PipelineError::PartialPublishFailure {
            failed: self.failed.clone(),
            attempts: self.attempts,
        })
    }
}

/// Режет записи на пачки, отправляет их и переотправляет отбитые записи.
pub(crate) struct BatchPublisher<'a, L: LogService + ?Sized> {
    log: &'a L,
    retry: RetryPolicy,
    deadline: Option<Instant>,
    shutdown: Option<&'a AtomicBool>,
}

impl<'a, L: LogService + ?Sized> BatchPublisher<'a, L> {
    pub(crate) fn new(log: &'a L, retry: RetryPolicy) -> Self {
        Self {
            log,
            retry,
            deadline: None,
            shutdown: None,
        }
    }

    /// После дедлайна новые вызовы не начинаются
    pub(crate) fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Пауза перед повтором прерывается этим флагом
    pub(crate) fn with_shutdown(mut self, shutdown: &'a AtomicBool) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Публикует `records` пачками по `max_batch_size` (1..=500).
    ///
    /// Ошибка всего вызова put_records превращается в `TransportFailure`, возвращается сразу.
    /// Отбитые сервисом записи (включая троттлинг) переотправляются, пока не
    /// кончатся попытки; остаток попадает в `PublishResult::failed`.
    pub(crate) fn publish(
        &self,
        stream: &str,
        records: &[StreamRecord],
        max_batch_size: usize,
    ) -> Result<PublishResult, PipelineError> {
        let size = max_batch_size.clamp(1, MAX_PUT_RECORDS);
        let mut result = PublishResult {
            submitted: records.len(),
            ..PublishResult::default()
        };

        for chunk in records.chunks(size) {
            if self.deadline_passed() {
                warn!(
                    "action=publish_skipped stream={stream} records={} reason=time_budget_exhausted",
                    chunk.len()
                );
                result.failed.extend_from_slice(chunk);
                continue;
            }
            self.publish_chunk(stream, chunk, &mut result)?;
        }

        info!(
            "action=publish stream={stream} submitted={} succeeded={} failed={} calls={}",
            result.submitted,
            result.succeeded,
            result.failed.len(),
            result.calls
        );
        Ok(result)
    }

    fn publish_chunk(
        &self,
        stream: &str,
        chunk: &[StreamRecord],
        result: &mut PublishResult,
    ) -> Result<(), PipelineError> {
        // позиции в chunk, которые сервис ещё не принял
        let mut pending: Vec<usize> = (0..chunk.len()).collect();
        let mut attempt: u32 = 0;

        while !pending.is_empty() && attempt < self.retry.max_attempts {
            if attempt > 0 && !self.wait_before_retry(attempt) {
                break;
            }
            attempt += 1;

            let batch: Cow<'_, [StreamRecord]> = if pending.len() == chunk.len() {
                Cow::Borrowed(chunk)
            } else {
                Cow::Owned(pending.iter().map(|&i| chunk[i].clone()).collect())
            };

            let out = self
                .log
                .put_records(stream, &batch)
                .map_err(PipelineError::TransportFailure)?;
            result.calls += 1;

            if out.outcomes.len() != batch.len() {
                return Err(PipelineError::TransportFailure(LogServiceError::Transport(
                    format!(
                        "put_records returned {} outcomes for {} records",
                        out.outcomes.len(),
                        batch.len()
                    ),
                )));
            }

            let mut still_failed = Vec::with_capacity(out.failed_record_count);
            for (&idx, outcome) in pending.iter().zip(&out.outcomes) {
                match outcome {
                    PutOutcome::Accepted { .. } => result.succeeded += 1,
                    PutOutcome::Failed { error_code, .. } => {
                        debug!(
                            "record {idx} key={} rejected: {error_code}",
                            chunk[idx].partition_key
                        );
                        still_failed.push(idx);
                    }
                }
            }

            if !still_failed.is_empty() {
                warn!(
                    "action=kinesis_put_records stream={stream} attempt={attempt} failed={}/{}",
                    still_failed.len(),
                    batch.len()
                );
            }
            pending = still_failed;
        }

        result.attempts = result.attempts.max(attempt);
        result
            .failed
            .extend(pending.into_iter().map(|i| chunk[i].clone()));
        Ok(())
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    // false: повторять не надо (дедлайн или остановка)
    fn wait_before_retry(&self, attempt: u32) -> bool {
        let delay = self.retry.delay_after(attempt);

        if let Some(deadline) = self.deadline {
            if Instant::now() + delay >= deadline {
                warn!("retry {attempt} skipped: time budget exhausted");
                return false;
            }
        }

        match self.shutdown {
            Some(sd) => pause(delay, sd),
            None => {
                std::thread::sleep(delay);
                true
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::{PutScript, ScriptedLog};
    use super::*;
    use std::time::Duration;
    use stream_core::{IteratorPosition, MemoryLog};

    fn records(n: usize) -> Vec<StreamRecord> {
        (0..n)
            .map(|i| StreamRecord {
                partition_key: format!("SYM{i}"),
                payload: format!("{{\"n\":{i}}}").into_bytes(),
            })
            .collect()
    }

    #[test]
    fn chunks_25_records_into_10_10_5_preserving_order() {
        let log = ScriptedLog::default();
        let recs = records(25);

        let res = BatchPublisher::new(&log, RetryPolicy::immediate(3))
            .publish("s", &recs, 10)
            .unwrap();

        let calls = log.calls();
        let sizes: Vec<usize> = calls.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![10, 10, 5]);

        let flat: Vec<StreamRecord> = calls.into_iter().flatten().collect();
        assert_eq!(flat, recs);

        assert_eq!(res.succeeded, 25);
        assert!(res.is_complete());
        assert_eq!(res.calls, 3);
    }

    #[test]
    fn retries_exactly_the_failed_records_and_then_succeeds() {
        let log = ScriptedLog::with_script(vec![PutScript::FailPositions(vec![2, 7])]);
        let recs = records(10);

        let res = BatchPublisher::new(&log, RetryPolicy::immediate(3))
            .publish("s", &recs, 10)
            .unwrap();

        let calls = log.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1], vec![recs[2].clone(), recs[7].clone()]);

        assert_eq!(res.submitted, 10);
        assert_eq!(res.succeeded, 10);
        assert!(res.failed.is_empty());
        assert_eq!(res.attempts, 2);
        assert!(res.partial_failure().is_none());
    }

    #[test]
    fn gives_up_after_retry_ceiling_and_reports_failed_records() {
        let log = ScriptedLog::with_script(vec![
            PutScript::FailPositions(vec![2, 7]),
            PutScript::FailPositions(vec![0, 1]),
            PutScript::FailPositions(vec![0, 1]),
            // дальше не дойдёт: потолок 3 попытки
            PutScript::FailPositions(vec![]),
        ]);
        let recs = records(10);

        let res = BatchPublisher::new(&log, RetryPolicy::immediate(3))
            .publish("s", &recs, 10)
            .unwrap();

        assert_eq!(log.calls().len(), 3);
        assert_eq!(res.succeeded, 8);
        assert_eq!(res.failed, vec![recs[2].clone(), recs[7].clone()]);

        match res.partial_failure() {
            Some(PipelineError::PartialPublishFailure { failed, attempts }) => {
                assert_eq!(failed.len(), 2);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn transport_failure_is_propagated_not_swallowed() {
        let log = ScriptedLog::with_script(vec![PutScript::Transport]);
        let err = BatchPublisher::new(&log, RetryPolicy::immediate(3))
            .publish("s", &records(5), 10)
            .unwrap_err();

        assert!(matches!(err, PipelineError::TransportFailure(_)));
        assert_eq!(log.calls().len(), 1);
    }

    #[test]
    fn transport_failure_on_retry_is_propagated() {
        let log = ScriptedLog::with_script(vec![PutScript::FailPositions(vec![0]), PutScript::Transport]);
        let err = BatchPublisher::new(&log, RetryPolicy::immediate(3))
            .publish("s", &records(3), 10)
            .unwrap_err();
        assert!(matches!(err, PipelineError::TransportFailure(_)));
    }

    #[test]
    fn mismatched_outcome_count_is_transport_failure() {
        let log = ScriptedLog::with_script(vec![PutScript::Truncated]);
        let err = BatchPublisher::new(&log, RetryPolicy::immediate(1))
            .publish("s", &records(3), 10)
            .unwrap_err();
        assert!(matches!(err, PipelineError::TransportFailure(_)));
    }

    #[test]
    fn batch_size_is_clamped_to_service_limit() {
        let log = ScriptedLog::default();
        BatchPublisher::new(&log, RetryPolicy::immediate(1))
            .publish("s", &records(MAX_PUT_RECORDS + 1), 10_000)
            .unwrap();
        let sizes: Vec<usize> = log.calls().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![MAX_PUT_RECORDS, 1]);

        let log = ScriptedLog::default();
        BatchPublisher::new(&log, RetryPolicy::immediate(1))
            .publish("s", &records(2), 0)
            .unwrap();
        assert_eq!(log.calls().len(), 2);
    }

    #[test]
    fn throttled_records_from_memory_log_are_retried_to_completion() {
        // один шард принимает 3 записи за вызов: 7 записей уйдут за 3 вызова
        let log = MemoryLog::with_shard_write_limit(3);
        log.create_stream("s", 1).unwrap();
        let recs = records(7);

        let res = BatchPublisher::new(&log, RetryPolicy::immediate(5))
            .publish("s", &recs, 10)
            .unwrap();

        assert!(res.is_complete());
        assert_eq!(res.calls, 3);
        assert_eq!(log.shard_len("s", "shardId-000000000000"), Some(7));

        // порядок внутри шарда совпадает с порядком входа
        let it = log
            .get_shard_iterator("s", "shardId-000000000000", IteratorPosition::TrimHorizon)
            .unwrap();
        let stored: Vec<Vec<u8>> = log
            .get_records(&it, 100)
            .unwrap()
            .records
            .into_iter()
            .map(|r| r.payload)
            .collect();
        let expected: Vec<Vec<u8>> = recs.into_iter().map(|r| r.payload).collect();
        assert_eq!(stored, expected);
    }

    #[test]
    fn expired_deadline_stops_retries_and_skips_chunks() {
        let log = ScriptedLog::with_script(vec![PutScript::FailPositions(vec![0])]);
        let deadline = Instant::now() + Duration::from_millis(50);
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(10),
            jitter_percent: 0,
            ..RetryPolicy::default()
        };

        let res = BatchPublisher::new(&log, policy)
            .with_deadline(Some(deadline))
            .publish("s", &records(2), 10)
            .unwrap();

        // повтор через 10s не влезает в бюджет
        assert_eq!(log.calls().len(), 1);
        assert_eq!(res.failed.len(), 1);
        match res.partial_failure() {
            Some(PipelineError::PartialPublishFailure { attempts, .. }) => assert_eq!(attempts, 1),
            other => panic!("unexpected {other:?}"),
        }

        let past = Instant::now() - Duration::from_millis(1);
        let log = ScriptedLog::default();
        let res = BatchPublisher::new(&log, RetryPolicy::immediate(3))
            .with_deadline(Some(past))
            .publish("s", &records(4), 2)
            .unwrap();
        assert!(log.calls().is_empty());
        assert_eq!(res.failed.len(), 4);
        assert_eq!(res.attempts, 0);
    }

    #[test]
    fn shutdown_interrupts_retry_pause() {
        let log = ScriptedLog::with_script(vec![PutScript::FailPositions(vec![1])]);
        let shutdown = AtomicBool::new(true);
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(30),
            ..RetryPolicy::default()
        };

        let started = Instant::now();
        let res = BatchPublisher::new(&log, policy)
            .with_shutdown(&shutdown)
            .publish("s", &records(3), 10)
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(log.calls().len(), 1);
        assert_eq!(res.failed.len(), 1);
        assert_eq!(res.attempts, 1);
    }
}
