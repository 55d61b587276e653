use log::{debug, info};
use stream_core::{
    IteratorPosition, IteratorToken, LogService, LogServiceError, PipelineError, Shard,
    StartingPosition,
};

/// Курсор чтения одного шарда.
///
/// Токен заменяется после каждого успешного get_records, в том числе пустого.
/// Курсор без токена выведен из работы: шард закрыт.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ShardCursor {
    pub(crate) shard_id: String,
    pub(crate) position: StartingPosition,
    token: Option<IteratorToken>,
}

impl ShardCursor {
    pub(crate) fn new(shard_id: String, position: StartingPosition, token: IteratorToken) -> Self {
        Self {
            shard_id,
            position,
            token: Some(token),
        }
    }

    pub(crate) fn token(&self) -> Option<&IteratorToken> {
        self.token.as_ref()
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.token.is_none()
    }

    pub(crate) fn advance(&mut self, next: Option<IteratorToken>) {
        if next.is_none() {
            info!(
                "shard {} closed, cursor retired (opened at {})",
                self.shard_id, self.position
            );
        }
        self.token = next;
    }
}

fn resolve(position: StartingPosition, shard: &Shard) -> IteratorPosition {
    match position {
        StartingPosition::TrimHorizon => IteratorPosition::TrimHorizon,
        StartingPosition::Latest => IteratorPosition::Latest,
        StartingPosition::AtSequenceNumber(Some(seq)) => IteratorPosition::AtSequenceNumber(seq),
        StartingPosition::AtSequenceNumber(None) => {
            IteratorPosition::AtSequenceNumber(shard.starting_sequence_number)
        }
    }
}

/// Описывает стрим, перечисляет шарды и открывает по итератору на шард.
/// Любой отказ даёт `StreamUnavailable`.
pub(crate) fn discover<L: LogService + ?Sized>(
    log: &L,
    stream: &str,
    position: StartingPosition,
) -> Result<Vec<ShardCursor>, PipelineError> {
    let unavailable = |source: LogServiceError| PipelineError::StreamUnavailable {
        stream: stream.to_string(),
        source,
    };

    let desc = log.describe_stream(stream).map_err(unavailable)?;
    let shards = log.list_shards(stream).map_err(unavailable)?;
    info!(
        "action=discover stream={} shard_count={} shards={} position={position}",
        desc.stream_name,
        desc.shard_count,
        shards.len()
    );

    shards
        .iter()
        .map(|shard| {
            let token = log
                .get_shard_iterator(stream, &shard.shard_id, resolve(position, shard))
                .map_err(unavailable)?;
            debug!("opened iterator for {}", shard.shard_id);
            Ok(ShardCursor::new(shard.shard_id.clone(), position, token))
        })
        .collect()
}
