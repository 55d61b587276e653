use std::net::{SocketAddr, TcpStream};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, warn};

use crate::error::LogServiceError;
use crate::log_service::LogService;
use crate::protocol::{Request, Response};
use crate::types::{
    GetRecordsOutput, IteratorPosition, IteratorToken, PutRecordsOutput, Shard, StreamDescription,
    StreamRecord,
};
use crate::wire::{read_frame, write_frame};

const TCP_READ_TIMEOUT_S: u64 = 5;
const TCP_WRITE_TIMEOUT_S: u64 = 5;

/// Клиент log-server.
///
/// Одно TCP-соединение на клиента; запросы сериализуются под мьютексом
/// (на фрейм запроса один фрейм ответа). После ошибки ввода-вывода
/// соединение выбрасывается и открывается заново при следующем вызове.
pub struct TcpLogClient {
    addr: SocketAddr,
    conn: Mutex<Option<TcpStream>>,
}

impl TcpLogClient {
    /// Соединение не открывается до первого запроса.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            conn: Mutex::new(None),
        }
    }

    /// Как `new`, но сразу проверяет, что сервер доступен.
    pub fn connect(addr: SocketAddr) -> Result<Self, LogServiceError> {
        let client = Self::new(addr);
        {
            let mut guard = client.lock();
            *guard = Some(open(addr)?);
        }
        Ok(client)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn lock(&self) -> MutexGuard<'_, Option<TcpStream>> {
        match self.conn.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(), // продолжаем, несмотря на poison
        }
    }

    fn call(&self, req: Request) -> Result<Response, LogServiceError> {
        let op = req.op_name();
        let mut guard = self.lock();

        if guard.is_none() {
            *guard = Some(open(self.addr)?);
        }
        let Some(stream) = guard.as_mut() else {
            return Err(LogServiceError::Transport("connection is not open".into()));
        };

        let res = write_frame(stream, &req).and_then(|()| read_frame::<_, Response>(stream));
        match res {
            Ok(Some(Response::Error(e))) => Err(e),
            Ok(Some(resp)) => Ok(resp),
            Ok(None) => {
                *guard = None;
                Err(LogServiceError::Transport(format!(
                    "{op}: server closed connection without response"
                )))
            }
            Err(e) => {
                warn!("{op} to {} failed: {e}; dropping connection", self.addr);
                *guard = None;
                Err(e.into())
            }
        }
    }
}

fn open(addr: SocketAddr) -> Result<TcpStream, LogServiceError> {
    let stream = TcpStream::connect(addr)
        .map_err(|e| LogServiceError::Transport(format!("connect {addr}: {e}")))?;

    stream.set_nodelay(true).ok();
    stream
        .set_read_timeout(Some(Duration::from_secs(TCP_READ_TIMEOUT_S)))
        .ok();
    stream
        .set_write_timeout(Some(Duration::from_secs(TCP_WRITE_TIMEOUT_S)))
        .ok();

    debug!("connected to log-server {addr}");
    Ok(stream)
}

fn unexpected(op: &str, resp: Response) -> LogServiceError {
    LogServiceError::Transport(format!("{op}: unexpected response {resp:?}"))
}

impl LogService for TcpLogClient {
    fn create_stream(&self, stream: &str, shard_count: usize) -> Result<(), LogServiceError> {
        match self.call(Request::CreateStream {
            stream: stream.to_string(),
            shard_count,
        })? {
            Response::StreamCreated => Ok(()),
            other => Err(unexpected("create_stream", other)),
        }
    }

    fn describe_stream(&self, stream: &str) -> Result<StreamDescription, LogServiceError> {
        match self.call(Request::DescribeStream {
            stream: stream.to_string(),
        })? {
            Response::Stream(d) => Ok(d),
            other => Err(unexpected("describe_stream", other)),
        }
    }

    fn list_shards(&self, stream: &str) -> Result<Vec<Shard>, LogServiceError> {
        match self.call(Request::ListShards {
            stream: stream.to_string(),
        })? {
            Response::Shards(s) => Ok(s),
            other => Err(unexpected("list_shards", other)),
        }
    }

    fn get_shard_iterator(
        &self,
        stream: &str,
        shard_id: &str,
        position: IteratorPosition,
    ) -> Result<IteratorToken, LogServiceError> {
        match self.call(Request::GetShardIterator {
            stream: stream.to_string(),
            shard_id: shard_id.to_string(),
            position,
        })? {
            Response::Iterator(t) => Ok(t),
            other => Err(unexpected("get_shard_iterator", other)),
        }
    }

    fn get_records(
        &self,
        iterator: &IteratorToken,
        limit: usize,
    ) -> Result<GetRecordsOutput, LogServiceError> {
        match self.call(Request::GetRecords {
            iterator: iterator.clone(),
            limit,
        })? {
            Response::Records(r) => Ok(r),
            other => Err(unexpected("get_records", other)),
        }
    }

    fn put_records(
        &self,
        stream: &str,
        records: &[StreamRecord],
    ) -> Result<PutRecordsOutput, LogServiceError> {
        match self.call(Request::PutRecords {
            stream: stream.to_string(),
            records: records.to_vec(),
        })? {
            Response::Put(p) => Ok(p),
            other => Err(unexpected("put_records", other)),
        }
    }
}
