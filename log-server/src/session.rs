use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use stream_core::LogService;
use stream_core::WireError;
use stream_core::protocol::{Request, Response, dispatch};
use stream_core::wire::{is_timeout, read_frame, write_frame};

/// Обслуживает одно соединение: запрос → dispatch → ответ, пока клиент
/// не закроет соединение или не придёт shutdown.
///
/// Сокет должен иметь read timeout: это тик проверки `shutdown`.
pub(crate) fn run_session<L: LogService + ?Sized>(
    mut stream: TcpStream,
    peer: SocketAddr,
    log: &L,
    shutdown: &AtomicBool,
) -> Result<usize, WireError> {
    let mut served = 0usize;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("shutting down session {peer}");
            break;
        }

        let req: Request = match read_frame(&mut stream) {
            Ok(Some(req)) => req,
            Ok(None) => {
                debug!("{peer} closed connection");
                break;
            }
            Err(WireError::Io(e)) if is_timeout(&e) => {
                // тик
                continue;
            }
            Err(e) => {
                warn!("bad frame from {peer}: {e}");
                return Err(e);
            }
        };

        let op = req.op_name();
        let resp = dispatch(log, req);
        if let Response::Error(e) = &resp {
            debug!("{peer} {op} -> {e}");
        }

        write_frame(&mut stream, &resp)?;
        served += 1;
    }

    Ok(served)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;
    use stream_core::{LogServiceError, MemoryLog};

    fn connect_pair() -> (TcpStream, TcpStream, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client = TcpStream::connect(addr).unwrap();
        let (server, peer) = listener.accept().unwrap();
        server
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();

        (client, server, peer)
    }

    #[test]
    fn answers_each_request_until_client_closes() {
        let (mut client, server, peer) = connect_pair();
        let log = MemoryLog::new();
        let shutdown = AtomicBool::new(false);

        let h = thread::spawn(move || {
            write_frame(&mut client, &Request::CreateStream { stream: "s".into(), shard_count: 2 }).unwrap();
            let a: Response = read_frame(&mut client).unwrap().unwrap();
            write_frame(&mut client, &Request::DescribeStream { stream: "nope".into() }).unwrap();
            let b: Response = read_frame(&mut client).unwrap().unwrap();
            (a, b)
        });

        let served = run_session(server, peer, &log, &shutdown).unwrap();
        let (a, b) = h.join().unwrap();

        assert_eq!(served, 2);
        assert_eq!(a, Response::StreamCreated);
        assert_eq!(
            b,
            Response::Error(LogServiceError::StreamNotFound("nope".into()))
        );
        assert_eq!(log.list_shards("s").unwrap().len(), 2);
    }

    #[test]
    fn garbage_frame_ends_session_with_error() {
        let (mut client, server, peer) = connect_pair();
        // длина 3, версия 99
        client.write_all(&[0, 0, 0, 3, 99, 1, 2]).unwrap();

        let log = MemoryLog::new();
        let shutdown = AtomicBool::new(false);
        let err = run_session(server, peer, &log, &shutdown).unwrap_err();

        assert!(matches!(err, WireError::UnsupportedWireVersion(99)));
    }

    #[test]
    fn idle_session_exits_on_shutdown() {
        let (_client, server, peer) = connect_pair();
        let log = MemoryLog::new();
        let shutdown = AtomicBool::new(true);

        assert_eq!(run_session(server, peer, &log, &shutdown).unwrap(), 0);
    }
}
