use crate::config::{ACCEPT_TICK, SESSION_READ_TICK, SESSION_WRITE_TIMEOUT};
use crate::session::run_session;
use anyhow::Context;
use log::{debug, info, warn};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, atomic::AtomicBool, atomic::Ordering};
use std::thread;
use stream_core::LogService;

// accept loop; по потоку на соединение
pub(crate) fn run_tcp_listener<L>(
    listener: TcpListener,
    log: Arc<L>,
    shutdown: Arc<AtomicBool>,
) -> anyhow::Result<()>
where
    L: LogService + Send + Sync + 'static,
{
    listener
        .set_nonblocking(true)
        .context("listener.set_nonblocking(true)")?;
    let mut session_handles = Vec::new();

    loop {
        reap_finished_sessions(&mut session_handles);

        if shutdown.load(Ordering::Relaxed) {
            info!("shutting down tcp listener");
            break;
        }

        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = prepare_stream(&stream) {
                    warn!("failed to configure connection from {peer}: {e}");
                    continue;
                }

                let log = log.clone();
                let shutdown = shutdown.clone();

                let h = thread::spawn(move || {
                    info!("client connected: {peer}");
                    match run_session(stream, peer, log.as_ref(), &shutdown) {
                        Ok(served) => debug!("session {peer} done, {served} requests"),
                        Err(e) => warn!("session {peer} ended with error: {e}"),
                    }
                });
                session_handles.push(h);
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                // нет новых соединений прямо сейчас
                thread::sleep(ACCEPT_TICK);
            }
            Err(e) => {
                warn!("accept error: {e}");
                thread::sleep(ACCEPT_TICK);
            }
        }
    }

    for h in session_handles {
        if let Err(panic) = h.join() {
            warn!("session thread panicked: {:?}", panic);
        }
    }

    Ok(())
}

pub(crate) fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr).with_context(|| format!("bind TCP listener {addr}"))
}

fn prepare_stream(stream: &TcpStream) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true).ok();
    stream.set_read_timeout(Some(SESSION_READ_TICK))?;
    stream.set_write_timeout(Some(SESSION_WRITE_TIMEOUT))?;
    Ok(())
}

fn reap_finished_sessions(handles: &mut Vec<thread::JoinHandle<()>>) {
    let mut i = 0;
    while i < handles.len() {
        if handles[i].is_finished() {
            let h = handles.swap_remove(i);
            if let Err(panic) = h.join() {
                warn!("session thread panicked: {:?}", panic);
            }
        } else {
            i += 1;
        }
    }
}
