//! The accept loop: owns the listening socket and hands each connection off
//! to its own worker thread. Split out of `main` so integration tests can
//! drive a real server without spawning a separate process.

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use socket2::{Domain, Socket, Type};

use crate::codec;
use crate::error::StartupError;
use crate::event::Event;
use crate::logger::Logger;
use crate::session::{next_conn_id, Registry, Session};
use crate::worker::run_worker;

/// Written to a socket that cannot be admitted into any session — the
/// registry is saturated, or the worker thread/handle for it could not be
/// created. Not one of the protocol's numbered `FAIL` codes (§4.2): those
/// report in-game violations, this reports the server's own inability to
/// serve the connection at all. Still shaped as a well-formed frame so a
/// conforming client can parse it before the socket closes.
const UNAVAILABLE_NOTICE: &[u8] = b"FAIL|90 Unavailable|";

fn write_unavailable_notice(stream: &mut std::net::TcpStream) {
    let _ = codec::write_frame(stream, UNAVAILABLE_NOTICE);
    let _ = stream.shutdown(std::net::Shutdown::Both);
}

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Matches the original `open_listener`'s `listen(fd, 256)` backlog.
const LISTEN_BACKLOG: i32 = 256;

/// Bind `addr` and serve connections until `shutdown_requested` is set.
///
/// The listener is nonblocking so the accept loop can notice the shutdown
/// flag between connections; a signal handler registered against the same
/// flag (see [`crate::event`] / `main`) is the usual way to set it.
pub fn bind_and_serve(
    addr: &str,
    max_sessions: usize,
    shutdown_requested: Arc<AtomicBool>,
    log: Arc<Logger>,
) -> Result<(), StartupError> {
    let listener = bind_listener(addr).map_err(StartupError::Bind)?;
    serve(listener, max_sessions, shutdown_requested, log)
}

/// Build the listening socket with `SO_REUSEADDR` and a 256-deep backlog,
/// matching the original's `open_listener`, then hand it off as a plain
/// `std::net::TcpListener`.
fn bind_listener(addr: &str) -> std::io::Result<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .or_else(|_| addr.to_socket_addrs_first())?;

    let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    Ok(socket.into())
}

trait ParseOrResolve {
    fn to_socket_addrs_first(&self) -> std::io::Result<SocketAddr>;
}

impl ParseOrResolve for str {
    /// `addr` is normally a literal `ip:port`, but accept anything the
    /// standard resolver understands (e.g. a bare hostname) for parity with
    /// `TcpListener::bind`'s more permissive contract.
    fn to_socket_addrs_first(&self) -> std::io::Result<SocketAddr> {
        use std::net::ToSocketAddrs;
        self.to_socket_addrs()?
            .next()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "no addresses resolved"))
    }
}

pub fn serve(
    listener: TcpListener,
    max_sessions: usize,
    shutdown_requested: Arc<AtomicBool>,
    log: Arc<Logger>,
) -> Result<(), StartupError> {
    listener.set_nonblocking(true).map_err(StartupError::Io)?;
    log.warn(Event::Listening { addr: listener.local_addr().map_err(StartupError::Io)? });

    let registry = Arc::new(Registry::new(max_sessions));

    while !shutdown_requested.load(Ordering::Relaxed) {
        let (mut stream, peer_addr) = match listener.accept() {
            Ok(pair) => pair,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
                continue;
            }
            Err(e) => {
                log.warn(format!("accept failed: {e}"));
                continue;
            }
        };

        if let Err(e) = stream.set_nonblocking(false) {
            log.warn(format!("failed to configure accepted socket: {e}"));
            continue;
        }

        let session = match session_for_new_connection(&registry, &log) {
            Ok(session) => session,
            Err(_) => {
                log.warn(Event::SpawnFailed { reason: "registry saturated".to_string() });
                write_unavailable_notice(&mut stream);
                continue;
            }
        };

        let write_handle = match stream.try_clone() {
            Ok(s) => s,
            Err(e) => {
                log.warn(Event::SpawnFailed { reason: e.to_string() });
                write_unavailable_notice(&mut stream);
                continue;
            }
        };

        let conn_id = next_conn_id();
        let game_id = session.index();
        log.info(Event::Accepted { game: game_id, peer: Some(peer_addr) });

        if session.attach_player(write_handle, conn_id).is_none() {
            // The front session went busy between the peek and the attach
            // (a racing worker just paired it up); drop the connection
            // rather than block the accept loop waiting on the registry.
            write_unavailable_notice(&mut stream);
            continue;
        }

        // Held back so a failed spawn can still notify the client; the
        // thread closure below takes its own clone via `stream`.
        let mut notice_handle = stream.try_clone().ok();

        let registry = Arc::clone(&registry);
        let log = Arc::clone(&log);
        let builder = thread::Builder::new().name(format!("nimd-conn-{conn_id}"));
        if let Err(e) = builder.spawn(move || run_worker(stream, conn_id, session, registry, log)) {
            log.warn(Event::SpawnFailed { reason: e.to_string() });
            if let Some(mut nh) = notice_handle.take() {
                write_unavailable_notice(&mut nh);
            }
        }
    }

    log.warn(Event::Shutdown { freed: registry.session_count() });
    Ok(())
}

/// Pick the session a new connection should join: the current front session
/// if it has an open slot, otherwise whatever the registry hands back after
/// a reuse-or-grow scan. `Err` only when the registry is saturated and has
/// no reusable slot to offer — the caller must refuse the connection rather
/// than wedge it into a session that is already playing.
fn session_for_new_connection(registry: &Registry, log: &Logger) -> Result<Arc<Session>, ()> {
    let front = registry.front();
    let state = front.inner.lock().unwrap().state;
    if !state.is_busy() {
        return Ok(front);
    }
    log.verbose(Event::FrontBusy { game: front.index(), state });
    registry.admit(log).map_err(|_| ())
}
