use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nimd::codec;
use nimd::logger::Logger;
use nimd::server;

/// A server bound to an OS-assigned loopback port, running on its own
/// thread for the lifetime of the test.
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    pub fn start() -> Self {
        Self::with_max_sessions(16)
    }

    pub fn with_max_sessions(max_sessions: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local_addr");
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_for_thread = Arc::clone(&shutdown);
        let log = Arc::new(Logger::new(0));

        let handle = thread::spawn(move || {
            let _ = server::serve(listener, max_sessions, shutdown_for_thread, log);
        });

        // The accept loop needs a moment to flip into nonblocking mode and
        // start polling before the first test connection arrives.
        thread::sleep(Duration::from_millis(20));

        Self { addr, shutdown, handle: Some(handle) }
    }

    pub fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).expect("connect to test server")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub fn send_open(stream: &mut TcpStream, name: &str) {
    let payload = format!("OPEN|{name}|").into_bytes();
    codec::write_frame(stream, &payload).expect("write OPEN");
}

pub fn send_move(stream: &mut TcpStream, pile: i64, qty: i64) {
    let payload = format!("MOVE|{pile}|{qty}|").into_bytes();
    codec::write_frame(stream, &payload).expect("write MOVE");
}

pub fn recv(stream: &mut TcpStream) -> Vec<u8> {
    codec::read_frame(stream).expect("read server frame").payload
}
