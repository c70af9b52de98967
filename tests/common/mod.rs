//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use qr_gateway::decode::{DecodeError, Decoder};
use qr_gateway::net::Listener;
use qr_gateway::protocol::{read_response, write_image, write_quit, Response};
use qr_gateway::{Server, ServerConfig, ServiceState, Shutdown};

/// Decoder that answers "qr:<payload as lossy utf8>", or nothing for payloads
/// starting with `!`.
pub struct EchoDecoder;

impl Decoder for EchoDecoder {
    async fn decode(&self, payload: &Path) -> Result<Option<String>, DecodeError> {
        let bytes = tokio::fs::read(payload).await?;
        if bytes.first() == Some(&b'!') {
            return Ok(None);
        }
        Ok(Some(format!("qr:{}", String::from_utf8_lossy(&bytes))))
    }
}

/// Decoder that blocks until released, counting calls in flight.
#[derive(Clone, Default)]
pub struct GatedDecoder {
    pub in_flight: Arc<AtomicUsize>,
    pub release: Arc<Notify>,
}

impl Decoder for GatedDecoder {
    async fn decode(&self, _payload: &Path) -> Result<Option<String>, DecodeError> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.release.notified().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Some("released".into()))
    }
}

/// Config suitable for tests: generous limits, short drain, no log file.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_host = "127.0.0.1".into();
    config.sessions.max_users = 4;
    config.sessions.idle_timeout_secs = 5;
    config.sessions.drain_timeout_secs = 1;
    config.rate_limit.max_requests = 100;
    config.transfer.max_payload_size = 1024;
    config.transfer.chunk_size = 64;
    config.observability.log_file = None;
    config
}

pub struct TestServer<D> {
    pub addr: SocketAddr,
    pub state: Arc<ServiceState<D>>,
    pub updates: mpsc::UnboundedSender<ServerConfig>,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<std::io::Result<()>>,
}

/// Start a server on an ephemeral port.
pub async fn start_server<D: Decoder>(config: ServerConfig, decoder: D) -> TestServer<D> {
    let tcp = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    let listener = Listener::from_tcp(tcp);

    let server = Server::new(config, decoder);
    let state = Arc::clone(server.state());
    let shutdown = Shutdown::new();
    let (updates, config_updates) = mpsc::unbounded_channel();
    let handle = tokio::spawn(server.run(listener, config_updates, shutdown.subscribe()));

    TestServer {
        addr,
        state,
        updates,
        shutdown,
        handle,
    }
}

/// A connected client session.
pub struct Client {
    pub reader: BufReader<OwnedReadHalf>,
    pub writer: OwnedWriteHalf,
}

impl Client {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    pub async fn send(&mut self, payload: &[u8]) {
        write_image(&mut self.writer, payload).await.unwrap();
    }

    pub async fn recv(&mut self) -> Response {
        tokio::time::timeout(Duration::from_secs(10), read_response(&mut self.reader, 4096))
            .await
            .expect("response timed out")
            .unwrap()
    }

    pub async fn request(&mut self, payload: &[u8]) -> Response {
        self.send(payload).await;
        self.recv().await
    }

    pub async fn quit(&mut self) {
        write_quit(&mut self.writer).await.unwrap();
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
