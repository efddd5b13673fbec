//! Test doubles and common utilities for contract tests
//!
//! This module provides minimal test doubles that record how the event loop
//! and the REST client use their collaborators.

#![allow(dead_code)]

use protos_core::traits::{Connection, Connector, Frame, FrameSink};
use protos_core::{
    Error, Event, EventKind, EventLoop, HandlerRegistry, LoopState, ProtosConfig, Result, Update,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

pub const TEST_APP_ID: &str = "test-app";

/// Helper to create a minimal ProtosConfig for testing
pub fn test_config() -> ProtosConfig {
    ProtosConfig::new("http://protos.test/internal/", TEST_APP_ID)
}

/// What the mock connector does when asked to connect
enum ConnectOutcome {
    Accept,
    Reject(String),
    Fail(String),
}

/// Counters shared between a mock connection and the test
#[derive(Clone, Default)]
pub struct TransportCounters {
    connects: Arc<AtomicUsize>,
    close_frames: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    handshake: Arc<Mutex<Option<(String, String)>>>,
}

impl TransportCounters {
    /// Number of connection attempts
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of close frames the loop tried to send
    pub fn close_frames(&self) -> usize {
        self.close_frames.load(Ordering::SeqCst)
    }

    /// Number of physical closes
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// (url, app_id) of the last connection attempt
    pub fn handshake(&self) -> Option<(String, String)> {
        self.handshake.lock().unwrap().clone()
    }
}

/// A connector backed by an in-memory channel
pub struct MockConnector {
    outcome: ConnectOutcome,
    frames: Mutex<Option<mpsc::UnboundedReceiver<Result<Frame>>>>,
    counters: TransportCounters,
    fail_close_frame: bool,
}

impl MockConnector {
    /// Create a connector that accepts the connection
    ///
    /// Frames (or read errors) sent on the returned sender are delivered to
    /// the loop. Dropping the sender looks like the peer closing.
    pub fn new() -> (Self, mpsc::UnboundedSender<Result<Frame>>, TransportCounters) {
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = TransportCounters::default();
        let connector = Self {
            outcome: ConnectOutcome::Accept,
            frames: Mutex::new(Some(rx)),
            counters: counters.clone(),
            fail_close_frame: false,
        };
        (connector, tx, counters)
    }

    /// Create a connector whose handshake is refused with a message
    pub fn rejecting(message: &str) -> (Self, TransportCounters) {
        let (mut connector, _tx, counters) = Self::new();
        connector.outcome = ConnectOutcome::Reject(message.to_string());
        (connector, counters)
    }

    /// Create a connector that cannot reach the host
    pub fn unreachable(cause: &str) -> (Self, TransportCounters) {
        let (mut connector, _tx, counters) = Self::new();
        connector.outcome = ConnectOutcome::Fail(cause.to_string());
        (connector, counters)
    }

    /// Make the close frame send fail, as if the peer were already gone
    pub fn failing_close_frame(mut self) -> Self {
        self.fail_close_frame = true;
        self
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str, app_id: &str) -> Result<Connection> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        *self.counters.handshake.lock().unwrap() = Some((url.to_string(), app_id.to_string()));

        match &self.outcome {
            ConnectOutcome::Reject(message) => return Err(Error::connection_rejected(message)),
            ConnectOutcome::Fail(cause) => return Err(Error::connection_failed(cause)),
            ConnectOutcome::Accept => {}
        }

        let rx = self
            .frames
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| Error::connection_failed("mock connector already used"))?;

        Ok(Connection::new(
            Box::pin(UnboundedReceiverStream::new(rx)),
            Box::new(MockSink {
                counters: self.counters.clone(),
                fail_close_frame: self.fail_close_frame,
            }),
        ))
    }

    fn transport_name(&self) -> &'static str {
        "mock"
    }
}

struct MockSink {
    counters: TransportCounters,
    fail_close_frame: bool,
}

#[async_trait::async_trait]
impl FrameSink for MockSink {
    async fn send_close(&mut self, _reason: &str) -> Result<()> {
        self.counters.close_frames.fetch_add(1, Ordering::SeqCst);
        if self.fail_close_frame {
            return Err(Error::transport("peer already gone"));
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records handler invocations
#[derive(Clone, Default)]
pub struct Calls {
    timer: Arc<Mutex<Vec<tokio::time::Instant>>>,
    messages: Arc<Mutex<Vec<Update>>>,
    terminate: Arc<AtomicUsize>,
}

impl Calls {
    /// Number of Timer invocations
    pub fn timer_count(&self) -> usize {
        self.timer.lock().unwrap().len()
    }

    /// When each Timer invocation happened
    pub fn timer_instants(&self) -> Vec<tokio::time::Instant> {
        self.timer.lock().unwrap().clone()
    }

    /// Payloads delivered to the NewMessage handler
    pub fn messages(&self) -> Vec<Update> {
        self.messages.lock().unwrap().clone()
    }

    /// Number of Terminate invocations
    pub fn terminate_count(&self) -> usize {
        self.terminate.load(Ordering::SeqCst)
    }
}

/// Which handlers a registry built by [`registry`] should fail in
#[derive(Clone, Copy, Default)]
pub struct Failures {
    /// Fail the Timer handler on this invocation (1-based)
    pub timer_on_call: Option<usize>,
    /// Fail the NewMessage handler
    pub messages: bool,
}

/// Build a registry with recording handlers for all three kinds
pub fn registry(failures: Failures) -> (HandlerRegistry, Calls) {
    let calls = Calls::default();
    let mut registry = HandlerRegistry::new();

    let timer = Arc::clone(&calls.timer);
    registry
        .register(EventKind::Timer, move |_event: Event| {
            let timer = Arc::clone(&timer);
            async move {
                let call = {
                    let mut timer = timer.lock().unwrap();
                    timer.push(tokio::time::Instant::now());
                    timer.len()
                };
                if failures.timer_on_call == Some(call) {
                    anyhow::bail!("timer handler failed on call {}", call);
                }
                Ok(())
            }
        })
        .unwrap();

    let messages = Arc::clone(&calls.messages);
    registry
        .register(EventKind::NewMessage, move |event: Event| {
            let messages = Arc::clone(&messages);
            async move {
                if let Some(update) = event.update() {
                    messages.lock().unwrap().push(update.clone());
                }
                if failures.messages {
                    anyhow::bail!("message handler failed");
                }
                Ok(())
            }
        })
        .unwrap();

    let terminate = Arc::clone(&calls.terminate);
    registry
        .register(EventKind::Terminate, move |_event: Event| {
            let terminate = Arc::clone(&terminate);
            async move {
                terminate.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();

    (registry, calls)
}

/// A running loop under test
pub struct RunningLoop {
    pub handle: JoinHandle<Result<()>>,
    pub shutdown: oneshot::Sender<()>,
    pub states: mpsc::Receiver<LoopState>,
}

impl RunningLoop {
    /// Send the shutdown signal and wait for the loop to return
    pub async fn shutdown(self) -> (Result<()>, Vec<LoopState>) {
        let _ = self.shutdown.send(());
        Self::finish(self.handle, self.states).await
    }

    /// Wait for the loop to return on its own
    ///
    /// The shutdown sender is kept alive until the loop has returned.
    pub async fn join(self) -> (Result<()>, Vec<LoopState>) {
        let _shutdown = self.shutdown;
        Self::finish(self.handle, self.states).await
    }

    async fn finish(
        handle: JoinHandle<Result<()>>,
        mut states: mpsc::Receiver<LoopState>,
    ) -> (Result<()>, Vec<LoopState>) {
        let result = tokio::time::timeout(Duration::from_secs(300), handle)
            .await
            .expect("event loop terminates")
            .expect("event loop task does not panic");

        let mut seen = Vec::new();
        while let Ok(state) = states.try_recv() {
            seen.push(state);
        }
        (result, seen)
    }
}

/// Start a loop on a background task, stopped by the returned sender
pub fn spawn_loop(
    connector: MockConnector,
    registry: HandlerRegistry,
    poll_interval: Duration,
) -> RunningLoop {
    let (event_loop, states) = EventLoop::new(&test_config(), Box::new(connector), registry)
        .expect("event loop construction succeeds");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(event_loop.run_until(poll_interval, async move {
        // Only an explicit send counts as a shutdown signal
        if shutdown_rx.await.is_err() {
            std::future::pending::<()>().await;
        }
    }));

    RunningLoop {
        handle,
        shutdown: shutdown_tx,
        states,
    }
}

/// Full lifecycle of a session that connected successfully
pub const FULL_LIFECYCLE: [LoopState; 4] = [
    LoopState::Connecting,
    LoopState::Running,
    LoopState::Terminating,
    LoopState::Closed,
];

/// Answer exactly one HTTP request with a canned response
///
/// Returns the base URL to point a client at, and a handle resolving to the
/// raw request text.
pub async fn serve_once(status: u16, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback listener");
    let addr = listener.local_addr().expect("listener address");

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept connection");
        let request = read_request(&mut socket).await;

        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            if (200..300).contains(&status) { "OK" } else { "Error" },
            body.len(),
            body
        );
        socket
            .write_all(response.as_bytes())
            .await
            .expect("write response");
        let _ = socket.shutdown().await;
        request
    });

    (format!("http://{}/internal/", addr), handle)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        let n = socket.read(&mut chunk).await.expect("read request");
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let body_len = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                break;
            }
        }
    }

    String::from_utf8_lossy(&buf).into_owned()
}

/// Build a client that talks to a local test server
pub fn test_client(base_url: &str) -> protos_core::ProtosClient {
    let http = reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("build HTTP client");
    protos_core::ProtosClient::with_http_client(base_url, TEST_APP_ID, http)
}
