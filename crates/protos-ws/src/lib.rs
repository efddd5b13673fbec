// # WebSocket Transport
//
// This crate provides the WebSocket implementation of the `Connector` trait
// used by the protos-core event loop.
//
// ## Handshake
//
// - Client handshake against `<base>/ws`, with the app identity in the
//   `Appid` header
// - A refused handshake whose body carries `{"error": "..."}` is reported as
//   `ConnectionRejected` with that message. The connector keeps the socket
//   through the upgrade so it can read the rest of the body (up to 1024
//   bytes of the declared `Content-Length`) when it arrives after the
//   headers
// - Anything else (DNS, TCP, TLS, bare HTTP errors) is `ConnectionFailed`
//
// ## Frames
//
// - Text and binary messages become frames
// - Ping/pong are answered by tungstenite and never surface
// - A close message from the peer ends the frame stream
//
// ## Close
//
// The write half only ever sends one thing: the normal-closure frame with
// reason `terminating`, followed by a flush-and-close of the socket.

use async_trait::async_trait;
use futures_util::stream::{self, SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use protos_core::client::decode_error;
use protos_core::config::APP_ID_HEADER;
use protos_core::traits::{Connection, Connector, FrameSink, FrameStream};
use protos_core::{Error, Result};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_native_tls::native_tls;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::{Request, Response};
use tokio_tungstenite::tungstenite::http::header::CONTENT_LENGTH;
use tokio_tungstenite::tungstenite::http::{HeaderMap, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, client_async};
use tracing::{debug, info};

type WsStream = WebSocketStream<SharedStream>;

/// Default handshake timeout (30 seconds)
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Most refusal body bytes read after a failed upgrade
const MAX_REFUSAL_BODY: usize = 1024;

/// How long to wait for the rest of a refusal body
const REFUSAL_BODY_TIMEOUT: Duration = Duration::from_secs(2);

/// WebSocket connector
///
/// Stateless: every call to `connect` performs a fresh handshake.
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl WsConnector {
    /// Create a connector with the default handshake timeout
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Bound the handshake (TCP, TLS and HTTP upgrade) by `timeout`
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str, app_id: &str) -> Result<Connection> {
        let mut request = url
            .into_client_request()
            .map_err(|e| Error::config(format!("Invalid notification URL {}: {}", url, e)))?;

        let identity = HeaderValue::from_str(app_id)
            .map_err(|_| Error::config("App ID is not a valid header value"))?;
        request.headers_mut().insert(APP_ID_HEADER, identity);

        let (socket, response) = tokio::time::timeout(self.connect_timeout, handshake(request))
            .await
            .map_err(|_| {
                Error::connection_failed(format!(
                    "handshake timed out after {}s",
                    self.connect_timeout.as_secs()
                ))
            })??;

        info!("Connected to {} (HTTP {})", url, response.status());

        let (write, read) = socket.split();
        Ok(Connection::new(frame_stream(read), Box::new(WsSink { write })))
    }

    fn transport_name(&self) -> &'static str {
        "websocket"
    }
}

/// Open the socket and run the client upgrade over it
async fn handshake(request: Request) -> Result<(WsStream, Response)> {
    let stream = SharedStream::new(open_stream(&request).await?);

    match client_async(request, stream.clone()).await {
        Ok(upgraded) => Ok(upgraded),
        Err(WsError::Http(response)) => {
            let status = response.status().as_u16();
            let declared = declared_length(response.headers());
            let buffered = response.body().clone().unwrap_or_default();
            let body = read_refusal_body(stream, buffered, declared).await;
            Err(classify_handshake_failure(status, Some(&body)))
        }
        Err(other) => Err(Error::connection_failed(other.to_string())),
    }
}

/// TCP connect, then TLS for `wss`
async fn open_stream(request: &Request) -> Result<MaybeTlsStream<TcpStream>> {
    let uri = request.uri();
    let secure = match uri.scheme_str() {
        Some("ws") => false,
        Some("wss") => true,
        _ => {
            return Err(Error::config(format!(
                "Unsupported notification URL scheme: {}",
                uri
            )));
        }
    };
    let host = uri
        .host()
        .map(|host| host.trim_start_matches('[').trim_end_matches(']'))
        .ok_or_else(|| Error::config(format!("Notification URL has no host: {}", uri)))?;
    let port = uri.port_u16().unwrap_or(if secure { 443 } else { 80 });

    let tcp = TcpStream::connect((host, port))
        .await
        .map_err(|e| Error::connection_failed(format!("{}:{}: {}", host, port, e)))?;
    if !secure {
        return Ok(MaybeTlsStream::Plain(tcp));
    }

    let connector = native_tls::TlsConnector::new()
        .map_err(|e| Error::connection_failed(format!("TLS setup failed: {}", e)))?;
    let tls = tokio_native_tls::TlsConnector::from(connector)
        .connect(host, tcp)
        .await
        .map_err(|e| {
            Error::connection_failed(format!("TLS handshake with {} failed: {}", host, e))
        })?;
    Ok(MaybeTlsStream::NativeTls(tls))
}

/// Declared body length of a refusal, if any
fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Complete a refusal body from the socket
///
/// `buffered` holds what the handshake already read past the headers.
/// Reads at most up to the declared length, capped at [`MAX_REFUSAL_BODY`].
/// Without a declared length only the buffered bytes are used. Read errors
/// and timeouts keep whatever arrived.
async fn read_refusal_body(
    stream: SharedStream,
    mut body: Vec<u8>,
    declared: Option<usize>,
) -> Vec<u8> {
    let wanted = declared.map_or(0, |len| len.min(MAX_REFUSAL_BODY));
    if body.len() < wanted {
        let mut rest = stream.take((wanted - body.len()) as u64);
        match tokio::time::timeout(REFUSAL_BODY_TIMEOUT, rest.read_to_end(&mut body)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!("Refusal body cut short: {}", e),
            Err(_) => debug!("Timed out reading refusal body"),
        }
    }
    body.truncate(MAX_REFUSAL_BODY);
    body
}

/// Classify a handshake the server answered with a plain HTTP response
///
/// Returns `ConnectionRejected` carrying the decoded `error` field when the
/// body has one, `ConnectionFailed` otherwise.
pub fn classify_handshake_failure(status: u16, body: Option<&[u8]>) -> Error {
    match body.and_then(decode_error) {
        Some(message) => Error::connection_rejected(message),
        None => Error::connection_failed(format!("handshake refused with HTTP {}", status)),
    }
}

/// Adapt the read half into a stream of data frames
fn frame_stream(read: SplitStream<WsStream>) -> FrameStream {
    Box::pin(stream::unfold(Some(read), |state| async move {
        let mut read = state?;
        loop {
            match read.next().await? {
                Ok(Message::Text(text)) => return Some((Ok(text.into_bytes()), Some(read))),
                Ok(Message::Binary(data)) => return Some((Ok(data), Some(read))),
                Ok(Message::Close(frame)) => {
                    debug!("Peer sent close frame: {:?}", frame);
                    return None;
                }
                // Control frames
                Ok(_) => continue,
                Err(e) => return Some((Err(Error::transport(e.to_string())), None)),
            }
        }
    }))
}

/// Socket shared between the upgrade and the refusal reader
///
/// `client_async` consumes its stream, and a failed upgrade does not hand it
/// back. Keeping a second handle lets the connector read the rest of the
/// response afterwards. The lock is never contended: after the upgrade only
/// the WebSocket holds a handle.
#[derive(Clone)]
struct SharedStream(Arc<Mutex<MaybeTlsStream<TcpStream>>>);

impl SharedStream {
    fn new(stream: MaybeTlsStream<TcpStream>) -> Self {
        Self(Arc::new(Mutex::new(stream)))
    }

    fn poll_with<T>(
        &self,
        f: impl FnOnce(Pin<&mut MaybeTlsStream<TcpStream>>) -> Poll<io::Result<T>>,
    ) -> Poll<io::Result<T>> {
        match self.0.lock() {
            Ok(mut stream) => f(Pin::new(&mut *stream)),
            Err(_) => Poll::Ready(Err(io::Error::other("socket lock poisoned"))),
        }
    }
}

impl AsyncRead for SharedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.poll_with(|stream| stream.poll_read(cx, buf))
    }
}

impl AsyncWrite for SharedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.poll_with(|stream| stream.poll_write(cx, buf))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.poll_with(|stream| stream.poll_flush(cx))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.poll_with(|stream| stream.poll_shutdown(cx))
    }
}

/// Write half of a WebSocket connection
struct WsSink {
    write: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_close(&mut self, reason: &str) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: reason.to_string().into(),
        };
        self.write
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| Error::transport(format!("Failed to send close frame: {}", e)))
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        match self.write.close().await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(Error::transport(format!("Failed to close connection: {}", e))),
        }
    }
}
