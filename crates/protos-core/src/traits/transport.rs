// # Transport Traits
//
// Defines the interface between the event loop and the persistent
// connection to the host.
//
// ## Implementations
//
// - WebSocket: `protos-ws` crate
// - Tests: in-memory connectors built on channels
//
// ## Shape of a connection
//
// A connection is split in two halves when it opens:
//
// - a [`FrameStream`] that the loop hands to its background reader task
// - a [`FrameSink`] that stays with the loop's control task and is only used
//   for the close handshake
//
// The reader never writes and the control task never reads, which keeps the
// two tasks free of shared mutable state.

use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;

/// Payload of one inbound data frame
pub type Frame = Vec<u8>;

/// Stream of inbound frames
///
/// The stream yields `Err` for a read failure. Ending (`None`) means the peer
/// closed the connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = crate::Result<Frame>> + Send + 'static>>;

/// An open connection, split into its read and write halves
pub struct Connection {
    /// Inbound frames
    pub frames: FrameStream,
    /// Write half used for the close handshake
    pub sink: Box<dyn FrameSink>,
}

impl Connection {
    /// Assemble a connection from its two halves
    pub fn new(frames: FrameStream, sink: Box<dyn FrameSink>) -> Self {
        Self { frames, sink }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Trait for opening the notification connection
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Failure Reporting
///
/// - [`Error::ConnectionRejected`](crate::Error::ConnectionRejected) when the
///   host answered the handshake with a structured `{"error": ...}` body
/// - [`Error::ConnectionFailed`](crate::Error::ConnectionFailed) for
///   everything else
///
/// Connectors must not retry; the loop reports the failure to its caller.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to `url`, identifying as `app_id`
    async fn connect(&self, url: &str, app_id: &str) -> crate::Result<Connection>;

    /// Get the transport name (for logging/debugging)
    fn transport_name(&self) -> &'static str;
}

/// Write half of an open connection
#[async_trait]
pub trait FrameSink: Send {
    /// Send a close notification to the peer
    ///
    /// The peer may already be gone, so callers treat failures as
    /// informational.
    async fn send_close(&mut self, reason: &str) -> crate::Result<()>;

    /// Tear down the connection
    async fn close(self: Box<Self>) -> crate::Result<()>;
}
