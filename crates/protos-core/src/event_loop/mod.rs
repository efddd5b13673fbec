//! Event notification loop
//!
//! The EventLoop is responsible for:
//! - Opening the persistent connection to the host
//! - Merging inbound messages, the reconciliation timer and the shutdown
//!   signal into one stream of events
//! - Dispatching each event to the registered handler
//! - Running the close handshake on every exit path
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   frames   ┌──────────────┐
//! │   reader    │──────────► │              │
//! │   (task)    │──errors──► │              │
//! └─────────────┘            │  EventLoop   │──── Event ────► HandlerRegistry
//! ┌─────────────┐   ticks    │  (control)   │
//! │   ticker    │──────────► │              │
//! └─────────────┘            │              │
//! ┌─────────────┐            │              │
//! │  shutdown   │──────────► │              │
//! └─────────────┘            └──────────────┘
//! ```
//!
//! ## States
//!
//! `Connecting → Running → Terminating → Closed`. A failed connection goes
//! straight from `Connecting` to `Closed`. Nothing is dispatched after
//! `Terminating` is entered, except the `Terminate` handler itself.
//!
//! ## Event Flow
//!
//! 1. Connect (no retry)
//! 2. Dispatch one `Timer` event before waiting on anything
//! 3. Wait for the first ready source, with no priority among them
//! 4. On shutdown or any failure: close frame (best effort), physical close,
//!    `Terminate` handler
//! 5. Return `Ok(())` for shutdown, the triggering error otherwise

mod reader;
mod signal;

pub use signal::shutdown_signal;

use crate::config::ProtosConfig;
use crate::error::{Error, Result};
use crate::event::{Event, EventKind};
use crate::handlers::HandlerRegistry;
use crate::message;
use crate::traits::{Connection, Connector, Frame, FrameSink};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Reason sent with the close frame
const CLOSE_REASON: &str = "terminating";

/// Lifecycle state of an event loop session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Opening the connection
    Connecting,
    /// Waiting for and dispatching events
    Running,
    /// Running the close handshake
    Terminating,
    /// Session over
    Closed,
}

impl LoopState {
    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: LoopState) -> bool {
        matches!(
            (self, next),
            (LoopState::Connecting, LoopState::Running)
                | (LoopState::Connecting, LoopState::Closed)
                | (LoopState::Running, LoopState::Terminating)
                | (LoopState::Running, LoopState::Closed)
                | (LoopState::Terminating, LoopState::Closed)
        )
    }
}

/// How the running phase ended
enum Exit {
    /// External shutdown signal
    Shutdown,
    /// Any failure while running
    Failed(Error),
}

/// Event notification loop
///
/// ## Lifecycle
///
/// 1. Register handlers on a [`HandlerRegistry`]
/// 2. Create with [`EventLoop::new()`], handing over the registry
/// 3. Start with [`EventLoop::run()`]; it returns when the session ends
///
/// `run` consumes the loop, so a registry serves exactly one session.
///
/// ## Threading
///
/// Handlers run one at a time on the task that called `run`. A slow handler
/// delays timer ticks and inbound messages alike.
pub struct EventLoop {
    /// Notification endpoint
    endpoint: String,

    /// App identity sent on the handshake
    app_id: String,

    /// Opens the connection
    connector: Box<dyn Connector>,

    /// Handlers, one per event kind
    handlers: HandlerRegistry,

    /// Capacity of the reader → loop frame queue
    inbound_queue_capacity: usize,

    /// Current state
    state: LoopState,

    /// State sender for external monitoring
    state_tx: mpsc::Sender<LoopState>,
}

impl EventLoop {
    /// Create a new event loop
    ///
    /// # Parameters
    ///
    /// - `config`: Provider configuration (endpoint, identity, capacities)
    /// - `connector`: Transport implementation
    /// - `handlers`: Handlers for this session
    ///
    /// # Returns
    ///
    /// A tuple of (loop, state_receiver) where state_receiver yields every
    /// state the loop enters
    pub fn new(
        config: &ProtosConfig,
        connector: Box<dyn Connector>,
        handlers: HandlerRegistry,
    ) -> Result<(Self, mpsc::Receiver<LoopState>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.state_channel_capacity);

        let event_loop = Self {
            endpoint: config.ws_url(),
            app_id: config.app_id.clone(),
            connector,
            handlers,
            inbound_queue_capacity: config.inbound_queue_capacity,
            state: LoopState::Connecting,
            state_tx: tx,
        };

        Ok((event_loop, rx))
    }

    /// Current state of the loop
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run the loop until SIGINT/SIGTERM or a fatal error
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Shutdown signal received, session closed cleanly
    /// - `Err(Error)`: The error that ended the session
    ///
    /// The signal listeners are installed before connecting, so a signal
    /// delivered during the initial `Timer` dispatch still ends the session
    /// through the close handshake.
    pub async fn run(self, poll_interval: Duration) -> Result<()> {
        let shutdown = shutdown_signal();
        self.run_until(poll_interval, shutdown).await
    }

    /// Run the loop until `shutdown` resolves or a fatal error occurs
    ///
    /// Identical to [`run`](Self::run) except for where the shutdown signal
    /// comes from. Embedders use this to tie the session to their own
    /// lifecycle.
    ///
    /// A zero `poll_interval` is rejected with `InvalidInput` before
    /// `Connecting` is entered, so the state stream stays empty for that
    /// session.
    pub async fn run_until<S>(mut self, poll_interval: Duration, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()> + Send,
    {
        if poll_interval.is_zero() {
            return Err(Error::invalid_input("Poll interval must be > 0"));
        }

        self.emit_state(LoopState::Connecting);
        info!(
            "Connecting to {} ({})",
            self.endpoint,
            self.connector.transport_name()
        );

        let Connection { frames, sink } =
            match self.connector.connect(&self.endpoint, &self.app_id).await {
                Ok(connection) => connection,
                Err(e) => {
                    error!("Connection failed: {}", e);
                    self.transition(LoopState::Closed);
                    return Err(e);
                }
            };

        self.transition(LoopState::Running);

        let (frame_tx, mut frame_rx) = mpsc::channel(self.inbound_queue_capacity);
        let (error_tx, mut error_rx) = oneshot::channel();
        let reader = tokio::spawn(reader::read_frames(frames, frame_tx, error_tx));

        // In case an update notification is missed, periodic timer events let
        // handlers re-derive the full state from the host
        let mut ticker = time::interval_at(Instant::now() + poll_interval, poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Initial reconciliation before relying on incremental updates
        let exit = match self.handlers.dispatch(Event::Timer).await {
            Ok(()) => {
                self.wait_for_exit(&mut ticker, &mut frame_rx, &mut error_rx, shutdown)
                    .await
            }
            Err(e) => Exit::Failed(e),
        };

        self.transition(LoopState::Terminating);
        self.terminate(sink, reader).await;
        self.transition(LoopState::Closed);

        match exit {
            Exit::Shutdown => {
                info!("Event loop stopped");
                Ok(())
            }
            Exit::Failed(e) => {
                error!("Event loop stopped: {}", e);
                Err(e)
            }
        }
    }

    /// Wait on all event sources until one of them ends the session
    async fn wait_for_exit<S>(
        &self,
        ticker: &mut Interval,
        frames: &mut mpsc::Receiver<Frame>,
        errors: &mut oneshot::Receiver<Error>,
        shutdown: S,
    ) -> Exit
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("Timer tick");
                    if let Err(e) = self.handlers.dispatch(Event::Timer).await {
                        return Exit::Failed(e);
                    }
                }

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    return Exit::Shutdown;
                }

                result = &mut *errors => {
                    let err = result
                        .unwrap_or_else(|_| Error::transport("Frame reader stopped unexpectedly"));
                    return Exit::Failed(err);
                }

                Some(frame) = frames.recv() => {
                    if let Err(e) = self.handle_frame(&frame).await {
                        return Exit::Failed(e);
                    }
                }
            }
        }
    }

    /// Decode one inbound frame and dispatch it
    async fn handle_frame(&self, frame: &[u8]) -> Result<()> {
        let update = message::decode_update(frame)?;
        self.handlers
            .dispatch(Event::NewMessage(update))
            .await
            .map_err(Error::processing)
    }

    /// Close handshake followed by the `Terminate` handler
    ///
    /// Runs exactly once per session. Errors are logged, never returned.
    async fn terminate(&self, mut sink: Box<dyn FrameSink>, reader: JoinHandle<()>) {
        // The peer may already be gone
        if let Err(e) = sink.send_close(CLOSE_REASON).await {
            debug!("Ignoring close frame error: {}", e);
        }

        reader.abort();
        if let Err(e) = reader.await
            && e.is_panic()
        {
            warn!("Frame reader panicked: {}", e);
        }

        if let Err(e) = sink.close().await {
            warn!("Error while closing connection: {}", e);
        }

        if self.handlers.has_handler(EventKind::Terminate)
            && let Err(e) = self.handlers.dispatch(Event::Terminate).await
        {
            debug!("Ignoring terminate handler result: {}", e);
        }
    }

    fn transition(&mut self, next: LoopState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!("Event loop {:?} -> {:?}", self.state, next);
        self.state = next;
        self.emit_state(next);
    }

    fn emit_state(&self, state: LoopState) {
        match self.state_tx.try_send(state) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("State channel full, dropping {:?} notification", state);
            }
            // Nobody is watching
            Err(TrySendError::Closed(_)) => {}
        }
    }
}
