// # protos-core
//
// Core library for applications that provide resources to a Protos host.
//
// ## Architecture Overview
//
// - **EventLoop**: Holds the persistent notification connection, merges
//   inbound messages, the reconciliation timer and shutdown signals, and
//   dispatches events to handlers
// - **HandlerRegistry**: One handler per event kind, passed to the loop
// - **Connector**: Trait for opening the notification connection (the
//   WebSocket implementation lives in `protos-ws`)
// - **ProtosClient**: REST client for resources, provider registration,
//   instance info and user authentication
//
// ## Design Principles
//
// 1. **One session per registry**: `EventLoop::run` consumes the loop
// 2. **Sequential handlers**: Events are handled one at a time, in the order
//    they are observed
// 3. **Handshake on every exit**: Shutdown and failures alike close the
//    connection and notify the `Terminate` handler
// 4. **No hidden retries**: Failed requests and connections are reported,
//    never retried

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod event_loop;
pub mod handlers;
pub mod message;
pub mod resource;
pub mod traits;

// Re-export core types for convenience
pub use client::{AppInfo, ProtosClient, UserInfo};
pub use config::{APP_ID_ENV_VAR, ProtosConfig, app_id_from_env};
pub use error::{Error, Result};
pub use event::{Event, EventKind};
pub use event_loop::{EventLoop, LoopState};
pub use handlers::{EventHandler, HandlerRegistry, HandlerResult};
pub use message::{InboundMessage, Update};
pub use resource::{Certificate, DnsRecord, Resource, ResourceStatus, ResourceValue, Resources};
pub use traits::{Connection, Connector, FrameSink};
