//! Core traits for Protos providers
//!
//! This module defines the abstract interfaces that transport implementations
//! must follow.
//!
//! - [`Connector`]: Open the persistent notification connection
//! - [`FrameSink`]: Write side of an open connection (close handshake)

pub mod transport;

pub use transport::{Connection, Connector, Frame, FrameSink, FrameStream};
