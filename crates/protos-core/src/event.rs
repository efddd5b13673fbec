//! Events delivered to provider handlers
//!
//! Every event the loop produces belongs to exactly one [`EventKind`].
//! Kinds are also addressable by their wire names (`newmessage`, `timer`,
//! `terminate`), which is how handlers are bound from configuration.

use crate::error::Error;
use crate::message::Update;
use std::fmt;
use std::str::FromStr;

/// Category of an event a handler can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// An inbound payload arrived on the connection
    NewMessage,
    /// The periodic reconciliation tick fired
    Timer,
    /// The loop is shutting down
    Terminate,
}

impl EventKind {
    /// All supported kinds
    pub const ALL: [EventKind; 3] = [EventKind::NewMessage, EventKind::Timer, EventKind::Terminate];

    /// Name of the kind as used in configuration and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NewMessage => "newmessage",
            EventKind::Timer => "timer",
            EventKind::Terminate => "terminate",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newmessage" => Ok(EventKind::NewMessage),
            "timer" => Ok(EventKind::Timer),
            "terminate" => Ok(EventKind::Terminate),
            other => Err(Error::UnsupportedKind(other.to_string())),
        }
    }
}

impl TryFrom<&str> for EventKind {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// An event together with its arguments
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A decoded `update` message
    NewMessage(Update),
    /// Periodic tick (also fired once when the loop starts)
    Timer,
    /// Session teardown
    Terminate,
}

impl Event {
    /// The kind this event is dispatched under
    pub fn kind(&self) -> EventKind {
        match self {
            Event::NewMessage(_) => EventKind::NewMessage,
            Event::Timer => EventKind::Timer,
            Event::Terminate => EventKind::Terminate,
        }
    }

    /// The update payload, for `NewMessage` events
    pub fn update(&self) -> Option<&Update> {
        match self {
            Event::NewMessage(update) => Some(update),
            _ => None,
        }
    }
}
