//! Handler registry
//!
//! Maps each [`EventKind`] to a single handler. Registering a handler for a
//! kind replaces the previous one, so the last registration wins.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use protos_core::{Event, EventKind, HandlerRegistry};
//!
//! # fn main() -> protos_core::Result<()> {
//! let mut handlers = HandlerRegistry::new();
//!
//! handlers.register(EventKind::Timer, |_event: Event| async move {
//!     // re-query the host and reconcile
//!     Ok(())
//! })?;
//!
//! // Kinds can also be given by name
//! handlers.register("terminate", |_event: Event| async move { Ok(()) })?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Ownership
//!
//! The registry is moved into the [`EventLoop`](crate::EventLoop) that uses
//! it. Handlers are registered before the loop starts and are invoked one at
//! a time from the loop's control task, so no locking is needed.

use crate::error::{Error, Result};
use crate::event::{Event, EventKind};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

/// Result type returned by handlers
pub type HandlerResult = anyhow::Result<()>;

/// Boxed future for handler results
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for event handlers
///
/// Implemented for every `Fn(Event) -> impl Future<Output = HandlerResult>`
/// closure, so most callers never name it.
pub trait EventHandler: Send + Sync + 'static {
    /// Handle one event
    fn call(&self, event: Event) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> EventHandler for F
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, event: Event) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self)(event))
    }
}

/// Registry of event handlers, one per event kind
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<EventKind, Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closure as the handler for `kind`
    ///
    /// `kind` is either an [`EventKind`] or its name. Names outside the
    /// supported set fail with [`Error::UnsupportedKind`] and leave the
    /// registry untouched.
    pub fn register<K, F, Fut>(&mut self, kind: K, handler: F) -> Result<()>
    where
        K: TryInto<EventKind>,
        Error: From<<K as TryInto<EventKind>>::Error>,
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register_handler(kind, handler)
    }

    /// Register any [`EventHandler`] implementation as the handler for `kind`
    pub fn register_handler<K, H>(&mut self, kind: K, handler: H) -> Result<()>
    where
        K: TryInto<EventKind>,
        Error: From<<K as TryInto<EventKind>>::Error>,
        H: EventHandler,
    {
        let kind = kind.try_into()?;
        if self.handlers.insert(kind, Arc::new(handler)).is_some() {
            debug!("Replaced {} handler", kind);
        } else {
            debug!("Registered {} handler", kind);
        }
        Ok(())
    }

    /// Check if a handler is bound to `kind`
    pub fn has_handler(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// List the kinds that have a handler
    pub fn registered_kinds(&self) -> Vec<EventKind> {
        EventKind::ALL
            .into_iter()
            .filter(|kind| self.has_handler(*kind))
            .collect()
    }

    /// Invoke the handler bound to the event's kind
    ///
    /// # Returns
    ///
    /// - `Ok(())`: the handler ran and succeeded
    /// - `Err(Error::NoHandlerRegistered)`: nothing is bound to this kind
    /// - `Err(Error::Handler)`: the handler reported a failure
    pub async fn dispatch(&self, event: Event) -> Result<()> {
        let kind = event.kind();
        let handler = self
            .handlers
            .get(&kind)
            .ok_or(Error::NoHandlerRegistered(kind))?;

        debug!("Dispatching {} event", kind);
        handler
            .call(event)
            .await
            .map_err(|e| Error::handler(kind, format!("{:#}", e)))
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.registered_kinds())
            .finish()
    }
}
