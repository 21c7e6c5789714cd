//! Inbound event dispatch
//!
//! A fixed table from event name to one handler, built once when the
//! manager is constructed. Dispatch is the failure boundary: a handler that
//! returns an error or panics is logged and the next event is dispatched
//! normally.

use crate::traits::*;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error};

/// Result of dispatching one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The handler ran and succeeded
    Handled,
    /// No handler is registered for this name
    Unrouted,
    /// The handler returned an error or panicked
    Failed(String),
}

/// Dispatch table from inbound event name to handler
pub struct EventRouter<C> {
    routes: HashMap<String, Box<dyn EventHandler<C>>>,
}

impl<C: 'static> EventRouter<C> {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Register the handler for `name`, replacing any previous one
    pub fn route<H>(mut self, name: impl Into<String>, handler: H) -> Self
    where
        H: EventHandler<C>,
    {
        self.routes.insert(name.into(), Box::new(handler));
        self
    }

    /// Check if a handler is registered for `name`
    pub fn handles(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    /// Get the number of registered routes
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Run the handler registered for `name`
    pub fn dispatch(&self, ctx: &mut C, name: &str, payload: Value) -> Dispatch {
        let handler = match self.routes.get(name) {
            Some(handler) => handler,
            None => {
                debug!("No handler configured for event: {}", name);
                return Dispatch::Unrouted;
            }
        };

        match catch_unwind(AssertUnwindSafe(|| handler.handle(ctx, payload))) {
            Ok(Ok(())) => Dispatch::Handled,
            Ok(Err(e)) => {
                error!("Handler error for event '{}': {}", name, e);
                Dispatch::Failed(e.to_string())
            }
            Err(panic) => {
                let reason = panic_message(&*panic);
                error!("Handler for event '{}' panicked: {}", name, reason);
                Dispatch::Failed(reason)
            }
        }
    }
}

impl<C: 'static> Default for EventRouter<C> {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
