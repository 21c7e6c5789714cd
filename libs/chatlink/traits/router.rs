//! Inbound Event Handling
//!
//! Every inbound event carries a name and a JSON payload. The
//! [`EventRouter`](crate::core::router::EventRouter) maps each name to exactly one
//! handler implementing this trait.
//!
//! # Architecture
//!
//! ```text
//! Channel → (name, payload) → EventRouter → Handler(ctx, payload)
//!                                  │
//!                                  └─ error / panic caught and logged here
//! ```
//!
//! # Ordering Guarantees
//!
//! Handlers run one at a time on the manager's driver task, in arrival order.

use crate::Result;
use serde_json::Value;

/// Handler for one inbound event name
///
/// `C` is the context the handler mutates (the manager's driver state in
/// production, any test double in tests).
///
/// # Example
///
/// ```ignore
/// struct Counter(usize);
///
/// let router = EventRouter::<Counter>::new()
///     .route("typing", |ctx: &mut Counter, _payload| {
///         ctx.0 += 1;
///         Ok(())
///     });
/// ```
pub trait EventHandler<C>: Send + Sync + 'static {
    /// Handle one event payload
    ///
    /// # Errors
    /// Returned errors are logged by the router; dispatch of later events
    /// continues normally.
    fn handle(&self, ctx: &mut C, payload: Value) -> Result<()>;
}

impl<C, F> EventHandler<C> for F
where
    F: Fn(&mut C, Value) -> Result<()> + Send + Sync + 'static,
{
    fn handle(&self, ctx: &mut C, payload: Value) -> Result<()> {
        self(ctx, payload)
    }
}
