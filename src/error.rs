//! Error types used by the polybus dispatch core.
//!
//! There is a single enum of **usage errors**, [`BusError`]: contract
//! violations by the caller (duplicate subscription, cancellation outside a
//! synchronous delivery, building an engine without a runtime). They are
//! fatal-by-contract - returned as `Err` and never retried internally.
//!
//! Consumer failures (a handler panicking during delivery) are *not* errors
//! of the core; they are contained per delivery and handled according to the
//! configured [`PanicPolicy`](crate::PanicPolicy).

use thiserror::Error;

/// # Usage errors raised by the dispatcher.
///
/// Every variant is a programming error on the caller's side, not a runtime
/// condition to recover from.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BusError {
    /// The subscriber already holds an equal subscription for this event type.
    ///
    /// Equality is `(subscriber identity, event type, handler name)` - a
    /// subscriber may not register the same named handler twice for one type.
    #[error("handler `{handler}` of `{subscriber}` is already subscribed to `{event_type}`")]
    DuplicateSubscription {
        /// Type name of the subscribing component.
        subscriber: &'static str,
        /// Name of the event type the duplicate targets.
        event_type: &'static str,
        /// Declared handler name.
        handler: &'static str,
    },

    /// `cancel_delivery` was called outside the scope where it is legal.
    ///
    /// Cancellation is only valid from inside an inline-mode delivery, on the
    /// delivering thread, for exactly the event being delivered.
    #[error("invalid delivery cancellation: {reason}")]
    InvalidCancel {
        /// What made the call invalid.
        reason: &'static str,
    },

    /// The engine was built without a reachable Tokio runtime.
    ///
    /// The unordered delivery pool and the materializer need a runtime
    /// handle; build the bus inside a runtime or pass one explicitly via
    /// [`BusBuilder::with_runtime`](crate::BusBuilder::with_runtime).
    #[error("no tokio runtime available; build inside a runtime or pass a handle explicitly")]
    NoRuntime,

    /// A dispatcher consumer thread could not be spawned.
    #[error("failed to spawn dispatcher thread: {source}")]
    Spawn {
        /// Underlying OS error.
        source: std::io::Error,
    },
}

impl BusError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use polybus::BusError;
    ///
    /// let err = BusError::InvalidCancel { reason: "no delivery in flight" };
    /// assert_eq!(err.as_label(), "invalid_cancel");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::DuplicateSubscription { .. } => "duplicate_subscription",
            BusError::InvalidCancel { .. } => "invalid_cancel",
            BusError::NoRuntime => "no_runtime",
            BusError::Spawn { .. } => "spawn_failed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            BusError::DuplicateSubscription {
                subscriber,
                event_type,
                handler,
            } => format!("duplicate subscription: {subscriber}::{handler} for {event_type}"),
            BusError::InvalidCancel { reason } => format!("invalid cancel: {reason}"),
            BusError::NoRuntime => "no tokio runtime available".to_string(),
            BusError::Spawn { source } => format!("spawn failed: {source}"),
        }
    }
}
