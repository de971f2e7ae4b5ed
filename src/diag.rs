//! # Diagnostics sink.
//!
//! The core never logs directly. Everything it would say - a
//! double-unregister, a contained handler panic, an unconsumed post, a
//! deferred buffer eviction - goes through the [`Diagnostics`] trait, so
//! hosts can route notices into their own telemetry. The built-in
//! [`LogSink`] writes through `tracing` with severities matching the weight
//! of each notice.

use crate::registry::Track;
use crate::types::TypeKey;

/// A notice the dispatcher wants the host to know about.
///
/// None of these are errors of the core: usage errors are returned as
/// [`BusError`](crate::BusError), and notices are fire-and-forget.
#[non_exhaustive]
#[derive(Clone, Debug)]
pub enum Diag {
    /// `unregister` was called for a subscriber with no live registration.
    DoubleUnregister {
        /// Concrete type of the component.
        class: TypeKey,
    },
    /// A handler panicked during delivery; the panic was contained.
    HandlerPanic {
        /// Track the delivery ran on.
        track: Track,
        /// Concrete type of the failing subscriber.
        subscriber: TypeKey,
        /// Declared name of the failing handler.
        handler: &'static str,
        /// Concrete type of the event being delivered.
        event: TypeKey,
        /// Extracted panic message.
        message: String,
    },
    /// A post matched no live and no deferred subscription.
    Unhandled {
        /// Track the post ran on.
        track: Track,
        /// Concrete type of the unconsumed event.
        event: TypeKey,
    },
    /// A deferred buffer hit its capacity; the oldest entry was dropped.
    DeferredOverflow {
        /// Target class whose buffer overflowed.
        class: TypeKey,
        /// Concrete type of the dropped event.
        dropped: TypeKey,
    },
    /// A delivery was dropped because the bus was already shut down.
    QueueClosed {
        /// Track the delivery belonged to.
        track: Track,
        /// Concrete type of the dropped event.
        event: TypeKey,
    },
}

/// Pluggable sink for dispatcher notices.
pub trait Diagnostics: Send + Sync {
    /// Consumes a single notice. Called on whatever thread produced it;
    /// keep it quick and never panic.
    fn report(&self, diag: Diag);
}

/// Stock sink writing through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl Diagnostics for LogSink {
    fn report(&self, diag: Diag) {
        match diag {
            Diag::DoubleUnregister { class } => {
                tracing::warn!(class = %class, "unregister called for a subscriber that was not registered");
            }
            Diag::HandlerPanic {
                track,
                subscriber,
                handler,
                event,
                message,
            } => {
                tracing::error!(
                    ?track,
                    subscriber = %subscriber,
                    handler,
                    event = %event,
                    message = %message,
                    "handler panicked during delivery"
                );
            }
            Diag::Unhandled { track, event } => {
                tracing::debug!(?track, event = %event, "no subscribers for posted event");
            }
            Diag::DeferredOverflow { class, dropped } => {
                tracing::warn!(class = %class, dropped = %dropped, "deferred buffer full, dropped oldest event");
            }
            Diag::QueueClosed { track, event } => {
                tracing::warn!(?track, event = %event, "delivery dropped, bus already shut down");
            }
        }
    }
}
