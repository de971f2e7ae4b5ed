//! # System events the dispatcher emits about itself.
//!
//! Both types are posted on the track they describe and both are exempt
//! from triggering further system notifications: an [`UnhandledEvent`] that
//! nobody consumes is dropped, and a panic while delivering a
//! [`DeliveryFailed`] is only reported to diagnostics, never resurfaced as
//! another failure event.

use crate::registry::Track;
use crate::types::TypeKey;

use super::envelope::Envelope;

/// Posted when an event matched no live and no deferred subscription.
///
/// Emission is per-track opt-out via
/// [`BusConfig`](crate::BusConfig)::`emit_unhandled_*`.
pub struct UnhandledEvent {
    /// Track the original post ran on.
    pub track: Track,
    /// The unconsumed post.
    pub envelope: Envelope,
}

/// Posted when a handler panicked during delivery and the panic policy asks
/// for a failure event.
pub struct DeliveryFailed {
    /// Track the failing delivery ran on.
    pub track: Track,
    /// The event whose delivery failed.
    pub envelope: Envelope,
    /// Concrete type of the failing subscriber.
    pub subscriber: TypeKey,
    /// Declared name of the failing handler.
    pub handler: &'static str,
    /// Extracted panic message.
    pub message: String,
}

/// Whether `key` is one of the system notification types (the recursion
/// guard for both the unhandled and the failure path).
pub(crate) fn is_system_event(key: TypeKey) -> bool {
    key == TypeKey::of::<UnhandledEvent>() || key == TypeKey::of::<DeliveryFailed>()
}
