//! # Engine configuration.
//!
//! [`BusConfig`] centralizes every knob of the dispatch core. It is
//! assembled once through [`BusBuilder`](crate::BusBuilder) and immutable
//! after `build()`.
//!
//! ## Field semantics
//! - `event_inheritance` / `fault_inheritance`: lineage matching per track;
//!   off means exact concrete type only.
//! - `emit_unhandled_events` / `emit_unhandled_faults`: whether a post that
//!   matches nothing produces an [`UnhandledEvent`](crate::UnhandledEvent)
//!   on its track (a diagnostics notice is reported either way).
//! - `panic_policy`: what happens when a handler panics (see
//!   [`PanicPolicy`]).
//! - `deferred_capacity`: per-class cap of the deferred buffers (min 1;
//!   clamped).

use crate::registry::Track;

/// What to do when a delivery handler panics.
///
/// Containment is always per delivery - a panicking handler never aborts
/// sibling deliveries or the engine. The three flags compose:
///
/// - `log`: report the panic to the diagnostics sink.
/// - `emit_fault_event`: post a [`DeliveryFailed`](crate::DeliveryFailed)
///   on the failing subscription's track, carrying the cause, the original
///   event and the failing subscriber identity. A panic while delivering a
///   `DeliveryFailed` is never resurfaced as another failure event - it is
///   only reported to diagnostics.
/// - `rethrow`: resume the unwind on the delivering thread after the other
///   two flags are applied. For inline deliveries that is the posting
///   thread; for queued modes it takes the consumer down - a configuration
///   for crash-fast hosts.
#[derive(Clone, Copy, Debug)]
pub struct PanicPolicy {
    /// Report contained panics to the diagnostics sink.
    pub log: bool,
    /// Post a `DeliveryFailed` event on the failing track.
    pub emit_fault_event: bool,
    /// Resume the unwind on the delivering thread.
    pub rethrow: bool,
}

impl Default for PanicPolicy {
    /// Log and emit a failure event; do not rethrow.
    fn default() -> Self {
        Self {
            log: true,
            emit_fault_event: true,
            rethrow: false,
        }
    }
}

/// Global configuration for a [`Bus`](crate::Bus) instance.
#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Lineage matching for the events track.
    pub event_inheritance: bool,
    /// Lineage matching for the faults track.
    pub fault_inheritance: bool,
    /// Emit [`UnhandledEvent`](crate::UnhandledEvent) on the events track.
    pub emit_unhandled_events: bool,
    /// Emit [`UnhandledEvent`](crate::UnhandledEvent) on the faults track.
    pub emit_unhandled_faults: bool,
    /// Panic containment policy, shared by both tracks.
    pub panic_policy: PanicPolicy,
    /// Per-class capacity of the deferred buffers. Minimum 1 (clamped);
    /// on overflow the oldest buffered event is dropped and reported.
    pub deferred_capacity: usize,
}

impl BusConfig {
    pub(crate) fn inheritance_for(&self, track: Track) -> bool {
        match track {
            Track::Events => self.event_inheritance,
            Track::Faults => self.fault_inheritance,
        }
    }

    pub(crate) fn emit_unhandled_for(&self, track: Track) -> bool {
        match track {
            Track::Events => self.emit_unhandled_events,
            Track::Faults => self.emit_unhandled_faults,
        }
    }

    /// Returns the deferred capacity clamped to a minimum of 1.
    #[inline]
    pub fn deferred_capacity_clamped(&self) -> usize {
        self.deferred_capacity.max(1)
    }
}

impl Default for BusConfig {
    /// Default configuration:
    ///
    /// - lineage matching on for both tracks
    /// - unhandled-event emission on for both tracks
    /// - `PanicPolicy::default()` (log + emit, no rethrow)
    /// - `deferred_capacity = 64`
    fn default() -> Self {
        Self {
            event_inheritance: true,
            fault_inheritance: true,
            emit_unhandled_events: true,
            emit_unhandled_faults: true,
            panic_policy: PanicPolicy::default(),
            deferred_capacity: 64,
        }
    }
}
