//! # The post protocol.
//!
//! One drain loop per calling thread per (engine, track): `post` appends to
//! the thread's pending queue and, unless a drain is already running,
//! claims it - popping events one at a time, resolving the matching types,
//! and routing every matching subscription in priority order. A nested post
//! from inside a delivery only enqueues, which keeps same-thread delivery
//! strictly FIFO.
//!
//! Deferred posting mirrors the same protocol on a second lane, but instead
//! of invoking handlers it appends the event to the buffers of every lazily
//! interested class - and only runs at all when the lazy directory has a
//! matching interest, so events nobody wants lazily never buffer.

use std::sync::Arc;

use crate::core::BusCore;
use crate::diag::Diag;
use crate::error::BusError;
use crate::events::{is_system_event, Envelope, UnhandledEvent};
use crate::registry::Track;
use crate::types::TypeKey;

use super::router;
use super::state::{self, StateKey};

/// Resets the drain bookkeeping even when a rethrowing panic policy unwinds
/// through the loop.
struct DrainGuard(StateKey);

impl Drop for DrainGuard {
    fn drop(&mut self) {
        state::finish(self.0);
    }
}

/// Entry point for posting `env` on `track`.
pub(crate) fn post(core: &Arc<BusCore>, track: Track, env: Envelope) {
    let key = StateKey::immediate(core.id, track);
    state::enqueue(key, env);
    if !state::try_begin(key) {
        return;
    }
    let _guard = DrainGuard(key);
    // Captured once for the whole drain.
    let on_primary = core.is_primary();
    while let Some(env) = state::next(key) {
        dispatch_one(core, track, &env, on_primary, key);
    }
}

/// Validates and applies a cancellation for the event identified by
/// `event_ptr`, which must be the inline delivery currently running on the
/// calling thread.
pub(crate) fn cancel(core: &Arc<BusCore>, track: Track, event_ptr: *const ()) -> Result<(), BusError> {
    state::cancel(StateKey::immediate(core.id, track), event_ptr)
}

fn dispatch_one(core: &Arc<BusCore>, track: Track, env: &Envelope, on_primary: bool, lane: StateKey) {
    let te = core.track(track);
    let exact = [env.key()];
    let resolved;
    let types: &[TypeKey] = if te.inheritance {
        resolved = core.resolver.types_for(env.key());
        &resolved
    } else {
        &exact
    };

    let mut matched = false;
    'types: for event_type in types {
        let Some(snapshot) = te.registry.snapshot(*event_type) else {
            continue;
        };
        for sub in snapshot.iter() {
            matched = true;
            if !router::route(core, sub, env, on_primary, lane) {
                // Canceled: the remaining subscriptions for this event are
                // skipped; already-processed deliveries stand.
                break 'types;
            }
        }
    }

    let deferred = post_deferred(core, track, env, types);

    if !matched && !deferred && !is_system_event(env.key()) {
        core.diag.report(Diag::Unhandled {
            track,
            event: env.key(),
        });
        if te.emit_unhandled {
            post(
                core,
                track,
                Envelope::new(UnhandledEvent {
                    track,
                    envelope: env.clone(),
                }),
            );
        }
    }
}

/// The deferred lane: buffers `env` for every lazily interested class.
/// Returns whether any lazy interest matched.
fn post_deferred(core: &Arc<BusCore>, track: Track, env: &Envelope, types: &[TypeKey]) -> bool {
    let te = core.track(track);
    if !te.deferred.has_any(types) {
        return false;
    }
    let key = StateKey::deferred(core.id, track);
    state::enqueue(key, env.clone());
    if !state::try_begin(key) {
        return true;
    }
    let _guard = DrainGuard(key);
    while let Some(env) = state::next(key) {
        buffer_one(core, track, &env);
    }
    true
}

fn buffer_one(core: &Arc<BusCore>, track: Track, env: &Envelope) {
    let te = core.track(track);
    let exact = [env.key()];
    let resolved;
    let types: &[TypeKey] = if te.inheritance {
        resolved = core.resolver.types_for(env.key());
        &resolved
    } else {
        &exact
    };
    for class in te.deferred.matching_classes(types) {
        let outcome = te.buffers.push(class, env.clone());
        if let Some(dropped) = outcome.dropped {
            core.diag.report(Diag::DeferredOverflow {
                class,
                dropped: dropped.key(),
            });
        }
        if outcome.became_nonempty {
            core.notify_materializer(class);
        }
    }
}
