//! # Per-thread posting state.
//!
//! Each OS thread owns one posting state per (engine instance, track,
//! lane): the pending-event queue, the dispatch reentrancy flag, and the
//! cancellation bookkeeping for the inline delivery in flight.
//!
//! ## Reentrancy contract
//! If a thread's state is already dispatching, a nested `post` only
//! enqueues; the outer drain loop picks the event up. That is what makes
//! events posted from inside a same-thread delivery strictly FIFO.
//!
//! Posting states are keyed by engine id because `thread_local!` storage is
//! process-global while the state must be per engine *instance*.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use crate::error::BusError;
use crate::events::Envelope;
use crate::registry::{DeliveryMode, Track};

/// Immediate dispatch vs. deferred buffering - two mirrored protocols.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Lane {
    Immediate,
    Deferred,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct StateKey {
    bus: u64,
    track: Track,
    lane: Lane,
}

impl StateKey {
    pub(crate) fn immediate(bus: u64, track: Track) -> Self {
        Self {
            bus,
            track,
            lane: Lane::Immediate,
        }
    }

    pub(crate) fn deferred(bus: u64, track: Track) -> Self {
        Self {
            bus,
            track,
            lane: Lane::Deferred,
        }
    }
}

#[derive(Default)]
struct PostingState {
    queue: VecDeque<Envelope>,
    dispatching: bool,
    canceled: bool,
    /// The envelope and mode of the inline delivery currently running on
    /// this thread, if any - the scope cancellation validates against.
    current: Option<(Envelope, DeliveryMode)>,
}

thread_local! {
    static STATES: RefCell<HashMap<StateKey, PostingState>> = RefCell::new(HashMap::new());
}

/// Runs `f` on the state for `key`. Borrows are short: the handler
/// invocation itself always happens outside this closure, so nested posts
/// re-enter cleanly.
fn with_state<R>(key: StateKey, f: impl FnOnce(&mut PostingState) -> R) -> R {
    STATES.with(|states| f(states.borrow_mut().entry(key).or_default()))
}

pub(crate) fn enqueue(key: StateKey, env: Envelope) {
    with_state(key, |s| s.queue.push_back(env));
}

/// Claims the drain loop. Returns `false` when this thread is already
/// dispatching for `key` (the nested-post case).
pub(crate) fn try_begin(key: StateKey) -> bool {
    with_state(key, |s| {
        if s.dispatching {
            false
        } else {
            s.dispatching = true;
            true
        }
    })
}

pub(crate) fn next(key: StateKey) -> Option<Envelope> {
    with_state(key, |s| s.queue.pop_front())
}

/// Ends the drain loop, clearing the dispatch and cancellation bookkeeping.
/// Pending queue entries survive for the next post on this thread.
pub(crate) fn finish(key: StateKey) {
    with_state(key, |s| {
        s.dispatching = false;
        s.canceled = false;
        s.current = None;
    });
}

pub(crate) fn begin_inline(key: StateKey, env: &Envelope, mode: DeliveryMode) {
    with_state(key, |s| s.current = Some((env.clone(), mode)));
}

/// Clears the inline frame and consumes the cancellation flag. Returns
/// whether the delivery was canceled.
pub(crate) fn end_inline(key: StateKey) -> bool {
    with_state(key, |s| {
        s.current = None;
        std::mem::take(&mut s.canceled)
    })
}

/// Validates and applies a cancellation request for the event identified by
/// `event_ptr` (thin payload pointer).
pub(crate) fn cancel(key: StateKey, event_ptr: *const ()) -> Result<(), BusError> {
    with_state(key, |s| {
        let Some((current, mode)) = &s.current else {
            return Err(BusError::InvalidCancel {
                reason: "no delivery in flight on this thread",
            });
        };
        if !s.dispatching {
            return Err(BusError::InvalidCancel {
                reason: "only legal while a post is dispatching",
            });
        }
        if current.payload_ptr() != event_ptr {
            return Err(BusError::InvalidCancel {
                reason: "not the event currently being delivered",
            });
        }
        if *mode != DeliveryMode::Inline {
            return Err(BusError::InvalidCancel {
                reason: "only inline-mode deliveries can be canceled",
            });
        }
        s.canceled = true;
        Ok(())
    })
}
