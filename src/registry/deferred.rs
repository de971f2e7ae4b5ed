//! # Deferred ("lazy") delivery: class directory and buffers.
//!
//! The lazy directory mirrors the live registry but is keyed by target
//! *class* - an interest declaration for a component that has no live
//! instance yet. Posts matching a lazy interest are buffered per class and
//! drained when an instance of that class finally registers.
//!
//! Buffers are capped per class (the source of this design grew them
//! unboundedly for classes that never instantiate); on overflow the oldest
//! entry is dropped and reported to diagnostics.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::BusError;
use crate::events::Envelope;
use crate::types::TypeKey;

use super::subscription::DeferredDescriptor;

/// Host collaborator that can bring a deferred consumer to life.
///
/// Invoked fire-and-forget with the target class when that class's buffer
/// transitions from empty to non-empty. The host is expected to
/// instantiate/launch the component, which then calls
/// [`Bus::register`](crate::Bus::register) and receives the buffered
/// events.
#[async_trait]
pub trait Materialize: Send + Sync {
    /// Requests materialization of `class`.
    async fn materialize(&self, class: TypeKey);
}

#[derive(Clone)]
struct DeferredEntry {
    class: TypeKey,
    name: &'static str,
}

#[derive(Default)]
struct DeferredIndexes {
    /// event type → interested classes.
    by_type: HashMap<TypeKey, Vec<DeferredEntry>>,
    /// class → event types it declared (for teardown).
    by_class: HashMap<TypeKey, Vec<TypeKey>>,
}

/// Class-keyed interest directory for one track.
#[derive(Default)]
pub(crate) struct DeferredRegistry {
    inner: Mutex<DeferredIndexes>,
}

impl DeferredRegistry {
    /// Registers a class-level interest declaration.
    pub(crate) fn insert(&self, class: TypeKey, descriptor: &DeferredDescriptor) -> Result<(), BusError> {
        let mut ix = self.inner.lock();
        let list = ix.by_type.entry(descriptor.event_type).or_default();
        if list.iter().any(|e| e.class == class && e.name == descriptor.name) {
            return Err(BusError::DuplicateSubscription {
                subscriber: class.name(),
                event_type: descriptor.event_type.name(),
                handler: descriptor.name,
            });
        }
        list.push(DeferredEntry {
            class,
            name: descriptor.name,
        });
        ix.by_class.entry(class).or_default().push(descriptor.event_type);
        Ok(())
    }

    /// Drops every declaration of `class`. Returns `false` when none existed.
    pub(crate) fn remove_class(&self, class: TypeKey) -> bool {
        let mut ix = self.inner.lock();
        let Some(types) = ix.by_class.remove(&class) else {
            return false;
        };
        for event_type in types {
            if let Some(list) = ix.by_type.get_mut(&event_type) {
                list.retain(|e| e.class != class);
                if list.is_empty() {
                    ix.by_type.remove(&event_type);
                }
            }
        }
        true
    }

    /// Whether any of `types` has at least one lazy interest. This is the
    /// eager check that keeps events nobody wants lazily from buffering.
    pub(crate) fn has_any(&self, types: &[TypeKey]) -> bool {
        let ix = self.inner.lock();
        types.iter().any(|t| ix.by_type.contains_key(t))
    }

    /// Classes interested in any of `types`, deduplicated, discovery order.
    pub(crate) fn matching_classes(&self, types: &[TypeKey]) -> Vec<TypeKey> {
        let ix = self.inner.lock();
        let mut classes = Vec::new();
        for t in types {
            for entry in ix.by_type.get(t).into_iter().flatten() {
                if !classes.contains(&entry.class) {
                    classes.push(entry.class);
                }
            }
        }
        classes
    }
}

/// Outcome of buffering one event for one class.
pub(crate) struct BufferPush {
    /// The buffer went from empty to non-empty (materializer trigger).
    pub(crate) became_nonempty: bool,
    /// The entry evicted to make room, if the buffer was full.
    pub(crate) dropped: Option<Envelope>,
}

/// Per-class event buffers, capped.
pub(crate) struct DeferredBuffers {
    capacity: usize,
    inner: Mutex<HashMap<TypeKey, VecDeque<Envelope>>>,
}

impl DeferredBuffers {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn push(&self, class: TypeKey, env: Envelope) -> BufferPush {
        let mut map = self.inner.lock();
        let buffer = map.entry(class).or_default();
        let became_nonempty = buffer.is_empty();
        let dropped = if buffer.len() == self.capacity {
            buffer.pop_front()
        } else {
            None
        };
        buffer.push_back(env);
        BufferPush {
            became_nonempty,
            dropped,
        }
    }

    /// Takes the whole buffer of `class`, oldest first.
    pub(crate) fn drain(&self, class: TypeKey) -> Vec<Envelope> {
        self.inner
            .lock()
            .remove(&class)
            .map(|buf| buf.into_iter().collect())
            .unwrap_or_default()
    }

    pub(crate) fn clear(&self) {
        self.inner.lock().clear();
    }
}
