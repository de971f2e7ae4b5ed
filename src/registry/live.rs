//! # Live subscription registry.
//!
//! Two consistent indexes per track: event type → priority-ordered
//! subscription list, and subscriber → bound event types (for teardown).
//!
//! ## Rules
//! - Per-type lists are **copy-on-write**: every mutation installs a new
//!   `Arc<Vec<_>>`, so a delivery loop iterating a snapshot is never
//!   invalidated by a concurrent unregister.
//! - Lists stay sorted descending by priority; insertion is stable at the
//!   first strictly lower priority, so equal priorities preserve
//!   registration order.
//! - Removal flips `active` before the entry leaves the list, which is the
//!   race contract with deliveries already sitting in a queue.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::BusError;
use crate::types::TypeKey;

use super::subscription::{SubscriberId, Subscription};

type SubscriptionList = Arc<Vec<Arc<Subscription>>>;

#[derive(Default)]
struct Indexes {
    by_type: HashMap<TypeKey, SubscriptionList>,
    by_subscriber: HashMap<SubscriberId, Vec<TypeKey>>,
}

/// Forward/reverse subscription directory for one track.
#[derive(Default)]
pub(crate) struct LiveRegistry {
    inner: Mutex<Indexes>,
}

impl LiveRegistry {
    /// Inserts a subscription preserving priority order.
    ///
    /// Fails when an equal subscription (same subscriber, event type and
    /// handler name) already exists.
    pub(crate) fn insert(&self, sub: Arc<Subscription>) -> Result<(), BusError> {
        let mut ix = self.inner.lock();
        let list = ix.by_type.entry(sub.event_type).or_default();
        if list
            .iter()
            .any(|s| s.subscriber == sub.subscriber && s.name == sub.name)
        {
            return Err(BusError::DuplicateSubscription {
                subscriber: sub.subscriber_class.name(),
                event_type: sub.event_type.name(),
                handler: sub.name,
            });
        }

        let mut next: Vec<Arc<Subscription>> = Vec::with_capacity(list.len() + 1);
        next.extend(list.iter().cloned());
        let pos = next
            .iter()
            .position(|s| s.priority < sub.priority)
            .unwrap_or(next.len());
        next.insert(pos, Arc::clone(&sub));
        *list = Arc::new(next);

        ix.by_subscriber
            .entry(sub.subscriber)
            .or_default()
            .push(sub.event_type);
        Ok(())
    }

    /// Removes every subscription of `id`, marking each inactive first.
    ///
    /// Returns `false` when the subscriber had no registration.
    pub(crate) fn remove_all(&self, id: SubscriberId) -> bool {
        let mut ix = self.inner.lock();
        let Some(types) = ix.by_subscriber.remove(&id) else {
            return false;
        };
        for event_type in types {
            let Some(list) = ix.by_type.get_mut(&event_type) else {
                continue;
            };
            let mut next = Vec::with_capacity(list.len());
            for sub in list.iter() {
                if sub.subscriber == id {
                    sub.active.store(false, Ordering::Release);
                } else {
                    next.push(Arc::clone(sub));
                }
            }
            if next.is_empty() {
                ix.by_type.remove(&event_type);
            } else {
                *list = Arc::new(next);
            }
        }
        true
    }

    /// Stable snapshot of the subscription list for `event_type`.
    pub(crate) fn snapshot(&self, event_type: TypeKey) -> Option<SubscriptionList> {
        self.inner.lock().by_type.get(&event_type).cloned()
    }

    /// Whether any of `types` has at least one subscription.
    pub(crate) fn has_any(&self, types: &[TypeKey]) -> bool {
        let ix = self.inner.lock();
        types.iter().any(|t| ix.by_type.contains_key(t))
    }

    pub(crate) fn is_registered(&self, id: SubscriberId) -> bool {
        self.inner.lock().by_subscriber.contains_key(&id)
    }
}
