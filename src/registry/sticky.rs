//! # Sticky store.
//!
//! At most one retained value per concrete event type; a new sticky post of
//! the same type overwrites, never appends. Guarded by its own lock,
//! distinct from the registry lock, so sticky traffic never contends with
//! priority-order mutation.

use std::any::Any;
use std::collections::HashMap;

use parking_lot::Mutex;

use crate::events::Envelope;
use crate::types::TypeKey;

#[derive(Default)]
pub(crate) struct StickyStore {
    inner: Mutex<HashMap<TypeKey, Envelope>>,
}

impl StickyStore {
    /// Stores `env` under its concrete type, replacing any previous value.
    pub(crate) fn put(&self, env: Envelope) {
        self.inner.lock().insert(env.key(), env);
    }

    pub(crate) fn get(&self, key: TypeKey) -> Option<Envelope> {
        self.inner.lock().get(&key).cloned()
    }

    pub(crate) fn remove(&self, key: TypeKey) -> Option<Envelope> {
        self.inner.lock().remove(&key)
    }

    /// Removes the retained value of `E`'s type only if it equals `value`.
    /// Returns whether a removal happened.
    pub(crate) fn remove_value<E: Any + Send + Sync + PartialEq>(&self, value: &E) -> bool {
        let key = TypeKey::of::<E>();
        let mut map = self.inner.lock();
        let matches = map
            .get(&key)
            .and_then(|env| env.downcast_ref::<E>())
            .is_some_and(|stored| stored == value);
        if matches {
            map.remove(&key);
        }
        matches
    }

    pub(crate) fn clear(&self) {
        self.inner.lock().clear();
    }

    /// First retained value whose type appears in `types`, in lineage order.
    pub(crate) fn first_match(&self, types: &[TypeKey]) -> Option<Envelope> {
        let map = self.inner.lock();
        types.iter().find_map(|t| map.get(t).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_overwrites_per_type() {
        let store = StickyStore::default();
        store.put(Envelope::new(1_u32));
        store.put(Envelope::new(2_u32));
        store.put(Envelope::new("side".to_string()));

        let kept = store.get(TypeKey::of::<u32>()).unwrap();
        assert_eq!(kept.downcast_ref::<u32>(), Some(&2));
        assert!(store.get(TypeKey::of::<String>()).is_some());
    }

    #[test]
    fn remove_value_requires_equality() {
        let store = StickyStore::default();
        store.put(Envelope::new(7_u32));
        assert!(!store.remove_value(&8_u32));
        assert!(store.get(TypeKey::of::<u32>()).is_some());
        assert!(store.remove_value(&7_u32));
        assert!(store.get(TypeKey::of::<u32>()).is_none());
        assert!(!store.remove_value(&7_u32));
    }

    #[test]
    fn first_match_follows_lineage_order() {
        let store = StickyStore::default();
        store.put(Envelope::new(3_u64));
        store.put(Envelope::new(4_u32));
        let found = store
            .first_match(&[TypeKey::of::<i8>(), TypeKey::of::<u64>(), TypeKey::of::<u32>()])
            .unwrap();
        assert_eq!(found.downcast_ref::<u64>(), Some(&3));
    }
}
