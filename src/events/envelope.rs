//! # Event envelope.
//!
//! An event is any `T: Any + Send + Sync`; the dispatcher moves it around as
//! an [`Envelope`]: the payload behind an `Arc<dyn Any>` plus the concrete
//! [`TypeKey`] it was posted under. Clones are cheap and identity-preserving
//! - two clones of one post share the payload allocation, which is what
//! "the exact event currently being delivered" means for cancellation.
//!
//! ## Payload access
//! - [`Envelope::downcast_ref`] recovers the payload at its exact concrete
//!   type. Lineage-level subscriptions receive the envelope carrying the
//!   *concrete* payload: matching is metadata-driven, the payload is never
//!   re-projected to an ancestor type.
//! - [`Envelope::key`] identifies the concrete type, which is how a facet
//!   handler decides what to downcast to.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::types::TypeKey;

/// A posted event: shared payload plus its concrete dispatch key.
#[derive(Clone)]
pub struct Envelope {
    key: TypeKey,
    payload: Arc<dyn Any + Send + Sync>,
}

impl Envelope {
    /// Wraps `event` under its concrete type key.
    pub fn new<E: Any + Send + Sync>(event: E) -> Self {
        Self {
            key: TypeKey::of::<E>(),
            payload: Arc::new(event),
        }
    }

    /// The concrete type the payload was posted as.
    #[inline]
    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// Borrows the payload at its exact concrete type.
    #[inline]
    pub fn downcast_ref<E: Any>(&self) -> Option<&E> {
        self.payload.downcast_ref::<E>()
    }

    /// Borrows the type-erased payload.
    #[inline]
    pub fn payload(&self) -> &(dyn Any + Send + Sync) {
        self.payload.as_ref()
    }

    /// Returns the shared payload at type `E`, if that is its concrete type.
    pub fn payload_arc<E: Any + Send + Sync>(&self) -> Option<Arc<E>> {
        Arc::clone(&self.payload).downcast::<E>().ok()
    }

    /// Whether `other` is a clone of the same post (shared payload).
    #[inline]
    pub fn same_post(&self, other: &Envelope) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }

    /// Thin pointer to the payload data, used for post-identity checks.
    #[inline]
    pub(crate) fn payload_ptr(&self) -> *const () {
        Arc::as_ptr(&self.payload) as *const ()
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("key", &self.key.name())
            .finish_non_exhaustive()
    }
}
