//! # Subscriptions and their declarations.
//!
//! The core never inspects a subscriber's shape. The host supplies interest
//! declarations as data: a [`HandlerDescriptor`] per handler (event type,
//! delivery mode, priority, sticky flag, and an opaque callable), and the
//! dispatcher turns each into an internal `Subscription` at registration.
//!
//! ## Handler flavors
//! - [`HandlerDescriptor::of`] - typed sugar for exact-type handlers; the
//!   payload is downcast to `E` before the closure runs.
//! - [`HandlerDescriptor::raw`] - envelope-level handler for lineage
//!   subscriptions (the payload stays at its concrete type; inspect
//!   [`Envelope::key`](crate::Envelope::key)).
//!
//! ## Identity
//! Subscription equality is `(subscriber identity, event type, handler
//! name)`; handler closures are rebuilt per registration, so the declared
//! name plays the role a method identity would.

use std::any::Any;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::events::Envelope;
use crate::types::TypeKey;

/// The two isomorphic dispatch tracks.
///
/// Ordinary events and exceptional faults run the identical engine over
/// separate registries, sticky stores and posting states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Track {
    /// Ordinary application events.
    Events,
    /// Exceptional events used for error/notification propagation.
    Faults,
}

impl Track {
    pub(crate) const ALL: [Track; 2] = [Track::Events, Track::Faults];

    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            Track::Events => 0,
            Track::Faults => 1,
        }
    }
}

/// Delivery placement policy for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Invoke on the posting thread, synchronously. The only mode in which
    /// delivery cancellation is legal.
    Inline,
    /// Invoke inline when posted from the primary thread, otherwise enqueue
    /// to the ordered main queue (FIFO, single consumer).
    Main,
    /// Always enqueue to the ordered main queue, even from the primary
    /// thread - strict FIFO relative to already-queued work.
    MainQueued,
    /// Enqueue to the serialized background worker when posted from the
    /// primary thread; invoke inline otherwise (the caller is already off
    /// the primary thread). Background handlers never run concurrently with
    /// each other.
    Background,
    /// Always submit to the unordered pool; deliveries may run concurrently
    /// with everything.
    Pooled,
}

/// Opaque delivery callable, bound to one envelope argument.
pub type HandlerFn = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// One interest declaration: event type, placement, priority, sticky flag
/// and the handler itself.
#[derive(Clone)]
pub struct HandlerDescriptor {
    pub(crate) track: Track,
    pub(crate) event_type: TypeKey,
    pub(crate) name: &'static str,
    pub(crate) mode: DeliveryMode,
    pub(crate) priority: i32,
    pub(crate) sticky: bool,
    pub(crate) handler: HandlerFn,
}

impl HandlerDescriptor {
    /// Typed declaration for event type `E`; the closure sees the payload
    /// at its exact concrete type.
    ///
    /// Defaults: events track, priority 0, not sticky.
    pub fn of<E: Any + Send + Sync>(
        name: &'static str,
        mode: DeliveryMode,
        f: impl Fn(&E) + Send + Sync + 'static,
    ) -> Self {
        let handler: HandlerFn = Arc::new(move |env: &Envelope| {
            if let Some(event) = env.downcast_ref::<E>() {
                f(event);
            }
        });
        Self {
            track: Track::Events,
            event_type: TypeKey::of::<E>(),
            name,
            mode,
            priority: 0,
            sticky: false,
            handler,
        }
    }

    /// Envelope-level declaration keyed on an arbitrary [`TypeKey`] - the
    /// form lineage subscriptions use (e.g. a `dyn Trait` facet key).
    pub fn raw(
        event_type: TypeKey,
        name: &'static str,
        mode: DeliveryMode,
        f: impl Fn(&Envelope) + Send + Sync + 'static,
    ) -> Self {
        Self {
            track: Track::Events,
            event_type,
            name,
            mode,
            priority: 0,
            sticky: false,
            handler: Arc::new(f),
        }
    }

    /// Sets the delivery priority (higher delivered first; default 0).
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Marks the declaration sticky: at registration the newest retained
    /// value matching the event type is delivered immediately.
    pub fn with_sticky(mut self) -> Self {
        self.sticky = true;
        self
    }

    /// Moves the declaration to the faults track.
    pub fn on_faults(mut self) -> Self {
        self.track = Track::Faults;
        self
    }

    /// The event type this declaration targets.
    pub fn event_type(&self) -> TypeKey {
        self.event_type
    }

    /// The declared handler name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Deferred ("lazy") interest declaration: identical shape minus a live
/// handler, keyed by target class because no instance exists yet.
#[derive(Clone, Copy, Debug)]
pub struct DeferredDescriptor {
    pub(crate) track: Track,
    pub(crate) event_type: TypeKey,
    pub(crate) name: &'static str,
    pub(crate) mode: DeliveryMode,
    pub(crate) priority: i32,
    pub(crate) sticky: bool,
}

impl DeferredDescriptor {
    /// Deferred declaration for event type `E`.
    pub fn of<E: Any + Send + Sync>(name: &'static str, mode: DeliveryMode) -> Self {
        Self::raw(TypeKey::of::<E>(), name, mode)
    }

    /// Deferred declaration keyed on an arbitrary [`TypeKey`].
    pub fn raw(event_type: TypeKey, name: &'static str, mode: DeliveryMode) -> Self {
        Self {
            track: Track::Events,
            event_type,
            name,
            mode,
            priority: 0,
            sticky: false,
        }
    }

    /// Sets the delivery priority (higher delivered first; default 0).
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Marks the declaration sticky.
    pub fn with_sticky(mut self) -> Self {
        self.sticky = true;
        self
    }

    /// Moves the declaration to the faults track.
    pub fn on_faults(mut self) -> Self {
        self.track = Track::Faults;
        self
    }

    /// The event type this declaration targets.
    pub fn event_type(&self) -> TypeKey {
        self.event_type
    }

    /// The declared handler name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The declared delivery mode.
    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// The declared priority.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Whether the declaration is sticky.
    pub fn is_sticky(&self) -> bool {
        self.sticky
    }
}

/// Identity of a subscribing component: the pointer of its anchoring `Arc`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct SubscriberId(usize);

/// Cheap-clone identity handle over a host component.
///
/// Two handles are the same subscriber when they anchor the same `Arc`
/// allocation; the component's concrete type doubles as the deferred class
/// key.
#[derive(Clone)]
pub struct Subscriber {
    anchor: Arc<dyn Any + Send + Sync>,
    class: TypeKey,
}

impl Subscriber {
    /// Wraps a host component as a subscriber identity.
    pub fn new<T: Any + Send + Sync>(component: Arc<T>) -> Self {
        Self {
            class: TypeKey::of::<T>(),
            anchor: component,
        }
    }

    /// The component's concrete type (the deferred class key).
    pub fn class(&self) -> TypeKey {
        self.class
    }

    pub(crate) fn id(&self) -> SubscriberId {
        SubscriberId(Arc::as_ptr(&self.anchor) as *const () as usize)
    }
}

/// A live subscription: one handler of one subscriber bound to one event
/// type. Created by `register`, mutated only through the `active` flag, and
/// removed by `unregister`.
pub(crate) struct Subscription {
    pub(crate) subscriber: SubscriberId,
    pub(crate) subscriber_class: TypeKey,
    pub(crate) track: Track,
    pub(crate) event_type: TypeKey,
    pub(crate) name: &'static str,
    pub(crate) mode: DeliveryMode,
    pub(crate) priority: i32,
    pub(crate) sticky: bool,
    /// Cleared the instant the owner unregisters, even while the
    /// subscription is still queued for delivery.
    pub(crate) active: AtomicBool,
    pub(crate) handler: HandlerFn,
}

impl Subscription {
    pub(crate) fn bind(subscriber: &Subscriber, descriptor: HandlerDescriptor) -> Arc<Self> {
        Arc::new(Self {
            subscriber: subscriber.id(),
            subscriber_class: subscriber.class(),
            track: descriptor.track,
            event_type: descriptor.event_type,
            name: descriptor.name,
            mode: descriptor.mode,
            priority: descriptor.priority,
            sticky: descriptor.sticky,
            active: AtomicBool::new(true),
            handler: descriptor.handler,
        })
    }
}
