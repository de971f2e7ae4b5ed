//! # The engine handle.
//!
//! [`Bus`] is a cheap-clone handle over the shared dispatch core. There is
//! no process-global default instance: hosts build one at startup and pass
//! it to whoever posts or subscribes.
//!
//! The two tracks expose the same surface through [`TrackHandle`]
//! ([`Bus::events`] / [`Bus::faults`]); the root-level `post`/`raise`
//! conveniences delegate to them.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::diag::{Diag, Diagnostics};
use crate::dispatch::executors::{self, Executors};
use crate::dispatch::router;
use crate::dispatch::state::StateKey;
use crate::dispatch::engine;
use crate::error::BusError;
use crate::events::Envelope;
use crate::registry::{
    DeferredBuffers, DeferredDescriptor, DeferredRegistry, HandlerDescriptor, LiveRegistry,
    Materialize, StickyStore, Subscriber, Subscription, Track,
};
use crate::types::{TypeKey, TypeResolver};

use super::config::{BusConfig, PanicPolicy};

static NEXT_BUS_ID: AtomicU64 = AtomicU64::new(0);

/// Host-supplied predicate claiming an existing thread (e.g. a UI thread)
/// as the primary one. Affects routing decisions only; the ordered main
/// queue is still drained by the engine's own consumer.
pub type MainThreadProbe = Arc<dyn Fn() -> bool + Send + Sync>;

/// Per-track state: registries, buffers, sticky store and the track's
/// matching flags.
pub(crate) struct TrackState {
    pub(crate) registry: LiveRegistry,
    pub(crate) deferred: DeferredRegistry,
    pub(crate) buffers: DeferredBuffers,
    pub(crate) sticky: StickyStore,
    pub(crate) inheritance: bool,
    pub(crate) emit_unhandled: bool,
}

impl TrackState {
    pub(crate) fn new(cfg: &BusConfig, track: Track) -> Self {
        Self {
            registry: LiveRegistry::default(),
            deferred: DeferredRegistry::default(),
            buffers: DeferredBuffers::new(cfg.deferred_capacity_clamped()),
            sticky: StickyStore::default(),
            inheritance: cfg.inheritance_for(track),
            emit_unhandled: cfg.emit_unhandled_for(track),
        }
    }
}

/// The shared dispatch core; one allocation per engine instance.
pub(crate) struct BusCore {
    pub(crate) id: u64,
    pub(crate) resolver: TypeResolver,
    pub(crate) tracks: [TrackState; 2],
    pub(crate) executors: Executors,
    pub(crate) panic_policy: PanicPolicy,
    pub(crate) diag: Arc<dyn Diagnostics>,
    pub(crate) materializer: Option<Arc<dyn Materialize>>,
    pub(crate) probe: Option<MainThreadProbe>,
}

impl BusCore {
    pub(crate) fn next_id() -> u64 {
        NEXT_BUS_ID.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn track(&self, track: Track) -> &TrackState {
        &self.tracks[track.index()]
    }

    /// Whether the calling thread counts as the primary thread.
    pub(crate) fn is_primary(&self) -> bool {
        executors::on_main_consumer() || self.probe.as_ref().is_some_and(|probe| probe())
    }

    /// Lineage of `key` under `track`'s matching rules.
    pub(crate) fn lineage(&self, track: Track, key: TypeKey) -> Arc<[TypeKey]> {
        if self.track(track).inheritance {
            self.resolver.types_for(key)
        } else {
            let exact: Arc<[TypeKey]> = Arc::new([key]);
            exact
        }
    }

    pub(crate) fn notify_materializer(&self, class: TypeKey) {
        if let Some(materializer) = &self.materializer {
            let materializer = Arc::clone(materializer);
            self.executors.runtime().spawn(async move {
                materializer.materialize(class).await;
            });
        }
    }
}

/// Descriptor provider contract: a subscriber type that can state its own
/// interest declarations as data.
///
/// ```
/// use std::sync::Arc;
/// use polybus::{DeclareHandlers, DeliveryMode, HandlerDescriptor};
///
/// struct Billing;
/// struct InvoicePaid;
///
/// impl DeclareHandlers for Billing {
///     fn handlers(_this: &Arc<Self>) -> Vec<HandlerDescriptor> {
///         vec![HandlerDescriptor::of(
///             "on_invoice_paid",
///             DeliveryMode::Inline,
///             |_paid: &InvoicePaid| { /* ... */ },
///         )]
///     }
/// }
/// ```
pub trait DeclareHandlers: Any + Send + Sync + Sized {
    /// Returns the component's interest declarations. `this` is the anchor
    /// handlers typically capture a clone of.
    fn handlers(this: &Arc<Self>) -> Vec<HandlerDescriptor>;
}

/// Cheap-clone handle over one dispatch engine instance.
#[derive(Clone)]
pub struct Bus {
    pub(crate) core: Arc<BusCore>,
}

impl Bus {
    /// Returns a builder with default configuration.
    pub fn builder() -> super::builder::BusBuilder {
        super::builder::BusBuilder::new()
    }

    /// The ordinary-events track.
    pub fn events(&self) -> TrackHandle<'_> {
        TrackHandle {
            core: &self.core,
            track: Track::Events,
        }
    }

    /// The exceptional-events (faults) track.
    pub fn faults(&self) -> TrackHandle<'_> {
        TrackHandle {
            core: &self.core,
            track: Track::Faults,
        }
    }

    /// Posts an event on the events track.
    pub fn post<E: Any + Send + Sync>(&self, event: E) {
        self.events().post(event);
    }

    /// Retains `event` as the events-track sticky value of its type, then
    /// posts it.
    pub fn post_sticky<E: Any + Send + Sync>(&self, event: E) {
        self.events().post_sticky(event);
    }

    /// Posts an event on the faults track.
    pub fn raise<E: Any + Send + Sync>(&self, event: E) {
        self.faults().post(event);
    }

    /// Retains `event` as the faults-track sticky value of its type, then
    /// posts it.
    pub fn raise_sticky<E: Any + Send + Sync>(&self, event: E) {
        self.faults().post_sticky(event);
    }

    /// Cancels the events-track inline delivery of `event`. See
    /// [`TrackHandle::cancel_delivery`].
    pub fn cancel_delivery<E: Any>(&self, event: &E) -> Result<(), BusError> {
        self.events().cancel_delivery(event)
    }

    /// Registers a subscriber with its interest declarations.
    ///
    /// Per descriptor: inserts preserving priority order, then - for sticky
    /// declarations - delivers the newest retained value matching the event
    /// type before returning. After all descriptors are installed, drains
    /// any deferred buffer held for the subscriber's class.
    ///
    /// Fails on a duplicate declaration (same subscriber, event type and
    /// handler name); descriptors installed before the duplicate stay
    /// registered.
    pub fn register(
        &self,
        subscriber: &Subscriber,
        descriptors: Vec<HandlerDescriptor>,
    ) -> Result<(), BusError> {
        let on_primary = self.core.is_primary();
        let mut installed: Vec<Arc<Subscription>> = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let sub = Subscription::bind(subscriber, descriptor);
            self.core.track(sub.track).registry.insert(Arc::clone(&sub))?;
            if sub.sticky {
                self.deliver_retained(&sub, on_primary);
            }
            installed.push(sub);
        }
        self.drain_deferred(subscriber, &installed, on_primary);
        Ok(())
    }

    /// Registers a [`DeclareHandlers`] component in one step, returning the
    /// subscriber handle to unregister with.
    pub fn register_component<T: DeclareHandlers>(
        &self,
        component: &Arc<T>,
    ) -> Result<Subscriber, BusError> {
        let subscriber = Subscriber::new(Arc::clone(component));
        self.register(&subscriber, T::handlers(component))?;
        Ok(subscriber)
    }

    /// Removes every subscription of `subscriber` on both tracks, flagging
    /// each inactive first so already-queued deliveries skip it.
    ///
    /// Unregistering a subscriber with no live registration is reported to
    /// diagnostics, not an error.
    pub fn unregister(&self, subscriber: &Subscriber) {
        let id = subscriber.id();
        let mut any = false;
        for track in Track::ALL {
            any |= self.core.track(track).registry.remove_all(id);
        }
        if !any {
            self.core.diag.report(Diag::DoubleUnregister {
                class: subscriber.class(),
            });
        }
    }

    /// Whether `subscriber` holds any live subscription on either track.
    pub fn is_registered(&self, subscriber: &Subscriber) -> bool {
        let id = subscriber.id();
        Track::ALL
            .iter()
            .any(|track| self.core.track(*track).registry.is_registered(id))
    }

    /// Registers deferred ("lazy") interest declarations for a class with
    /// no live instance yet. Posts matching a declaration are buffered for
    /// the class and drained when an instance registers. No sticky
    /// auto-delivery happens here - stickies go to live instances only.
    pub fn subscribe_class(
        &self,
        class: TypeKey,
        descriptors: Vec<DeferredDescriptor>,
    ) -> Result<(), BusError> {
        for descriptor in descriptors {
            self.core
                .track(descriptor.track)
                .deferred
                .insert(class, &descriptor)?;
        }
        Ok(())
    }

    /// Drops the class's deferred declarations and discards its buffers on
    /// both tracks.
    pub fn unsubscribe_class(&self, class: TypeKey) {
        let mut any = false;
        for track in Track::ALL {
            let te = self.core.track(track);
            any |= te.deferred.remove_class(class);
            te.buffers.drain(class);
        }
        if !any {
            self.core.diag.report(Diag::DoubleUnregister { class });
        }
    }

    /// Closes the ordered delivery queues, joins their consumers and drops
    /// the deferred buffers. Pooled deliveries already submitted still run.
    /// Idempotent. Must not be called from inside a handler running on one
    /// of the ordered consumers.
    pub fn shutdown(&self) {
        self.core.executors.shutdown();
        for track in Track::ALL {
            self.core.track(track).buffers.clear();
        }
    }

    /// Delivers the newest retained value matching a fresh sticky
    /// subscription, if any.
    fn deliver_retained(&self, sub: &Arc<Subscription>, on_primary: bool) {
        let core = &self.core;
        let types = core.lineage(sub.track, sub.event_type);
        if let Some(env) = core.track(sub.track).sticky.first_match(&types) {
            router::route(core, sub, &env, on_primary, StateKey::immediate(core.id, sub.track));
        }
    }

    /// Drains the class buffers for a freshly registered subscriber:
    /// every buffered event whose lineage matches one of the new
    /// subscriptions is routed as if freshly posted, then discarded.
    fn drain_deferred(&self, subscriber: &Subscriber, installed: &[Arc<Subscription>], on_primary: bool) {
        let core = &self.core;
        for track in Track::ALL {
            let buffered = core.track(track).buffers.drain(subscriber.class());
            if buffered.is_empty() {
                continue;
            }
            let mut subs: Vec<&Arc<Subscription>> =
                installed.iter().filter(|s| s.track == track).collect();
            subs.sort_by_key(|s| std::cmp::Reverse(s.priority));
            let lane = StateKey::immediate(core.id, track);
            for env in buffered {
                let types = core.lineage(track, env.key());
                for sub in &subs {
                    if types.contains(&sub.event_type)
                        && !router::route(core, sub, &env, on_primary, lane)
                    {
                        break;
                    }
                }
            }
        }
    }
}

/// Per-track view of the engine: the posting, sticky and query surface.
#[derive(Clone, Copy)]
pub struct TrackHandle<'a> {
    core: &'a Arc<BusCore>,
    track: Track,
}

impl TrackHandle<'_> {
    /// Posts an event on this track.
    pub fn post<E: Any + Send + Sync>(&self, event: E) {
        self.post_envelope(Envelope::new(event));
    }

    /// Posts an already-wrapped envelope (e.g. re-posting the payload of an
    /// [`UnhandledEvent`](crate::UnhandledEvent)).
    pub fn post_envelope(&self, env: Envelope) {
        engine::post(self.core, self.track, env);
    }

    /// Retains `event` as this track's sticky value of its type, then posts
    /// it. The store write happens first, so a subscriber reacting inside
    /// the delivery already sees - and may remove - the retained value.
    pub fn post_sticky<E: Any + Send + Sync>(&self, event: E) {
        let env = Envelope::new(event);
        self.core.track(self.track).sticky.put(env.clone());
        engine::post(self.core, self.track, env);
    }

    /// Cancels delivery of `event`, which must be the inline delivery
    /// currently running on the calling thread. Remaining lower-priority
    /// subscriptions for that event are skipped; deliveries already made
    /// stand. Any other use returns [`BusError::InvalidCancel`].
    pub fn cancel_delivery<E: Any>(&self, event: &E) -> Result<(), BusError> {
        engine::cancel(self.core, self.track, event as *const E as *const ())
    }

    /// Envelope-identity variant of [`cancel_delivery`](Self::cancel_delivery)
    /// for envelope-level handlers.
    pub fn cancel_envelope(&self, env: &Envelope) -> Result<(), BusError> {
        engine::cancel(self.core, self.track, env.payload_ptr())
    }

    /// The retained sticky value of type `E`, if any.
    pub fn sticky<E: Any + Send + Sync>(&self) -> Option<Arc<E>> {
        self.core
            .track(self.track)
            .sticky
            .get(TypeKey::of::<E>())
            .and_then(|env| env.payload_arc::<E>())
    }

    /// Removes and returns the retained sticky value of type `E`.
    pub fn remove_sticky<E: Any + Send + Sync>(&self) -> Option<Arc<E>> {
        self.core
            .track(self.track)
            .sticky
            .remove(TypeKey::of::<E>())
            .and_then(|env| env.payload_arc::<E>())
    }

    /// Removes the retained value of `E`'s type only if it equals `event`
    /// by value. Returns whether a removal happened.
    pub fn remove_sticky_value<E: Any + Send + Sync + PartialEq>(&self, event: &E) -> bool {
        self.core.track(self.track).sticky.remove_value(event)
    }

    /// Drops every retained sticky value on this track.
    pub fn clear_sticky(&self) {
        self.core.track(self.track).sticky.clear();
    }

    /// Whether a post of `E` would reach at least one live subscription,
    /// lineage-aware when this track matches by lineage.
    pub fn has_subscribers<E: ?Sized + 'static>(&self) -> bool {
        self.has_subscribers_for(TypeKey::of::<E>())
    }

    /// Key-level variant of [`has_subscribers`](Self::has_subscribers).
    pub fn has_subscribers_for(&self, key: TypeKey) -> bool {
        let types = self.core.lineage(self.track, key);
        self.core.track(self.track).registry.has_any(&types)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use crate::core::{Bus, BusConfig};
    use crate::diag::testing::CaptureSink;
    use crate::diag::{Diag, Diagnostics};
    use crate::registry::{
        DeferredDescriptor, DeliveryMode, HandlerDescriptor, Materialize, Subscriber,
    };
    use crate::types::{TypeGraph, TypeKey};

    use super::DeclareHandlers;

    const WAIT: Duration = Duration::from_secs(5);

    struct Ping;
    #[derive(PartialEq, Debug)]
    struct Count(u32);
    #[derive(Clone)]
    struct Note(u32);
    struct Alarm;
    struct BaseEv;
    struct ChildEv;
    trait OrderEvent {}
    struct Screen;

    type Log = Arc<Mutex<Vec<String>>>;

    fn log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn push(log: &Log, entry: impl Into<String>) {
        log.lock().unwrap().push(entry.into());
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    fn subscriber() -> Subscriber {
        Subscriber::new(Arc::new(()))
    }

    #[tokio::test]
    async fn delivery_follows_descending_priority_with_stable_ties() {
        let bus = Bus::builder().build().unwrap();
        let owner = subscriber();
        let trace = log();

        let mut descriptors = Vec::new();
        for (name, priority) in [("low", 1), ("mid_first", 5), ("high", 9), ("mid_second", 5)] {
            let t = trace.clone();
            descriptors.push(
                HandlerDescriptor::of(name, DeliveryMode::Inline, move |_: &Ping| {
                    push(&t, name);
                })
                .with_priority(priority),
            );
        }
        bus.register(&owner, descriptors).unwrap();

        bus.post(Ping);
        assert_eq!(entries(&trace), vec!["high", "mid_first", "mid_second", "low"]);
        bus.shutdown();
    }

    #[tokio::test]
    async fn sticky_overwrites_and_reaches_the_late_registrant_once() {
        let bus = Bus::builder().build().unwrap();
        bus.post_sticky(Count(1));
        bus.post_sticky(Count(2));

        let trace = log();
        let t = trace.clone();
        let owner = subscriber();
        bus.register(
            &owner,
            vec![
                HandlerDescriptor::of("on_count", DeliveryMode::Inline, move |c: &Count| {
                    push(&t, format!("count:{}", c.0));
                })
                .with_sticky(),
            ],
        )
        .unwrap();

        // Exactly the newest value, exactly once.
        assert_eq!(entries(&trace), vec!["count:2"]);
        assert_eq!(bus.events().sticky::<Count>().unwrap().0, 2);

        // Value-equality removal: stale value is a no-op.
        assert!(!bus.events().remove_sticky_value(&Count(1)));
        assert!(bus.events().remove_sticky_value(&Count(2)));
        assert!(bus.events().sticky::<Count>().is_none());
        bus.shutdown();
    }

    #[tokio::test]
    async fn sticky_store_write_is_visible_inside_the_delivery() {
        let bus = Bus::builder().build().unwrap();
        let owner = subscriber();
        let trace = log();

        let (bus2, t) = (bus.clone(), trace.clone());
        bus.register(
            &owner,
            vec![HandlerDescriptor::of("on_count", DeliveryMode::Inline, move |c: &Count| {
                let retained = bus2.events().sticky::<Count>().map(|v| v.0);
                push(&t, format!("delivered:{} retained:{:?}", c.0, retained));
            })],
        )
        .unwrap();

        bus.post_sticky(Count(9));
        assert_eq!(entries(&trace), vec!["delivered:9 retained:Some(9)"]);
        bus.shutdown();
    }

    #[tokio::test]
    async fn lineage_matching_delivers_concrete_events_to_ancestors() {
        let graph = TypeGraph::builder()
            .extends::<ChildEv, BaseEv>()
            .implements::<ChildEv, dyn OrderEvent>()
            .build();
        let bus = Bus::builder().with_type_graph(graph).build().unwrap();
        let owner = subscriber();
        let trace = log();

        let (t1, t2) = (trace.clone(), trace.clone());
        bus.register(
            &owner,
            vec![
                HandlerDescriptor::raw(
                    TypeKey::of::<BaseEv>(),
                    "on_base",
                    DeliveryMode::Inline,
                    move |env| push(&t1, format!("base:{}", env.key().name())),
                )
                .with_priority(2),
                HandlerDescriptor::raw(
                    TypeKey::of::<dyn OrderEvent>(),
                    "on_order",
                    DeliveryMode::Inline,
                    move |env| push(&t2, format!("facet:{}", env.key().name())),
                ),
            ],
        )
        .unwrap();

        bus.post(ChildEv);
        let seen = entries(&trace);
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|s| s.contains("ChildEv")));
        assert!(bus.events().has_subscribers::<ChildEv>());
        bus.shutdown();
    }

    #[tokio::test]
    async fn exact_matching_ignores_lineage_when_disabled() {
        let graph = TypeGraph::builder().extends::<ChildEv, BaseEv>().build();
        let cfg = BusConfig {
            event_inheritance: false,
            emit_unhandled_events: false,
            ..BusConfig::default()
        };
        let bus = Bus::builder().with_config(cfg).with_type_graph(graph).build().unwrap();
        let owner = subscriber();
        let hits = Arc::new(AtomicUsize::new(0));

        let n = Arc::clone(&hits);
        bus.register(
            &owner,
            vec![HandlerDescriptor::raw(
                TypeKey::of::<BaseEv>(),
                "on_base",
                DeliveryMode::Inline,
                move |_| {
                    n.fetch_add(1, AtomicOrdering::SeqCst);
                },
            )],
        )
        .unwrap();

        bus.post(ChildEv);
        assert_eq!(hits.load(AtomicOrdering::SeqCst), 0);
        assert!(!bus.events().has_subscribers::<ChildEv>());

        bus.post(BaseEv);
        assert_eq!(hits.load(AtomicOrdering::SeqCst), 1);
        bus.shutdown();
    }

    struct CaptureMaterializer {
        tx: mpsc::UnboundedSender<TypeKey>,
    }

    #[async_trait]
    impl Materialize for CaptureMaterializer {
        async fn materialize(&self, class: TypeKey) {
            let _ = self.tx.send(class);
        }
    }

    #[tokio::test]
    async fn deferred_posts_buffer_materialize_and_drain_on_register() {
        let sink = Arc::new(CaptureSink::default());
        let (mat_tx, mut mat_rx) = mpsc::unbounded_channel();
        let cfg = BusConfig {
            deferred_capacity: 2,
            ..BusConfig::default()
        };
        let bus = Bus::builder()
            .with_config(cfg)
            .with_diagnostics(sink.clone() as Arc<dyn Diagnostics>)
            .with_materializer(Arc::new(CaptureMaterializer { tx: mat_tx }))
            .build()
            .unwrap();

        let class = TypeKey::of::<Screen>();
        bus.subscribe_class(
            class,
            vec![DeferredDescriptor::of::<Note>("on_note", DeliveryMode::Inline)],
        )
        .unwrap();

        bus.post(Note(1));
        bus.post(Note(2));
        bus.post(Note(3));

        // Lazy interest counts as a match: no unhandled notice.
        assert_eq!(sink.count(|d| matches!(d, Diag::Unhandled { .. })), 0);
        // The capped buffer evicted the oldest entry.
        assert_eq!(sink.count(|d| matches!(d, Diag::DeferredOverflow { .. })), 1);
        // One empty→non-empty transition, one materializer call.
        let requested = timeout(WAIT, mat_rx.recv()).await.unwrap().unwrap();
        assert_eq!(requested, class);

        // The instance arrives: buffered events drain in order, as if
        // freshly posted.
        let trace = log();
        let t = trace.clone();
        let screen = Subscriber::new(Arc::new(Screen));
        bus.register(
            &screen,
            vec![HandlerDescriptor::of("on_note", DeliveryMode::Inline, move |n: &Note| {
                push(&t, format!("note:{}", n.0));
            })],
        )
        .unwrap();
        assert_eq!(entries(&trace), vec!["note:2", "note:3"]);

        // Drained means gone: a second instance gets nothing.
        let trace2 = log();
        let t2 = trace2.clone();
        let other = Subscriber::new(Arc::new(Screen));
        bus.register(
            &other,
            vec![HandlerDescriptor::of("on_note_again", DeliveryMode::Inline, move |n: &Note| {
                push(&t2, format!("note:{}", n.0));
            })],
        )
        .unwrap();
        assert!(entries(&trace2).is_empty());

        bus.unsubscribe_class(class);
        bus.shutdown();
    }

    struct Billing {
        handled: AtomicUsize,
    }

    struct InvoicePaid;

    impl DeclareHandlers for Billing {
        fn handlers(this: &Arc<Self>) -> Vec<HandlerDescriptor> {
            let me = Arc::clone(this);
            vec![HandlerDescriptor::of(
                "on_invoice_paid",
                DeliveryMode::Inline,
                move |_: &InvoicePaid| {
                    me.handled.fetch_add(1, AtomicOrdering::SeqCst);
                },
            )]
        }
    }

    #[tokio::test]
    async fn component_registration_uses_declared_handlers() {
        let bus = Bus::builder().build().unwrap();
        let billing = Arc::new(Billing {
            handled: AtomicUsize::new(0),
        });
        let handle = bus.register_component(&billing).unwrap();

        assert!(bus.is_registered(&handle));
        bus.post(InvoicePaid);
        assert_eq!(billing.handled.load(AtomicOrdering::SeqCst), 1);

        bus.unregister(&handle);
        assert!(!bus.is_registered(&handle));
        bus.post(InvoicePaid);
        assert_eq!(billing.handled.load(AtomicOrdering::SeqCst), 1);
        bus.shutdown();
    }

    #[tokio::test]
    async fn tracks_keep_separate_registries_and_sticky_stores() {
        let bus = Bus::builder().build().unwrap();
        let owner = subscriber();
        let trace = log();

        let (t1, t2) = (trace.clone(), trace.clone());
        bus.register(
            &owner,
            vec![
                HandlerDescriptor::of("on_alarm", DeliveryMode::Inline, move |_: &Alarm| {
                    push(&t1, "event");
                }),
                HandlerDescriptor::of("on_alarm_fault", DeliveryMode::Inline, move |_: &Alarm| {
                    push(&t2, "fault");
                })
                .on_faults(),
            ],
        )
        .unwrap();

        bus.raise(Alarm);
        assert_eq!(entries(&trace), vec!["fault"]);
        bus.post(Alarm);
        assert_eq!(entries(&trace), vec!["fault", "event"]);

        bus.raise_sticky(Alarm);
        assert!(bus.faults().sticky::<Alarm>().is_some());
        assert!(bus.events().sticky::<Alarm>().is_none());
        bus.faults().clear_sticky();
        assert!(bus.faults().sticky::<Alarm>().is_none());
        bus.shutdown();
    }

    #[tokio::test]
    async fn double_unregister_is_reported_not_fatal() {
        let sink = Arc::new(CaptureSink::default());
        let bus = Bus::builder()
            .with_diagnostics(sink.clone() as Arc<dyn Diagnostics>)
            .build()
            .unwrap();

        let owner = subscriber();
        bus.unregister(&owner);
        assert_eq!(sink.count(|d| matches!(d, Diag::DoubleUnregister { .. })), 1);
        bus.shutdown();
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let bus = Bus::builder().build().unwrap();
        let owner = subscriber();
        bus.register(
            &owner,
            vec![HandlerDescriptor::of("on_ping", DeliveryMode::Inline, |_: &Ping| {})],
        )
        .unwrap();
        let err = bus
            .register(
                &owner,
                vec![HandlerDescriptor::of("on_ping", DeliveryMode::Inline, |_: &Ping| {})],
            )
            .unwrap_err();
        assert_eq!(err.as_label(), "duplicate_subscription");
        bus.shutdown();
    }
}
