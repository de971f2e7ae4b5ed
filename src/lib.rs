//! # polybus
//!
//! **polybus** is an in-process publish/subscribe dispatcher for Rust:
//! producers post typed events without knowing the recipients; consumers
//! declare interest per event type with a delivery mode and priority, and
//! the dispatcher matches, orders and delivers.
//!
//! ## Architecture
//! ```text
//!  post(event) ──► per-thread posting queue (reentrant FIFO drain)
//!                     │
//!                     ▼
//!          lineage resolution (TypeGraph, cached)
//!                     │
//!                     ▼
//!          registry lookup: type ──► priority-ordered subscriptions
//!                     │                     (copy-on-write snapshots)
//!                     ▼
//!              thread-mode router
//!        ┌──────────┬─┴────────┬─────────────┐
//!        ▼          ▼          ▼             ▼
//!     inline    ordered     serialized    unordered
//!   (posting     main       background      pool
//!    thread)   consumer      consumer   (spawn_blocking)
//!                     │
//!                     ▼
//!        handler invocation (active re-check, panic containment)
//! ```
//!
//! Two isomorphic tracks run the identical engine over separate state:
//! ordinary **events** ([`Bus::post`]) and exceptional **faults**
//! ([`Bus::raise`]), the latter conventionally used for error/notification
//! propagation.
//!
//! ## Features
//! | Area              | Description                                                       | Key types                                  |
//! |-------------------|-------------------------------------------------------------------|--------------------------------------------|
//! | **Matching**      | Exact or lineage-based (host-declared type graph), cached.        | [`TypeGraph`], [`TypeKey`]                 |
//! | **Delivery**      | Five placement modes, priority-ordered, cancellable inline.       | [`DeliveryMode`], [`HandlerDescriptor`]    |
//! | **Sticky events** | Newest value per type retained for late subscribers.              | [`Bus::post_sticky`], [`TrackHandle`]      |
//! | **Deferred**      | Class-keyed buffering for consumers that do not exist yet.        | [`DeferredDescriptor`], [`Materialize`]    |
//! | **Containment**   | Per-delivery panic isolation with a configurable policy.          | [`PanicPolicy`], [`DeliveryFailed`]        |
//! | **Diagnostics**   | Pluggable sink instead of direct logging.                         | [`Diagnostics`], [`Diag`], [`LogSink`]     |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use polybus::{Bus, DeliveryMode, HandlerDescriptor, Subscriber};
//!
//! struct OrderCreated {
//!     id: u64,
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = Bus::builder().build()?;
//!
//!     let seen = Arc::new(AtomicUsize::new(0));
//!     let counter = Arc::clone(&seen);
//!     let subscriber = Subscriber::new(Arc::new(()));
//!     bus.register(
//!         &subscriber,
//!         vec![HandlerDescriptor::of(
//!             "on_order_created",
//!             DeliveryMode::Inline,
//!             move |order: &OrderCreated| {
//!                 assert_eq!(order.id, 7);
//!                 counter.fetch_add(1, Ordering::SeqCst);
//!             },
//!         )],
//!     )?;
//!
//!     bus.post(OrderCreated { id: 7 });
//!     assert_eq!(seen.load(Ordering::SeqCst), 1);
//!
//!     bus.unregister(&subscriber);
//!     bus.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Ordering guarantees
//! - Per event type, deliveries run in descending priority; equal
//!   priorities preserve registration order.
//! - Events posted from inside a same-thread delivery are strictly FIFO
//!   behind the events already pending on that thread.
//! - The ordered main and background queues are FIFO relative to other
//!   work on the same queue; the pool provides no ordering.
//!
//! A stalled handler in background mode stalls all subsequent background
//! deliveries for that engine instance - background is serialized by
//! design.

mod core;
mod diag;
mod dispatch;
mod error;
mod events;
mod registry;
mod types;

// ---- Public re-exports ----

pub use crate::core::{
    Bus, BusBuilder, BusConfig, DeclareHandlers, MainThreadProbe, PanicPolicy, TrackHandle,
};
pub use diag::{Diag, Diagnostics, LogSink};
pub use error::BusError;
pub use events::{DeliveryFailed, Envelope, UnhandledEvent};
pub use registry::{
    DeferredDescriptor, DeliveryMode, HandlerDescriptor, HandlerFn, Materialize, Subscriber, Track,
};
pub use types::{TypeGraph, TypeGraphBuilder, TypeKey};
