//! Subscription state: live registry, lazy class directory, deferred
//! buffers and the sticky store. One instance of each per track.
//!
//! ## Contents
//! - [`HandlerDescriptor`] / [`DeferredDescriptor`] - interest declarations
//! - [`Subscriber`] - identity handle over a host component
//! - [`DeliveryMode`], [`Track`] - placement and track attributes
//! - [`Materialize`] - host collaborator for deferred consumers
//! - crate-internal: `LiveRegistry`, `DeferredRegistry`, `DeferredBuffers`,
//!   `StickyStore`, `Subscription`

mod deferred;
mod live;
mod sticky;
mod subscription;

pub use deferred::Materialize;
pub use subscription::{
    DeferredDescriptor, DeliveryMode, HandlerDescriptor, HandlerFn, Subscriber, Track,
};

pub(crate) use deferred::{DeferredBuffers, DeferredRegistry};
pub(crate) use live::LiveRegistry;
pub(crate) use sticky::StickyStore;
pub(crate) use subscription::{SubscriberId, Subscription};
