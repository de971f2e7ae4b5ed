//! Event data model: the envelope posts travel in, and the system events
//! the dispatcher emits about itself.

mod envelope;
mod system;

pub use envelope::Envelope;
pub use system::{DeliveryFailed, UnhandledEvent};
pub(crate) use system::is_system_event;
