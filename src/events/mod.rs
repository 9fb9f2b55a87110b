//! Lifecycle event system: every successful state transition is broadcast to
//! any interested subscriber.

pub mod publisher;

pub use publisher::{OrderEvent, OrderEventPublisher};
