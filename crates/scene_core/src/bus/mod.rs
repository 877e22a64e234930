//! # Ring-Buffer Event Bus
//!
//! Low-allocation in-process publish/subscribe. A single pre-allocated
//! power-of-two ring of reusable slots carries every published event; a
//! monotone sequence counter claims slots and every subscriber advances
//! its own cursor independently, so consumer groups can read the same
//! stream at different speeds.
//!
//! Publishing that would overwrite a slot the slowest live subscriber has
//! not consumed is gated: the publisher spins briefly and then receives a
//! [`CoreError::Backpressure`](crate::CoreError::Backpressure) rejection.
//! Events are never silently dropped.

mod ring;
mod subscriber;

pub use ring::{BusEvent, BusStats, EventBus};
pub use subscriber::SubscriptionHandle;
