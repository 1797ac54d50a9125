//! In-process event bus for the realtime gateway.
//!
//! [`gateway_bus::GatewayBus`] is the topic-keyed bus backing the
//! subscription fan-out (C5, spec §4.5): one closed topic enum, one
//! subscriber (the Dispatcher), synchronous in-order delivery per topic —
//! publisher order is preserved for a given topic, and `subscribe`d
//! handlers are awaited in turn so a `subscription_confirmed` frame
//! written before a bus subscription exists is never raced by a
//! `subscription_data` frame for the same key. A handler that panics is
//! caught at the call site so one bad subscriber can't poison the bus for
//! the others.

pub mod gateway_bus;

pub use gateway_bus::{GatewayBus, GatewayEvent};

pub mod prelude {
    //! Re-exports of the most commonly used event types.
    pub use crate::{GatewayBus, GatewayEvent};
}
