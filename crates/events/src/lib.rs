//! Domain events and the in-process publication bus.
//!
//! Events are published only after the state they describe has been committed
//! to the order repository; the bus is for distribution, never for storage.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::{EventEnvelope, EventStream};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
