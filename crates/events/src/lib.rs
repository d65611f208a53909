//! Process-wide signals between the transport and session layers.
//!
//! The transport layer publishes; the session layer subscribes. Neither
//! imports the other.

pub mod bus;
pub mod in_memory_bus;
pub mod signal;

pub use bus::{EventBus, Listener, SubscriptionId};
pub use in_memory_bus::InMemoryEventBus;
pub use signal::SessionEvent;
