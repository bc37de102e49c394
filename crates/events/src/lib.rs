//! `venue-events`: ordered publish/subscribe mechanics.
//!
//! No domain knowledge lives here; the session layer publishes its own
//! message types through these primitives.

pub mod bus;
pub mod envelope;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription, SubscriptionId};
pub use envelope::Envelope;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
