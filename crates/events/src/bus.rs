//! Event publishing/subscription abstraction (mechanics only).
//!
//! This module provides the **event bus pattern**: a pub/sub mechanism for
//! distributing messages to multiple consumers.
//!
//! ## Guarantees
//!
//! - **Ordered**: every subscriber sees messages in publish order, each
//!   stamped with a monotonically increasing sequence number.
//! - **Lossless**: channels are unbounded; a slow subscriber delays only
//!   itself.
//! - **No persistence**: the bus distributes, it does not store history
//!   (an implementation may replay the latest message to new subscribers).

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;

use crate::Envelope;

/// Handle identifying one subscription on a bus.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

/// A subscription to a message stream.
///
/// ## Usage Pattern
///
/// ```ignore
/// let mut subscription = bus.subscribe();
///
/// while let Some(envelope) = subscription.recv().await {
///     process(envelope.into_message());
/// }
/// // `None`: the bus was dropped or the subscription was removed.
/// ```
///
/// Dropping the subscription unsubscribes; the bus prunes the dead sender on
/// its next publish.
#[derive(Debug)]
pub struct Subscription<M> {
    id: SubscriptionId,
    receiver: UnboundedReceiver<Envelope<M>>,
}

impl<M> Subscription<M> {
    pub fn new(id: SubscriptionId, receiver: UnboundedReceiver<Envelope<M>>) -> Self {
        Self { id, receiver }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next message.
    pub async fn recv(&mut self) -> Option<Envelope<M>> {
        self.receiver.recv().await
    }

    /// Take the next message without waiting.
    pub fn try_recv(&mut self) -> Result<Envelope<M>, TryRecvError> {
        self.receiver.try_recv()
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// `publish()` can fail (e.g. the bus is in a broken state). Failures are
/// surfaced to the caller.
///
/// The trait requires `Send + Sync`; multiple tasks may publish, but
/// ordering across concurrent publishers is the order in which they acquire
/// the bus.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    /// Publish a message; returns the sequence number it was assigned.
    fn publish(&self, message: M) -> Result<u64, Self::Error>;

    fn subscribe(&self) -> Subscription<M>;

    /// Remove a subscription. Returns `false` if it was already gone.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<u64, Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        (**self).unsubscribe(id)
    }
}
