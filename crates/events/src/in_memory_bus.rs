//! In-memory event bus.

use std::sync::Mutex;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::bus::{EventBus, Subscription, SubscriptionId};
use crate::Envelope;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InMemoryBusError {
    /// Publish failed due to internal lock poisoning.
    #[error("event bus lock poisoned")]
    Poisoned,
}

#[derive(Debug)]
struct Inner<M> {
    next_subscription: u64,
    sequence: u64,
    latest: Option<M>,
    subscribers: Vec<(SubscriptionId, mpsc::UnboundedSender<Envelope<M>>)>,
}

/// In-memory pub/sub bus.
///
/// - No IO
/// - Publishing and subscribing share one lock, so a new subscriber never
///   misses or duplicates a message racing with its registration
/// - With `replay_latest`, a new subscriber first receives the most recent
///   message (behaviour-subject semantics)
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    replay_latest: bool,
    inner: Mutex<Inner<M>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus that replays its latest message to every new subscriber.
    pub fn replaying() -> Self {
        Self {
            replay_latest: true,
            ..Self::default()
        }
    }

    /// Number of live subscriptions (dead ones are pruned on publish).
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.subscribers.len()).unwrap_or(0)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            replay_latest: false,
            inner: Mutex::new(Inner {
                next_subscription: 1,
                sequence: 0,
                latest: None,
                subscribers: Vec::new(),
            }),
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<u64, Self::Error> {
        let mut inner = self.inner.lock().map_err(|_| InMemoryBusError::Poisoned)?;

        inner.sequence += 1;
        let sequence = inner.sequence;

        // Drop any dead subscribers while publishing.
        inner.subscribers.retain(|(id, tx)| {
            let delivered = tx.send(Envelope::new(sequence, message.clone())).is_ok();
            if !delivered {
                tracing::debug!(subscription = id.get(), "pruning closed subscription");
            }
            delivered
        });

        if self.replay_latest {
            inner.latest = Some(message);
        }

        Ok(sequence)
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            // A poisoned bus still hands out a subscription; it will simply
            // never receive anything.
            Err(_) => return Subscription::new(SubscriptionId::new(0), rx),
        };

        let id = SubscriptionId::new(inner.next_subscription);
        inner.next_subscription += 1;

        if let Some(latest) = inner.latest.clone() {
            let _ = tx.send(Envelope::new(inner.sequence, latest));
        }
        inner.subscribers.push((id, tx));

        Subscription::new(id, rx)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let Ok(mut inner) = self.inner.lock() else {
            return false;
        };
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(sub, _)| *sub != id);
        inner.subscribers.len() != before
    }
}
