use serde::{Deserialize, Serialize};

/// A published message stamped with its position in the bus's stream.
///
/// Sequence numbers start at 1 and increase by one per publish, so a
/// consumer can verify it saw every message in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<M> {
    sequence: u64,
    message: M,
}

impl<M> Envelope<M> {
    pub fn new(sequence: u64, message: M) -> Self {
        Self { sequence, message }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn message(&self) -> &M {
        &self.message
    }

    pub fn into_message(self) -> M {
        self.message
    }
}
