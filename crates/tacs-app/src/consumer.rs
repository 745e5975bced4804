//! Consume-or-pass-through chain for service grant changes.
//!
//! Every change from the bus is offered to each consumer in turn. The one
//! consumer that owns the change's service grant id claims it; every other
//! consumer hands it on untouched. Whatever nobody claims is dropped.

use tacs_core::service_grant::ServiceGrantChange;
use tracing::trace;

/// Outcome of offering a change to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Consumption {
    /// The consumer claimed the change; nothing left to report
    Consumed,
    /// Not this consumer's change; offer it to the next one
    PassThrough(ServiceGrantChange),
}

/// A feature owner on the service grant bus.
///
/// Implementations must pass through `Initial` changes, and must pass through
/// (after handling) `Reset` changes so every owner sees them.
pub trait ServiceGrantConsumer: Send {
    /// Claim the change or hand it back.
    fn try_consume(&mut self, change: ServiceGrantChange) -> Consumption;
}

/// Ordered chain of consumers.
#[derive(Default)]
pub struct Dispatcher {
    consumers: Vec<Box<dyn ServiceGrantConsumer>>,
}

impl Dispatcher {
    /// Empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a consumer.
    #[must_use]
    pub fn with(mut self, consumer: impl ServiceGrantConsumer + 'static) -> Self {
        self.push(consumer);
        self
    }

    /// Append a consumer.
    pub fn push(&mut self, consumer: impl ServiceGrantConsumer + 'static) {
        self.consumers.push(Box::new(consumer));
    }

    /// Number of consumers.
    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    /// Offer a change to the chain. Returns the change if nobody claimed it.
    pub fn dispatch(&mut self, change: ServiceGrantChange) -> Option<ServiceGrantChange> {
        let mut change = change;
        for consumer in &mut self.consumers {
            match consumer.try_consume(change) {
                Consumption::Consumed => return None,
                Consumption::PassThrough(unclaimed) => change = unclaimed,
            }
        }
        trace!(action = ?change.action, "service grant change not claimed");
        Some(change)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").field("consumers", &self.consumers.len()).finish()
    }
}
