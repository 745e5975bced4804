//! Change streams with a replayable current value.

use tokio::sync::broadcast;
use tracing::trace;

/// Change stream configuration
#[derive(Debug, Clone, Copy)]
pub struct SubjectConfig {
    /// Changes buffered per subscriber before it starts lagging
    pub capacity: usize,
}

impl Default for SubjectConfig {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

/// Broadcast stream that remembers the last published change.
///
/// New subscribers get the last change first, then every later one.
#[derive(Debug)]
pub struct ChangeSubject<T: Clone> {
    sender: broadcast::Sender<T>,
    last: T,
}

impl<T: Clone> ChangeSubject<T> {
    /// Create with the change new subscribers see before anything is published.
    pub fn new(initial: T, config: SubjectConfig) -> Self {
        let (sender, _) = broadcast::channel(config.capacity.max(1));
        Self { sender, last: initial }
    }

    /// Publish a change. Returns the number of subscribers it reached.
    pub fn publish(&mut self, change: T) -> usize {
        self.last = change.clone();
        // No subscribers is fine; the change is still remembered.
        let reached = self.sender.send(change).unwrap_or(0);
        trace!(reached, "change published");
        reached
    }

    /// Last published change.
    pub fn last(&self) -> &T {
        &self.last
    }

    /// Last change and a receiver for later ones.
    pub fn subscribe(&self) -> (T, broadcast::Receiver<T>) {
        (self.last.clone(), self.sender.subscribe())
    }

    /// Active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
