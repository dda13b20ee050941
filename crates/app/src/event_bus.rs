//! In-process fan-out of state changes backed by a tokio broadcast channel.

use tokio::sync::broadcast;

use crate::reducers::StateChange;

/// Delivers every [`StateChange`] to all current subscribers.
///
/// Publishing succeeds even when there are no active subscribers
/// (the change is simply dropped). Slow subscribers lag rather than
/// block the bridge.
#[derive(Clone)]
pub struct StateChangeBus {
    sender: broadcast::Sender<StateChange>,
}

impl StateChangeBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Returns a receiver that will get all changes published *after*
    /// the subscription is created.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.sender.subscribe()
    }

    pub fn publish(&self, change: StateChange) {
        // send only fails without receivers
        let _ = self.sender.send(change);
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
