//! Synchronous fan-out of classified events to registered handlers.
//!
//! Every handler sees every event, in registration order, before the next
//! event is dispatched. The bus owns its handlers: once
//! [`DiscoveryBus::unregister`] returns, the handler can no longer be
//! invoked.

use std::collections::VecDeque;
use std::sync::Arc;

use rvc_domain::event::ClassifiedEvent;
use rvc_domain::time::Timestamp;

/// A consumer of classified events. Handlers must not block; outbound IO is
/// returned to the caller rather than performed inline.
pub trait DiscoveryHandler {
    type Output;

    fn handle(&mut self, event: &ClassifiedEvent, at: Timestamp) -> Self::Output;
}

/// Identifier returned by [`DiscoveryBus::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

pub struct DiscoveryBus<H> {
    next_id: u64,
    handlers: Vec<(HandlerId, H)>,
    replay: VecDeque<Arc<ClassifiedEvent>>,
    replay_capacity: usize,
}

impl<H: DiscoveryHandler> DiscoveryBus<H> {
    #[must_use]
    pub fn new(replay_capacity: usize) -> Self {
        Self {
            next_id: 0,
            handlers: Vec::new(),
            replay: VecDeque::with_capacity(replay_capacity),
            replay_capacity,
        }
    }

    pub fn register(&mut self, handler: H) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, handler));
        id
    }

    /// Remove a handler, returning it. Unknown ids are ignored.
    pub fn unregister(&mut self, id: HandlerId) -> Option<H> {
        let position = self.handlers.iter().position(|(hid, _)| *hid == id)?;
        Some(self.handlers.remove(position).1)
    }

    /// Remove every handler, in registration order.
    pub fn unregister_all(&mut self) -> Vec<H> {
        self.handlers.drain(..).map(|(_, handler)| handler).collect()
    }

    #[must_use]
    pub fn get(&self, id: HandlerId) -> Option<&H> {
        self.handlers
            .iter()
            .find(|(hid, _)| *hid == id)
            .map(|(_, handler)| handler)
    }

    pub fn get_mut(&mut self, id: HandlerId) -> Option<&mut H> {
        self.handlers
            .iter_mut()
            .find(|(hid, _)| *hid == id)
            .map(|(_, handler)| handler)
    }

    pub fn handlers(&self) -> impl Iterator<Item = &H> {
        self.handlers.iter().map(|(_, handler)| handler)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Hand `event` to every handler and collect their outputs.
    pub fn dispatch(&mut self, event: ClassifiedEvent, at: Timestamp) -> Vec<H::Output> {
        let event = Arc::new(event);
        if self.replay_capacity > 0 {
            if self.replay.len() == self.replay_capacity {
                self.replay.pop_front();
            }
            self.replay.push_back(Arc::clone(&event));
        }
        self.handlers
            .iter_mut()
            .map(|(_, handler)| handler.handle(&event, at))
            .collect()
    }

    /// Most recently dispatched events, oldest first.
    pub fn replay(&self) -> impl Iterator<Item = &Arc<ClassifiedEvent>> {
        self.replay.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rvc_domain::event::{DeviceType, Fields};
    use rvc_domain::instance::Instance;
    use rvc_domain::time::now;

    struct Recorder(&'static str);

    impl DiscoveryHandler for Recorder {
        type Output = String;

        fn handle(&mut self, event: &ClassifiedEvent, _at: Timestamp) -> String {
            format!("{}:{}", self.0, event.instance())
        }
    }

    fn event(instance: u8) -> ClassifiedEvent {
        ClassifiedEvent::new(DeviceType::Light, Instance::from(instance), "", Fields::new())
    }

    #[test]
    fn should_fan_out_in_registration_order() {
        let mut bus = DiscoveryBus::new(4);
        bus.register(Recorder("first"));
        bus.register(Recorder("second"));
        let outputs = bus.dispatch(event(25), now());
        assert_eq!(outputs, vec!["first:25", "second:25"]);
    }

    #[test]
    fn should_not_invoke_unregistered_handler() {
        let mut bus = DiscoveryBus::new(4);
        let first = bus.register(Recorder("first"));
        bus.register(Recorder("second"));
        assert!(bus.unregister(first).is_some());
        assert!(bus.unregister(first).is_none());
        assert_eq!(bus.dispatch(event(25), now()), vec!["second:25"]);
    }

    #[test]
    fn should_unregister_everything_on_teardown() {
        let mut bus = DiscoveryBus::new(4);
        bus.register(Recorder("first"));
        bus.register(Recorder("second"));
        assert_eq!(bus.unregister_all().len(), 2);
        assert!(bus.is_empty());
        assert!(bus.dispatch(event(25), now()).is_empty());
    }

    #[test]
    fn should_bound_replay_buffer() {
        let mut bus: DiscoveryBus<Recorder> = DiscoveryBus::new(2);
        for instance in [1, 2, 3] {
            bus.dispatch(event(instance), now());
        }
        let replayed: Vec<_> = bus.replay().map(|e| e.instance().to_string()).collect();
        assert_eq!(replayed, vec!["2", "3"]);
    }

    #[test]
    fn should_find_handler_by_id() {
        let mut bus = DiscoveryBus::new(0);
        let id = bus.register(Recorder("only"));
        assert_eq!(bus.get(id).map(|r| r.0), Some("only"));
        assert!(bus.get_mut(id).is_some());
        assert_eq!(bus.replay().count(), 0);
    }
}
