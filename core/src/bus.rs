//! Synchronous observer list for lifecycle notifications.
//!
//! RULE: Publishing happens on the engine's thread, after a tick has fully
//! completed. Observers run in registration order and see every event;
//! they pick out the kinds they care about by matching on LifecycleEvent.

use crate::event::LifecycleEvent;

pub type LifecycleHandler = Box<dyn FnMut(&LifecycleEvent) + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct EventBus {
    handlers: Vec<(SubscriptionId, LifecycleHandler)>,
    next_id:  u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, handler: LifecycleHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, handler));
        id
    }

    /// Remove a handler. Returns false if the id was never registered or is already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(sid, _)| *sid != id);
        self.handlers.len() != before
    }

    pub fn publish(&mut self, event: &LifecycleEvent) {
        for (_, handler) in &mut self.handlers {
            handler(event);
        }
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.handlers.len())
            .finish()
    }
}
