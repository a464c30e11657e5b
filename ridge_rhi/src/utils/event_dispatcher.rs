/// Listener registry for events an object emits to its owner
///
/// Listeners are keyed by [`ListenerId`] so they can be removed
/// individually. Dispatch happens in registration order.

use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Handle returned when registering a listener
    pub struct ListenerId;
}

pub type Listener<E> = Box<dyn FnMut(&E) + Send + Sync>;

pub struct EventDispatcher<E> {
    listeners: SlotMap<ListenerId, Listener<E>>,
    order: Vec<ListenerId>,
}

impl<E> EventDispatcher<E> {
    pub fn new() -> Self {
        Self {
            listeners: SlotMap::with_key(),
            order: Vec::new(),
        }
    }

    pub fn add(&mut self, listener: Listener<E>) -> ListenerId {
        let id = self.listeners.insert(listener);
        self.order.push(id);
        id
    }

    /// Returns false if `id` was never registered or already removed
    pub fn remove(&mut self, id: ListenerId) -> bool {
        if self.listeners.remove(id).is_none() {
            return false;
        }
        self.order.retain(|&other| other != id);
        true
    }

    pub fn dispatch(&mut self, event: &E) {
        for id in &self.order {
            if let Some(listener) = self.listeners.get_mut(*id) {
                listener(event);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<E> Default for EventDispatcher<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "event_dispatcher_tests.rs"]
mod tests;
