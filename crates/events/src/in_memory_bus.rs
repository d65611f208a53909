//! In-process signal bus.

use std::sync::{Mutex, PoisonError};

use crate::bus::{EventBus, Listener, SubscriptionId};

/// In-memory observer bus.
///
/// - No IO / no async
/// - Listeners run on the publishing thread
/// - The listener list is snapshotted before dispatch, so a listener may
///   subscribe or unsubscribe from inside its callback
pub struct InMemoryEventBus<M> {
    listeners: Mutex<Vec<(SubscriptionId, Listener<M>)>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Vec<Listener<M>> {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| l.clone())
            .collect()
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }
}

impl<M> core::fmt::Debug for InMemoryEventBus<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let count = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("InMemoryEventBus")
            .field("listeners", &count)
            .finish()
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Send + Sync + 'static,
{
    fn publish(&self, message: M) {
        let listeners = self.snapshot();
        tracing::debug!(listeners = listeners.len(), "publishing signal");
        for listener in listeners {
            listener(&message);
        }
    }

    fn subscribe(&self, listener: Listener<M>) -> SubscriptionId {
        let id = SubscriptionId::next();
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
