//! Signal publishing/subscription abstraction (mechanics only).
//!
//! This is the observer half of the client: a component that needs to react
//! to something another layer noticed registers a [`Listener`] and keeps the
//! returned [`SubscriptionId`] so it can unregister when it is torn down.
//!
//! ## Delivery
//!
//! - **Synchronous**: `publish()` invokes every listener registered at the
//!   moment of dispatch before it returns.
//! - **No payload ordering across publishers**: two threads publishing at once
//!   may interleave.
//! - **Idempotent consumers**: the same signal can be published several times
//!   in a row (e.g. two parallel requests both hitting 401). Listeners must
//!   make repeated deliveries harmless.
//!
//! ## Usage Pattern
//!
//! ```ignore
//! let bus: Arc<dyn EventBus<SessionEvent>> = ...;
//! let id = bus.subscribe(Arc::new(|event: &SessionEvent| handle(event)));
//! // ...
//! bus.unsubscribe(id);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Callback invoked for each published message.
pub type Listener<M> = Arc<dyn Fn(&M) + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Allocate a process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Domain-agnostic observer bus.
///
/// The trait requires `Send + Sync` so one bus can be shared between the
/// transport, the token manager's background worker and the session layer.
pub trait EventBus<M>: Send + Sync {
    /// Deliver `message` to every current listener.
    fn publish(&self, message: M);

    /// Register a listener; it receives every message published afterwards.
    fn subscribe(&self, listener: Listener<M>) -> SubscriptionId;

    /// Remove a listener. Returns `false` if the id was unknown.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    /// Number of registered listeners.
    fn listener_count(&self) -> usize;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    fn publish(&self, message: M) {
        (**self).publish(message)
    }

    fn subscribe(&self, listener: Listener<M>) -> SubscriptionId {
        (**self).subscribe(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        (**self).unsubscribe(id)
    }

    fn listener_count(&self) -> usize {
        (**self).listener_count()
    }
}
