//! Typed publish/subscribe dispatch between the socket task and consumers.
//!
//! Handlers register under a coarse message type or a `type:category` pair.
//! Dispatch preserves registration order within a key; a panicking handler
//! is isolated so its siblings still run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::DashMap;

use fleetlink_core::{Envelope, RouteKey, SubscriptionId};

type Handler = Arc<dyn Fn(&Envelope) + Send + Sync>;

#[derive(Default)]
struct RouterShared {
    handlers: DashMap<RouteKey, Vec<(SubscriptionId, Handler)>>,
    index: DashMap<SubscriptionId, RouteKey>,
}

/// Publish/subscribe dispatcher. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct MessageRouter {
    shared: Arc<RouterShared>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a routing key. The returned token is the
    /// only way to unregister; it outlives whatever component created it.
    pub fn subscribe(
        &self,
        key: RouteKey,
        handler: impl Fn(&Envelope) + Send + Sync + 'static,
    ) -> Subscription {
        let id = SubscriptionId::new();
        self.shared
            .handlers
            .entry(key.clone())
            .or_default()
            .push((id.clone(), Arc::new(handler)));
        self.shared.index.insert(id.clone(), key);
        Subscription {
            id,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Dispatch an envelope to every handler under its coarse key, then its
    /// `type:category` key, in registration order per key.
    pub fn publish(&self, envelope: &Envelope) {
        let (coarse, compound) = envelope.route_keys();
        self.dispatch(&coarse, envelope);
        self.dispatch(&compound, envelope);
    }

    fn dispatch(&self, key: &RouteKey, envelope: &Envelope) {
        // Clone handlers out before invoking: a handler may subscribe or
        // unsubscribe, which would deadlock against a held map guard.
        let handlers: Vec<Handler> = match self.shared.handlers.get(key) {
            Some(entry) => entry.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return,
        };

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(envelope))).is_err() {
                tracing::warn!(key = %key, "subscriber panicked during dispatch");
            }
        }
    }

    /// Number of live subscriptions across all keys.
    pub fn subscription_count(&self) -> usize {
        self.shared.index.len()
    }
}

/// First-class unsubscribe token returned by [`MessageRouter::subscribe`].
#[derive(Clone)]
pub struct Subscription {
    id: SubscriptionId,
    shared: Arc<RouterShared>,
}

impl Subscription {
    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    /// Remove exactly this handler. Idempotent: a second call is a no-op.
    pub fn unsubscribe(&self) {
        let Some((_, key)) = self.shared.index.remove(&self.id) else {
            return;
        };
        if let Some(mut entry) = self.shared.handlers.get_mut(&key) {
            entry.retain(|(id, _)| id != &self.id);
        }
    }
}
