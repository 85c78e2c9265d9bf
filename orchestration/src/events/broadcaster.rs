//! Per-session event broadcaster.
//!
//! Subscribers register against a session id and receive every event
//! published for that session while they stay registered. There is no
//! backlog and no replay: an event reaches the subscribers present when it
//! is published, once each.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::types::SessionEvent;

/// Identifier of one registered subscriber.
pub type SubscriberId = u64;

type Registry = Mutex<HashMap<String, HashMap<SubscriberId, mpsc::UnboundedSender<SessionEvent>>>>;

/// Shared reference to EventBroadcaster
pub type SharedEventBroadcaster = Arc<EventBroadcaster>;

#[derive(Debug, Default)]
pub struct EventBroadcaster {
    registry: Arc<Registry>,
    next_id: AtomicU64,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this broadcaster
    pub fn shared(self) -> SharedEventBroadcaster {
        Arc::new(self)
    }

    /// Register a subscriber for `session_id`. Dropping the returned
    /// subscription unregisters it.
    pub fn register(&self, session_id: &str) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        match self.registry.lock() {
            Ok(mut registry) => {
                registry
                    .entry(session_id.to_string())
                    .or_default()
                    .insert(id, sender);
            }
            Err(_) => warn!(session_id, "Subscriber registry poisoned, subscription is inert"),
        }
        debug!(session_id, subscriber_id = id, "Subscriber registered");

        Subscription {
            id,
            session_id: session_id.to_string(),
            receiver,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub fn unregister(&self, session_id: &str, subscriber_id: SubscriberId) {
        remove(&self.registry, session_id, subscriber_id);
    }

    /// Deliver `event` to the session's current subscribers. Publishing with
    /// no subscribers is not an error.
    pub fn publish(&self, session_id: &str, event: SessionEvent) {
        let event_type = event.event_type();
        let Ok(mut registry) = self.registry.lock() else {
            warn!(session_id, event_type, "Subscriber registry poisoned, event dropped");
            return;
        };
        let Some(subscribers) = registry.get_mut(session_id) else {
            debug!(session_id, event_type, "Event published (no subscribers)");
            return;
        };

        subscribers.retain(|_, sender| sender.send(event.clone()).is_ok());
        let receivers = subscribers.len();
        if receivers == 0 {
            registry.remove(session_id);
        }
        debug!(session_id, event_type, receivers, "Event published");
    }

    /// Number of subscribers registered for `session_id`.
    pub fn subscriber_count(&self, session_id: &str) -> usize {
        self.registry
            .lock()
            .map(|r| r.get(session_id).map_or(0, HashMap::len))
            .unwrap_or(0)
    }
}

fn remove(registry: &Registry, session_id: &str, subscriber_id: SubscriberId) {
    let Ok(mut registry) = registry.lock() else {
        return;
    };
    if let Some(subscribers) = registry.get_mut(session_id) {
        if subscribers.remove(&subscriber_id).is_some() {
            debug!(session_id, subscriber_id, "Subscriber unregistered");
        }
        if subscribers.is_empty() {
            registry.remove(session_id);
        }
    }
}

/// A registered subscriber's receiving end.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    session_id: String,
    receiver: mpsc::UnboundedReceiver<SessionEvent>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Wait for the next event. `None` once unregistered and drained.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.receiver.recv().await
    }

    /// Next already-delivered event, if any.
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            remove(&registry, &self.session_id, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deleted(id: &str) -> SessionEvent {
        SessionEvent::MessageDeleted(id.to_string())
    }

    #[tokio::test]
    async fn test_publish_reaches_session_subscribers_only() {
        let broadcaster = EventBroadcaster::new();
        let mut a = broadcaster.register("s1");
        let mut b = broadcaster.register("s1");
        let mut other = broadcaster.register("s2");

        broadcaster.publish("s1", deleted("m1"));

        assert_eq!(a.recv().await, Some(deleted("m1")));
        assert_eq!(b.recv().await, Some(deleted("m1")));
        assert_eq!(other.try_recv(), None);
        assert_eq!(a.try_recv(), None);
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let broadcaster = EventBroadcaster::new();
        broadcaster.publish("nobody", deleted("m1"));
        assert_eq!(broadcaster.subscriber_count("nobody"), 0);
    }

    #[test]
    fn test_no_replay_for_late_subscribers() {
        let broadcaster = EventBroadcaster::new();
        broadcaster.publish("s1", deleted("m1"));
        let mut late = broadcaster.register("s1");
        assert_eq!(late.try_recv(), None);
    }

    #[test]
    fn test_drop_and_explicit_unregister() {
        let broadcaster = EventBroadcaster::new();
        let a = broadcaster.register("s1");
        let b = broadcaster.register("s1");
        assert_eq!(broadcaster.subscriber_count("s1"), 2);

        drop(a);
        assert_eq!(broadcaster.subscriber_count("s1"), 1);

        broadcaster.unregister("s1", b.id());
        assert_eq!(broadcaster.subscriber_count("s1"), 0);
    }
}
