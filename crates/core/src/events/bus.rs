use std::sync::Arc;
use tokio::sync::broadcast;

use super::types::PressroomEvent;

/// In-process event bus backed by `tokio::broadcast`, injected into
/// the builder and route handlers rather than living in a process
/// global. Publishing with no subscribers is not an error.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<PressroomEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Publish an event to all current subscribers. Returns how many
    /// subscribers received it; zero subscribers is fine.
    pub fn publish(&self, event: PressroomEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<PressroomEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::PublishStarted;
    use chrono::Utc;

    fn started() -> PressroomEvent {
        PressroomEvent::PublishStarted(PublishStarted {
            release_id: "rel_1".into(),
            published_by: "alice".into(),
            at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn publish_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(started());

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, PressroomEvent::PublishStarted(_)));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let bus = EventBus::new(16);
        assert_eq!(bus.publish(started()), 0);
    }

    #[tokio::test]
    async fn multiple_subscribers() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(started());

        assert!(matches!(rx1.recv().await.unwrap(), PressroomEvent::PublishStarted(_)));
        assert!(matches!(rx2.recv().await.unwrap(), PressroomEvent::PublishStarted(_)));
    }
}
