//! Event bus for broadcasting broker events.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::event::BrokerEvent;
use crate::listener::ListenerRegistry;

/// Default channel capacity for the event bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Broadcasts events to async receivers and dispatches them to listeners.
///
/// Listeners are shared across clones.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<BrokerEvent>>,
    listeners: Arc<ListenerRegistry>,
    capacity: usize,
}

impl EventBus {
    /// Create a new event bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with the given capacity (at least 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            listeners: Arc::new(ListenerRegistry::new()),
            capacity,
        }
    }

    /// Publish an event.
    ///
    /// Returns the number of async receivers that received it.
    pub fn publish(&self, event: BrokerEvent) -> usize {
        let event = Arc::new(event);
        trace!(event_type = %event.event_type(), "Publishing event");

        let count = if let Ok(c) = self.sender.send(Arc::clone(&event)) {
            debug!(
                event_type = %event.event_type(),
                receiver_count = c,
                "Event published"
            );
            c
        } else {
            trace!(event_type = %event.event_type(), "No receivers for event");
            0
        };

        self.listeners.notify(&event);
        count
    }

    /// Subscribe to every published event.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// The listener registry.
    #[must_use]
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Number of async receivers plus listeners.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender
            .receiver_count()
            .saturating_add(self.listeners.len())
    }

    /// Channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            listeners: Arc::clone(&self.listeners),
            capacity: self.capacity,
        }
    }
}

/// Receiver for events from the event bus.
pub struct EventReceiver {
    receiver: broadcast::Receiver<Arc<BrokerEvent>>,
}

impl EventReceiver {
    /// Receive the next event. Returns `None` once the bus is gone.
    ///
    /// Events dropped because this receiver lagged are logged and skipped.
    pub async fn recv(&mut self) -> Option<Arc<BrokerEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(skipped = count, "Event receiver lagged, events dropped");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive without waiting. Returns `None` if nothing is queued.
    pub fn try_recv(&mut self) -> Option<Arc<BrokerEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    warn!(skipped = count, "Event receiver lagged, events dropped");
                },
                Err(
                    broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed,
                ) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use switchboard_core::{Identity, ROOT_USER_GUID};

    use super::*;
    use crate::event::EventMetadata;
    use crate::listener::ServiceManagerListener;

    fn failed(name: &str) -> BrokerEvent {
        BrokerEvent::ServiceFailedToStart {
            metadata: EventMetadata::new("test"),
            identity: Identity::new(name, ROOT_USER_GUID),
        }
    }

    #[tokio::test]
    async fn test_publish_and_receive() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();
        assert_eq!(bus.publish(failed("a")), 1);
        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event_type(), "service_failed_to_start");
    }

    #[tokio::test]
    async fn test_no_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(failed("a")), 0);
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();
        assert!(receiver.try_recv().is_none());
        bus.publish(failed("a"));
        assert!(receiver.try_recv().is_some());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        assert_eq!(EventBus::with_capacity(0).capacity(), 1);
    }

    #[test]
    fn test_cloned_bus_shares_listeners() {
        struct Counter(Arc<AtomicUsize>);
        impl ServiceManagerListener for Counter {
            fn on_service_failed_to_start(&self, _identity: &Identity) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.clone()
            .listeners()
            .register(Arc::new(Counter(Arc::clone(&count))));
        bus.publish(failed("a"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 1);
    }
}
