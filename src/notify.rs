use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, PropertyId};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for the per-property change feed. `LISTEN property_{id}`
/// subscriptions hang off these channels.
pub struct NotifyHub {
    channels: DashMap<PropertyId, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to one property's events. Creates the channel if needed.
    pub fn subscribe(&self, property_id: PropertyId) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(property_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Publish an event. No-op if nobody is listening.
    pub fn send(&self, property_id: PropertyId, event: &Event) {
        if let Some(sender) = self.channels.get(&property_id) {
            let _ = sender.send(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe(42);

        let event = Event::ListedForSale { id: 42 };
        hub.send(42, &event);

        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        hub.send(7, &Event::ClaimReleased { id: 7 });
    }

    #[tokio::test]
    async fn channels_are_per_property() {
        let hub = NotifyHub::new();
        let mut rx_a = hub.subscribe(1);
        let _rx_b = hub.subscribe(2);

        hub.send(2, &Event::ListedForRent { id: 2 });
        assert!(rx_a.try_recv().is_err());
    }
}
