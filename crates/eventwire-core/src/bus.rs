//! Broadcast bus for reconstructed stream updates. Instance-scoped rather
//! than a process-wide singleton, so a host can run more than one
//! `EventWireSystem` in the same process.

use eventwire_contracts::Event;
use tokio::sync::broadcast;

const DEFAULT_BUFFER_CAPACITY: usize = 256;

/// One observed transition: the raw event plus what the renderer produced
/// for it (`None` under `Quiet`).
#[derive(Debug, Clone)]
pub struct StreamUpdate {
    pub event: Event,
    pub rendered: Option<String>,
}

pub struct EventBus {
    sender: broadcast::Sender<StreamUpdate>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an update. Returns the number of live subscribers; a
    /// bus with none is not an error, the send result is ignored.
    pub fn publish(&self, update: StreamUpdate) -> usize {
        self.sender.send(update).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamUpdate> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_update() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.publish(StreamUpdate {
            event: Event::ThinkingStart { timestamp_nanos: 0 },
            rendered: Some("(thinking... ".to_string()),
        });

        let update = receiver.recv().await.unwrap();
        assert_eq!(update.rendered.as_deref(), Some("(thinking... "));
    }

    #[test]
    fn publish_with_no_subscribers_is_not_an_error() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(StreamUpdate { event: Event::ThinkingEnd { timestamp_nanos: 0 }, rendered: None }), 0);
    }
}
