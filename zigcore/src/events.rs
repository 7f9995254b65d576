//! Events produced for the rest of the gateway.

use tokio::sync::broadcast;
use tracing::trace;

use crate::address::DeviceAddress;

/// Capacity of the subsystem event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubsystemEvent {
    /// Outcome of a supervised channel change. `channel` is the channel
    /// the network is on afterwards.
    ChannelChanged { succeeded: bool, channel: u8 },
    InterferenceChanged { detected: bool },
    /// Network is up and every driver has started.
    NetworkReady,
    /// A device was discovered and no handler claimed it.
    DeviceRejected { address: DeviceAddress },
}

/// Broadcast publisher for [`SubsystemEvent`]s.
///
/// Publishing with no subscribers is not an error.
#[derive(Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<SubsystemEvent>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: SubsystemEvent) {
        let receivers = self.sender.send(event.clone()).unwrap_or(0);
        trace!(?event, receivers, "Published subsystem event");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SubsystemEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let publisher = EventPublisher::default();
        publisher.publish(SubsystemEvent::NetworkReady);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let publisher = EventPublisher::default();
        let mut rx = publisher.subscribe();
        publisher.publish(SubsystemEvent::ChannelChanged {
            succeeded: true,
            channel: 20,
        });
        assert_eq!(
            rx.recv().await.unwrap(),
            SubsystemEvent::ChannelChanged {
                succeeded: true,
                channel: 20
            }
        );
    }
}
