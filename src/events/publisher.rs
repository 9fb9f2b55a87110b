use crate::state_machine::OrderState;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Broadcast publisher for order lifecycle events.
#[derive(Debug, Clone)]
pub struct OrderEventPublisher {
    sender: broadcast::Sender<OrderEvent>,
}

/// One successful state transition.
#[derive(Debug, Clone)]
pub struct OrderEvent {
    pub order_id: Uuid,
    pub from: OrderState,
    pub to: OrderState,
    pub occurred_at: chrono::DateTime<chrono::Utc>,
}

impl OrderEventPublisher {
    /// Create a new publisher with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a transition event.
    ///
    /// A broadcast send fails when there are no subscribers; that is
    /// acceptable here, transitions happen whether or not anyone listens.
    pub fn publish(&self, order_id: Uuid, from: OrderState, to: OrderState) {
        let event = OrderEvent {
            order_id,
            from,
            to,
            occurred_at: chrono::Utc::now(),
        };
        let _ = self.sender.send(event);
    }

    /// Subscribe to transition events.
    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for OrderEventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_transition() {
        let publisher = OrderEventPublisher::new(16);
        let mut rx = publisher.subscribe();
        let id = Uuid::new_v4();

        publisher.publish(id, OrderState::Open, OrderState::Spawning);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.order_id, id);
        assert_eq!(event.from, OrderState::Open);
        assert_eq!(event.to, OrderState::Spawning);
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let publisher = OrderEventPublisher::default();
        publisher.publish(Uuid::new_v4(), OrderState::Open, OrderState::Closed);
        assert_eq!(publisher.subscriber_count(), 0);
    }
}
