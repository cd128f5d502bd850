use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::QueueError;

pub type EventSender = broadcast::Sender<String>;
pub type EventReceiver = broadcast::Receiver<String>;

/// Real-time fan-out to queue displays and dashboards.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, topic: &str, message: Value) -> Result<(), QueueError>;
}

/// In-process topics over tokio broadcast channels. Slow subscribers lag
/// and skip messages rather than block publishers.
pub struct BroadcastEventBus {
    channels: RwLock<HashMap<String, EventSender>>,
    capacity: usize,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub async fn subscribe(&self, topic: &str) -> EventReceiver {
        let mut channels = self.channels.write().await;
        channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }
}

#[async_trait]
impl EventBus for BroadcastEventBus {
    async fn publish(&self, topic: &str, message: Value) -> Result<(), QueueError> {
        let payload = serde_json::to_string(&message)?;

        let channels = self.channels.read().await;
        match channels.get(topic) {
            Some(sender) => {
                if sender.send(payload).is_err() {
                    debug!("No live subscribers on {}", topic);
                }
            }
            None => debug!("No subscribers registered for {}", topic),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscribers_receive_topic_messages_only() {
        let bus = BroadcastEventBus::new(16);
        let mut queue = bus.subscribe("queue_c1").await;
        let mut other = bus.subscribe("queue_c2").await;

        bus.publish("queue_c1", json!({"new_status": "in-queue"})).await.unwrap();

        let received: Value = serde_json::from_str(&queue.recv().await.unwrap()).unwrap();
        assert_eq!(received["new_status"], "in-queue");
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_fine() {
        let bus = BroadcastEventBus::new(16);
        assert!(bus.publish("appointments_c1", json!({})).await.is_ok());

        // A subscriber that joins later only sees what comes after it.
        let mut late = bus.subscribe("appointments_c1").await;
        assert!(late.try_recv().is_err());
    }
}
