//! In-process broker link.
//!
//! Behaves like a broker that the bridge is connected to: published messages
//! are fanned out to matching subscriptions, retained messages are replayed
//! to new subscriptions, and the link can be flipped to "unreachable".

use super::{BrokerLink, Fanout, MQTTMessage, Subscription};
use crate::error::{BridgeError, Result};
use crate::mapping::topic_matches;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Clone)]
pub struct MemoryBroker {
    fanout: Fanout,
    connected: Arc<AtomicBool>,
    retained: Arc<Mutex<Vec<MQTTMessage>>>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            fanout: Fanout::default(),
            connected: Arc::new(AtomicBool::new(true)),
            retained: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A link whose broker cannot be reached.
    pub fn unreachable() -> Self {
        let broker = Self::new();
        broker.set_connected(false);
        broker
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Publishes to current subscribers; returns how many received it.
    pub fn publish(&self, topic: &str, payload: &str) -> usize {
        self.fanout.dispatch(&MQTTMessage::from_topic(topic, payload))
    }

    /// Publishes and keeps the message for future subscriptions.
    ///
    /// A newer retained message replaces the older one on the same topic.
    pub fn publish_retained(&self, topic: &str, payload: &str) -> usize {
        let message = MQTTMessage::from_topic(topic, payload);
        {
            let mut retained = self.retained.lock().unwrap_or_else(|p| p.into_inner());
            match retained.iter_mut().find(|m| m.topic == topic) {
                Some(existing) => *existing = message.clone(),
                None => retained.push(message.clone()),
            }
        }
        self.fanout.dispatch(&message)
    }

    pub fn subscription_count(&self) -> usize {
        self.fanout.len()
    }

    pub fn active_filters(&self) -> Vec<String> {
        self.fanout.active_filters()
    }
}

#[async_trait]
impl BrokerLink for MemoryBroker {
    async fn subscribe(&self, filters: &[String]) -> Result<Subscription> {
        if !self.is_connected() {
            return Err(BridgeError::ConnectionFailed(
                "in-memory broker is marked unreachable".to_string(),
            ));
        }

        let subscription = self.fanout.register(filters);
        let retained = self.retained.lock().unwrap_or_else(|p| p.into_inner()).clone();
        let replayed = retained
            .iter()
            .filter(|m| filters.iter().any(|f| topic_matches(f, &m.topic)))
            .filter(|m| self.fanout.deliver_to(subscription.id, m))
            .count();
        debug!("Subscribed to {:?}, replayed {} retained", filters, replayed);

        Ok(subscription)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn retained_messages_replay_to_new_subscribers() {
        let broker = MemoryBroker::new();
        broker.publish_retained("selfmon/vmod.a/version", "1.0");
        broker.publish_retained("selfmon/vmod.a/version", "1.1");
        broker.publish_retained("selfmon/vmod.a/temperature", "20");

        let mut sub = broker
            .subscribe(&["selfmon/vmod.a/version".to_string()])
            .await
            .unwrap();
        assert_eq!(sub.recv().await.unwrap().payload, "1.1");

        assert_eq!(broker.publish("selfmon/vmod.a/version", "1.2"), 1);
        assert_eq!(sub.recv().await.unwrap().payload, "1.2");
    }

    #[tokio::test]
    async fn unreachable_broker_refuses_subscriptions() {
        let broker = MemoryBroker::unreachable();
        let err = broker.subscribe(&["selfmon/#".to_string()]).await.err().unwrap();
        assert!(matches!(err, BridgeError::ConnectionFailed(_)));
    }

    #[tokio::test]
    async fn dropping_a_subscription_unregisters_it() {
        let broker = MemoryBroker::new();
        let sub = broker.subscribe(&["selfmon/#".to_string()]).await.unwrap();
        assert_eq!(broker.subscription_count(), 1);
        sub.close();
        assert_eq!(broker.subscription_count(), 0);
        assert_eq!(broker.publish("selfmon/vmod.a/version", "1"), 0);
    }
}
