//! # Broker link
//!
//! The bridge core never talks to a broker client directly. It needs exactly
//! two things: subscribe to a set of topic filters and receive the matching
//! messages as a stream, and ask whether the link is currently connected.
//! [`BrokerLink`] captures that contract.
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Broker connection parameters
//! ├── message_manager.rs  - Message representation
//! ├── mqtt_handler.rs     - rumqttc-backed link with connection state tracking
//! └── memory.rs           - In-process loopback link
//! ```
//!
//! Both links fan incoming messages out to every open [`Subscription`] whose
//! filters match. Dropping a subscription unregisters it; filters no longer
//! referenced by any subscription are released at the broker.

pub mod config;
pub mod memory;
pub mod message_manager;
pub mod mqtt_handler;

pub use config::MqttConfig;
pub use memory::MemoryBroker;
pub use message_manager::MQTTMessage;
pub use mqtt_handler::{ConnectionState, MQTTStatus, RumqttLink};

use crate::error::Result;
use crate::mapping::topic_matches;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::debug;

/// What the bridge core requires from an MQTT connection.
#[async_trait]
pub trait BrokerLink: Send + Sync {
    /// Opens a subscription on all `filters`.
    ///
    /// Fails with [`crate::BridgeError::ConnectionFailed`] when the broker is
    /// not reachable.
    async fn subscribe(&self, filters: &[String]) -> Result<Subscription>;

    fn is_connected(&self) -> bool;
}

type ReleaseHook = Box<dyn FnOnce(Vec<String>) + Send>;

/// Stream of messages matching a set of filters.
///
/// Unbounded: every message the broker delivers is kept, in delivery order,
/// until the holder reads it.
pub struct Subscription {
    id: u64,
    filters: Vec<String>,
    receiver: mpsc::UnboundedReceiver<MQTTMessage>,
    fanout: Fanout,
    on_release: Option<ReleaseHook>,
}

impl Subscription {
    pub fn filters(&self) -> &[String] {
        &self.filters
    }

    /// Next message, or `None` once the link has shut down.
    pub async fn recv(&mut self) -> Option<MQTTMessage> {
        self.receiver.recv().await
    }

    /// Unsubscribes explicitly; equivalent to dropping.
    pub fn close(self) {}

    fn with_release_hook(mut self, hook: ReleaseHook) -> Self {
        self.on_release = Some(hook);
        self
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let orphaned = self.fanout.remove(self.id);
        debug!(
            "Subscription {} closed, {} filter(s) released",
            self.id,
            orphaned.len()
        );
        if let Some(hook) = self.on_release.take() {
            hook(orphaned);
        }
    }
}

#[derive(Default)]
struct FanoutInner {
    next_id: u64,
    subscribers: HashMap<u64, (Vec<String>, mpsc::UnboundedSender<MQTTMessage>)>,
}

/// Registry of open subscriptions shared between a link and its subscriptions.
#[derive(Clone, Default)]
pub(crate) struct Fanout {
    inner: Arc<Mutex<FanoutInner>>,
}

impl Fanout {
    fn lock(&self) -> MutexGuard<'_, FanoutInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn register(&self, filters: &[String]) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.insert(id, (filters.to_vec(), sender));

        Subscription {
            id,
            filters: filters.to_vec(),
            receiver,
            fanout: self.clone(),
            on_release: None,
        }
    }

    /// Removes a subscriber and returns the filters nobody else still uses.
    fn remove(&self, id: u64) -> Vec<String> {
        let mut inner = self.lock();
        let Some((filters, _)) = inner.subscribers.remove(&id) else {
            return Vec::new();
        };

        filters
            .into_iter()
            .filter(|filter| {
                !inner
                    .subscribers
                    .values()
                    .any(|(others, _)| others.contains(filter))
            })
            .collect()
    }

    /// Delivers a message to every matching subscriber; returns the count.
    pub(crate) fn dispatch(&self, message: &MQTTMessage) -> usize {
        let inner = self.lock();
        let mut delivered = 0;

        for (id, (filters, sender)) in inner.subscribers.iter() {
            if !filters.iter().any(|f| topic_matches(f, &message.topic)) {
                continue;
            }
            match sender.send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => debug!("Subscription {} already closed", id),
            }
        }

        delivered
    }

    /// Delivers to one subscriber if its filters match (retained replay).
    pub(crate) fn deliver_to(&self, id: u64, message: &MQTTMessage) -> bool {
        let inner = self.lock();
        match inner.subscribers.get(&id) {
            Some((filters, sender)) if filters.iter().any(|f| topic_matches(f, &message.topic)) => {
                sender.send(message.clone()).is_ok()
            }
            _ => false,
        }
    }

    /// Distinct filters of all open subscriptions.
    pub(crate) fn active_filters(&self) -> Vec<String> {
        let inner = self.lock();
        let mut filters: Vec<String> = inner
            .subscribers
            .values()
            .flat_map(|(filters, _)| filters.iter().cloned())
            .collect();
        filters.sort();
        filters.dedup();
        filters
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dispatch_reaches_only_matching_subscriptions() {
        let fanout = Fanout::default();
        let mut inputs = fanout.register(&["selfmon/vmod.a/prio/inputs/read/#".to_string()]);
        let mut everything = fanout.register(&["selfmon/#".to_string()]);

        let delivered = fanout.dispatch(&MQTTMessage::from_topic(
            "selfmon/vmod.a/temperature",
            "21.5",
        ));
        assert_eq!(delivered, 1);
        assert_eq!(everything.recv().await.unwrap().payload, "21.5");

        fanout.dispatch(&MQTTMessage::from_topic(
            "selfmon/vmod.a/prio/inputs/read/1",
            "OPEN",
        ));
        assert_eq!(inputs.recv().await.unwrap().payload, "OPEN");
        assert_eq!(everything.recv().await.unwrap().payload, "OPEN");
    }

    #[tokio::test]
    async fn bursts_are_delivered_in_order_without_loss() {
        let fanout = Fanout::default();
        let mut zone = fanout.register(&["selfmon/vmod.a/prio/inputs/read/1".to_string()]);

        for i in 0..1000 {
            let delivered = fanout.dispatch(&MQTTMessage::from_topic(
                "selfmon/vmod.a/prio/inputs/read/1",
                i.to_string(),
            ));
            assert_eq!(delivered, 1);
        }
        for i in 0..1000 {
            assert_eq!(zone.recv().await.unwrap().payload, i.to_string());
        }
    }

    #[test]
    fn dropping_releases_only_unshared_filters() {
        let fanout = Fanout::default();
        let shared = "selfmon/#".to_string();
        let own = "selfmon/vmod.a/version".to_string();

        let _keep = fanout.register(&[shared.clone()]);
        let released = Arc::new(Mutex::new(Vec::new()));
        let sink = released.clone();
        let sub = fanout
            .register(&[shared.clone(), own.clone()])
            .with_release_hook(Box::new(move |filters| {
                *sink.lock().unwrap() = filters;
            }));
        assert_eq!(fanout.active_filters(), vec![shared.clone(), own.clone()]);

        drop(sub);
        assert_eq!(*released.lock().unwrap(), vec![own]);
        assert_eq!(fanout.active_filters(), vec![shared]);
        assert_eq!(fanout.len(), 1);
    }
}
