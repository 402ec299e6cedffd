//! rumqttc-backed broker link.
//!
//! The event loop runs in its own tokio task. It tracks the connection state,
//! re-subscribes the active filters after every reconnect and fans incoming
//! publishes out to the open subscriptions.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::MqttConfig;
use super::{BrokerLink, Fanout, MQTTMessage, Subscription};
use crate::error::{BridgeError, Result};

const REQUEST_CAPACITY: usize = 100;
const MAX_ERROR_MESSAGES: usize = 10;

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
    Reconnecting,
}

#[derive(Clone, Debug, Default)]
pub struct MQTTStatus {
    pub connection_state: ConnectionState,
    pub error_messages: Vec<String>,
    pub messages_received: usize,
    pub last_activity: Option<chrono::DateTime<chrono::Local>>,
}

pub struct RumqttLink {
    client: AsyncClient,
    fanout: Fanout,
    status: watch::Receiver<MQTTStatus>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RumqttLink {
    /// Creates the client and spawns the event loop.
    ///
    /// Returns immediately; use [`RumqttLink::wait_connected`] to block until
    /// the broker acknowledged the connection.
    pub fn start(config: &MqttConfig) -> Self {
        let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
        if let Some(username) = &config.username {
            options.set_credentials(username.clone(), config.password.clone().unwrap_or_default());
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let fanout = Fanout::default();
        let (status_tx, status_rx) = watch::channel(MQTTStatus {
            connection_state: ConnectionState::Connecting,
            ..MQTTStatus::default()
        });
        let shutdown = CancellationToken::new();

        info!("Connecting to MQTT broker {}:{}", config.host, config.port);
        let task = tokio::spawn(drive_event_loop(
            eventloop,
            client.clone(),
            fanout.clone(),
            status_tx,
            shutdown.clone(),
            Duration::from_millis(config.reconnect_delay_ms),
        ));

        Self {
            client,
            fanout,
            status: status_rx,
            shutdown,
            task: Some(task),
        }
    }

    /// Waits for the first ConnAck; `false` if it did not arrive in time.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut status = self.status.clone();
        let connected = status.wait_for(|s| s.connection_state == ConnectionState::Connected);
        let reached = matches!(tokio::time::timeout(timeout, connected).await, Ok(Ok(_)));
        reached
    }

    pub fn status(&self) -> MQTTStatus {
        self.status.borrow().clone()
    }

    /// Disconnects and waits for the event loop task to finish.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.client.disconnect().await {
            debug!("Disconnect request not delivered: {}", e);
        }
        self.shutdown.cancel();

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("MQTT event loop task panicked: {}", e);
            }
        }
        info!("MQTT link shut down");
    }
}

impl Drop for RumqttLink {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl BrokerLink for RumqttLink {
    async fn subscribe(&self, filters: &[String]) -> Result<Subscription> {
        if !self.is_connected() {
            return Err(BridgeError::ConnectionFailed(format!(
                "broker not connected ({:?})",
                self.status.borrow().connection_state
            )));
        }

        // Register before subscribing so retained messages are not missed.
        let client = self.client.clone();
        let subscription = self.fanout.register(filters).with_release_hook(Box::new(move |orphaned| {
            for filter in orphaned {
                if let Err(e) = client.try_unsubscribe(filter.clone()) {
                    warn!("Failed to unsubscribe {}: {}", filter, e);
                }
            }
        }));

        for filter in filters {
            self.client
                .subscribe(filter.clone(), QoS::AtLeastOnce)
                .await
                .map_err(|e| BridgeError::SubscribeFailed {
                    filter: filter.clone(),
                    reason: e.to_string(),
                })?;
            debug!("Subscribed to {}", filter);
        }

        Ok(subscription)
    }

    fn is_connected(&self) -> bool {
        self.status.borrow().connection_state == ConnectionState::Connected
    }
}

async fn drive_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    fanout: Fanout,
    status: watch::Sender<MQTTStatus>,
    shutdown: CancellationToken,
    reconnect_delay: Duration,
) {
    let mut connected_once = false;

    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("MQTT connection established");
                status.send_modify(|s| s.connection_state = ConnectionState::Connected);

                if connected_once {
                    for filter in fanout.active_filters() {
                        if let Err(e) = client.try_subscribe(filter.clone(), QoS::AtLeastOnce) {
                            warn!("Failed to restore subscription {}: {}", filter, e);
                        }
                    }
                }
                connected_once = true;
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = MQTTMessage::from_bytes(publish.topic.clone(), &publish.payload);
                status.send_modify(|s| {
                    s.messages_received += 1;
                    s.last_activity = Some(Local::now());
                });
                let delivered = fanout.dispatch(&message);
                debug!("{} delivered to {} subscription(s)", message.topic, delivered);
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("Broker closed the connection");
                status.send_modify(|s| s.connection_state = ConnectionState::Reconnecting);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("MQTT connection error: {}", e);
                status.send_modify(|s| {
                    s.connection_state = if connected_once {
                        ConnectionState::Reconnecting
                    } else {
                        ConnectionState::Failed
                    };
                    s.error_messages.push(e.to_string());
                    if s.error_messages.len() > MAX_ERROR_MESSAGES {
                        s.error_messages.remove(0);
                    }
                });

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(reconnect_delay) => {}
                }
            }
        }
    }

    status.send_modify(|s| s.connection_state = ConnectionState::Disconnected);
    debug!("MQTT event loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refused() -> MqttConfig {
        MqttConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            reconnect_delay_ms: 50,
            ..MqttConfig::default()
        }
    }

    #[tokio::test]
    async fn wait_connected_gives_up_on_a_refused_broker() {
        let mut link = RumqttLink::start(&refused());
        assert!(!link.wait_connected(Duration::from_millis(300)).await);
        assert!(!link.is_connected());

        let err = link.subscribe(&["selfmon/#".to_string()]).await.err().unwrap();
        assert!(matches!(err, BridgeError::ConnectionFailed(_)));
        link.shutdown().await;
        assert_eq!(link.status().connection_state, ConnectionState::Disconnected);
    }
}
