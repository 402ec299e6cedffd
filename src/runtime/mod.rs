//! Runtime subscriber with statum state machine for one integration instance
//!
//! Creates the host entities of an [`IntegrationConfig`], subscribes to
//! exactly their topics and pushes decoded payloads to the host. A single
//! consumer task owns the subscription, so updates reach the host in broker
//! delivery order.

pub mod decode;

pub use decode::{decode_binary, decode_temperature, Decoder};

use crate::error::{BridgeError, Result};
use crate::host::{EntityHost, EntityState};
use crate::mapping::EntityKind;
use crate::mqtt::{BrokerLink, Subscription};
use crate::persistence::IntegrationConfig;
use statum::{machine, state};
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[state]
#[derive(Debug, Clone)]
pub enum RuntimeState {
    Configured, // Topic bindings built, nothing subscribed
    Running,    // Consumer task owns the subscription
    Stopped,    // Task joined, subscription released
}

/// Where a topic's payloads go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub entity_id: String,
    pub decoder: Decoder,
}

/// Counters reported by the consumer task when it ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeReport {
    pub messages: usize,
    pub updates: usize,
    pub rejected: usize,
}

#[machine]
pub struct RuntimeSubscriber<S: RuntimeState> {
    config: IntegrationConfig,
    bindings: HashMap<String, Binding>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<RuntimeReport>>,
    report: Option<RuntimeReport>,
}

impl<S: RuntimeState> RuntimeSubscriber<S> {
    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    /// Subscribed topics, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.bindings.keys().cloned().collect();
        topics.sort();
        topics
    }
}

impl RuntimeSubscriber<Configured> {
    pub fn create(config: IntegrationConfig) -> Self {
        let bindings: HashMap<String, Binding> = config
            .topic_bindings()
            .into_iter()
            .map(|(topic, definition)| {
                let decoder = match (definition.kind, definition.sensor_class) {
                    (EntityKind::BinarySensor, _) => Decoder::Binary,
                    (EntityKind::Sensor, Some("temperature")) => Decoder::Temperature,
                    (EntityKind::Sensor, _) => Decoder::Text,
                };
                (
                    topic,
                    Binding {
                        entity_id: definition.unique_id,
                        decoder,
                    },
                )
            })
            .collect();

        info!(
            "Runtime for {} configured with {} topic(s)",
            config.module_id,
            bindings.len()
        );

        Self::new(
            config,
            bindings,
            CancellationToken::new(),
            None, // task
            None, // report
        )
    }

    /// Subscribes, creates the host entities and spawns the consumer task.
    pub async fn start(
        self,
        link: &dyn BrokerLink,
        host: Box<dyn EntityHost>,
    ) -> Result<RuntimeSubscriber<Running>> {
        let subscription = link.subscribe(&self.topics()).await?;
        Ok(self.spawn(subscription, host))
    }

    /// Like [`start`](Self::start), but keeps retrying every `retry_delay`
    /// while the broker is unreachable.
    ///
    /// Other subscribe errors end the attempt, as does cancelling `cancel`.
    pub async fn start_when_connected(
        self,
        link: &dyn BrokerLink,
        host: Box<dyn EntityHost>,
        retry_delay: Duration,
        cancel: &CancellationToken,
    ) -> Result<RuntimeSubscriber<Running>> {
        let topics = self.topics();
        let mut attempts = 0usize;

        let subscription = loop {
            attempts += 1;
            match link.subscribe(&topics).await {
                Ok(subscription) => break subscription,
                Err(BridgeError::ConnectionFailed(reason)) => {
                    warn!(
                        "Runtime for {} waiting for broker (attempt {}): {}",
                        self.config.module_id, attempts, reason
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return Err(BridgeError::Cancelled(format!(
                                "runtime start for {}",
                                self.config.module_id
                            )));
                        }
                        _ = tokio::time::sleep(retry_delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        };

        Ok(self.spawn(subscription, host))
    }

    fn spawn(
        mut self,
        subscription: Subscription,
        mut host: Box<dyn EntityHost>,
    ) -> RuntimeSubscriber<Running> {
        for definition in self.config.entities() {
            host.create_entity(&definition);
        }

        let task = tokio::spawn(consume(
            subscription,
            self.bindings.clone(),
            host,
            self.shutdown.clone(),
        ));
        self.task = Some(task);

        info!("Runtime for {} running", self.config.module_id);
        self.transition()
    }
}

impl RuntimeSubscriber<Running> {
    /// Token that stops the consumer task when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// `true` once the consumer ended on its own (link shut down).
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    pub async fn stop(mut self) -> RuntimeSubscriber<Stopped> {
        info!("Stopping runtime for {}", self.config.module_id);
        self.shutdown.cancel();

        if let Some(task) = self.task.take() {
            match task.await {
                Ok(report) => self.report = Some(report),
                Err(e) => error!("Runtime task for {} failed: {}", self.config.module_id, e),
            }
        }
        self.transition()
    }
}

impl RuntimeSubscriber<Stopped> {
    pub fn report(&self) -> Option<RuntimeReport> {
        self.report
    }
}

async fn consume(
    mut subscription: Subscription,
    bindings: HashMap<String, Binding>,
    mut host: Box<dyn EntityHost>,
    shutdown: CancellationToken,
) -> RuntimeReport {
    let mut last: HashMap<String, EntityState> = HashMap::new();
    let mut report = RuntimeReport::default();

    loop {
        let message = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            message = subscription.recv() => match message {
                Some(message) => message,
                None => {
                    warn!("Runtime subscription closed by the link");
                    break;
                }
            },
        };
        report.messages += 1;

        let Some(binding) = bindings.get(&message.topic) else {
            debug!("No entity bound to {}", message.topic);
            continue;
        };

        let Some(state) = binding.decoder.decode(&message.payload) else {
            report.rejected += 1;
            continue;
        };
        if state == EntityState::Unavailable {
            report.rejected += 1;
        }

        if last.get(&binding.entity_id) == Some(&state) {
            debug!("{} unchanged", binding.entity_id);
            continue;
        }

        host.update_state(&binding.entity_id, &state);
        last.insert(binding.entity_id.clone(), state);
        report.updates += 1;
    }

    debug!("Runtime consumer stopped: {:?}", report);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::RecordingHost;
    use crate::mapping::{AlwaysOnEntity, Bus, ModuleId, ZoneCandidate};
    use crate::mqtt::MemoryBroker;
    use crate::persistence::SensorConfig;

    const ZONE_1: &str = "selfmon/vmod.010aa1/prio/inputs/read/1";
    const TEMPERATURE: &str = "selfmon/vmod.010aa1/temperature";

    fn config() -> IntegrationConfig {
        IntegrationConfig::new(
            ModuleId::from_user_input("010aa1").unwrap(),
            false,
            vec![SensorConfig {
                name: "Front Door".into(),
                ..SensorConfig::with_defaults(ZoneCandidate::input(Bus::Prio, 1))
            }],
        )
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn subscribes_to_exactly_the_configured_topics() {
        let broker = MemoryBroker::new();
        let host = RecordingHost::new();
        let runtime = RuntimeSubscriber::create(config());
        let expected = runtime.topics();
        assert_eq!(expected.len(), 1 + AlwaysOnEntity::ALL.len());

        let running = runtime.start(&broker, Box::new(host.clone())).await.unwrap();
        assert_eq!(broker.active_filters(), expected);
        assert_eq!(host.created().len(), 5);

        running.stop().await;
        assert_eq!(broker.subscription_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn binary_payloads_are_decoded_and_deduplicated() {
        let broker = MemoryBroker::new();
        let host = RecordingHost::new();
        let running = RuntimeSubscriber::create(config())
            .start(&broker, Box::new(host.clone()))
            .await
            .unwrap();

        for payload in ["OPEN", "open", "1", " closed ", "garbage"] {
            broker.publish(ZONE_1, payload);
        }
        broker.publish("selfmon/vmod.010aa1/prio/inputs/read/2", "OPEN");
        settle().await;

        assert_eq!(
            host.updates_for("selfmon_010aa1_prio_zone_1"),
            vec![EntityState::On, EntityState::Off, EntityState::Unavailable]
        );
        assert!(host.updates_for("selfmon_010aa1_prio_zone_2").is_empty());

        let stopped = running.stop().await;
        let report = stopped.report().unwrap();
        assert_eq!(report.messages, 5);
        assert_eq!(report.updates, 3);
        assert_eq!(report.rejected, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sensors_pass_through_and_bad_temperatures_are_skipped() {
        let broker = MemoryBroker::new();
        broker.publish_retained(TEMPERATURE, "21.5");
        let host = RecordingHost::new();
        let running = RuntimeSubscriber::create(config())
            .start(&broker, Box::new(host.clone()))
            .await
            .unwrap();

        broker.publish(TEMPERATURE, "n/a");
        broker.publish("selfmon/vmod.010aa1/vkp/display/line1", "  SET  ");
        broker.publish("selfmon/vmod.010aa1/version", "2.14");
        settle().await;

        assert_eq!(
            host.updates_for("selfmon_010aa1_temperature"),
            vec![EntityState::Number(21.5)]
        );
        assert_eq!(
            host.updates_for("selfmon_010aa1_vkp_line1"),
            vec![EntityState::Text("  SET  ".into())]
        );
        assert_eq!(
            host.updates_for("selfmon_010aa1_version"),
            vec![EntityState::Text("2.14".into())]
        );
        running.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn every_update_of_a_burst_reaches_the_host_in_order() {
        let broker = MemoryBroker::new();
        let host = RecordingHost::new();
        let running = RuntimeSubscriber::create(config())
            .start(&broker, Box::new(host.clone()))
            .await
            .unwrap();

        for i in 0..600 {
            broker.publish(ZONE_1, if i % 2 == 0 { "OPEN" } else { "CLOSED" });
        }
        broker.publish(ZONE_1, "OPEN");
        settle().await;

        let updates = host.updates_for("selfmon_010aa1_prio_zone_1");
        assert_eq!(updates.len(), 601);
        assert_eq!(updates.last(), Some(&EntityState::On));

        let report = running.stop().await.report().unwrap();
        assert_eq!(report.messages, 601);
    }

    #[tokio::test(start_paused = true)]
    async fn start_when_connected_waits_for_the_broker() {
        let broker = MemoryBroker::unreachable();
        broker.publish_retained(ZONE_1, "OPEN");
        let reconnecting = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            reconnecting.set_connected(true);
        });

        let host = RecordingHost::new();
        let started = tokio::time::Instant::now();
        let running = RuntimeSubscriber::create(config())
            .start_when_connected(
                &broker,
                Box::new(host.clone()),
                Duration::from_secs(1),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(host.created().len(), 5);

        settle().await;
        assert_eq!(
            host.updates_for("selfmon_010aa1_prio_zone_1"),
            vec![EntityState::On]
        );
        running.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_when_connected_stops_on_cancel() {
        let broker = MemoryBroker::unreachable();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let host = RecordingHost::new();
        let result = RuntimeSubscriber::create(config())
            .start_when_connected(&broker, Box::new(host.clone()), Duration::from_secs(1), &cancel)
            .await;
        assert!(matches!(result, Err(BridgeError::Cancelled(_))));
        assert!(host.created().is_empty());
        assert_eq!(broker.subscription_count(), 0);
    }

    #[tokio::test]
    async fn start_fails_when_the_broker_is_unreachable() {
        let broker = MemoryBroker::unreachable();
        let host = RecordingHost::new();
        let result = RuntimeSubscriber::create(config())
            .start(&broker, Box::new(host.clone()))
            .await;
        assert!(matches!(result, Err(BridgeError::ConnectionFailed(_))));
        assert!(host.created().is_empty());
    }
}
