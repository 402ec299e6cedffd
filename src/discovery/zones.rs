//! Zone and output enumeration for one selected module.

use super::{collect, CollectWindow};
use crate::error::{BridgeError, Result};
use crate::mapping::topic::parse;
use crate::mapping::{Bus, Direction, ModuleId, ZoneCandidate};
use crate::mqtt::BrokerLink;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Filters covering every zone input, and outputs when requested.
pub fn zone_filters(module_id: &ModuleId, outputs_enabled: bool) -> Vec<String> {
    let root = module_id.root_topic();
    let mut filters: Vec<String> = Bus::ALL
        .iter()
        .map(|bus| format!("{}/{}/{}/#", root, bus, Direction::Input.subcategory()))
        .collect();

    if outputs_enabled {
        filters.extend(
            Bus::ALL
                .iter()
                .map(|bus| format!("{}/{}/{}/#", root, bus, Direction::Output.subcategory())),
        );
    }
    filters
}

/// Lists the distinct channels `module_id` publishes within `window`.
///
/// Messages from other modules, indexless channels and (when disabled)
/// outputs are ignored. The result is in first-seen order.
pub async fn enumerate(
    link: &dyn BrokerLink,
    module_id: &ModuleId,
    outputs_enabled: bool,
    window: &CollectWindow,
    cancel: &CancellationToken,
) -> Result<Vec<ZoneCandidate>> {
    if !link.is_connected() {
        return Err(BridgeError::ConnectionFailed(format!(
            "broker unreachable while enumerating {}",
            module_id
        )));
    }

    let filters = zone_filters(module_id, outputs_enabled);
    info!(
        "Enumerating zones of {} (outputs {}) for up to {:?}",
        module_id,
        if outputs_enabled { "on" } else { "off" },
        window.timeout
    );
    let subscription = link.subscribe(&filters).await?;

    let found = collect(subscription, window, cancel, |message| {
        let address = parse(&message.topic)?;
        if &address.module_id != module_id {
            return None;
        }
        let candidate = ZoneCandidate::from_path(&address.path)?;
        if candidate.is_output() && !outputs_enabled {
            debug!("Ignoring output {} while outputs are disabled", candidate);
            return None;
        }
        Some((candidate, candidate))
    })
    .await?;

    let candidates = found.into_values();
    info!("Found {} zone candidate(s) on {}", candidates.len(), module_id);
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::MemoryBroker;
    use std::time::Duration;

    fn module() -> ModuleId {
        ModuleId::from_user_input("010aa1").unwrap()
    }

    fn window() -> CollectWindow {
        CollectWindow::fixed(Duration::from_secs(10))
    }

    #[test]
    fn filters_cover_both_buses() {
        assert_eq!(
            zone_filters(&module(), false),
            vec![
                "selfmon/vmod.010aa1/prio/inputs/read/#",
                "selfmon/vmod.010aa1/vrio/inputs/read/#",
            ]
        );
        let with_outputs = zone_filters(&module(), true);
        assert_eq!(with_outputs.len(), 4);
        assert!(with_outputs.contains(&"selfmon/vmod.010aa1/vrio/outputs/#".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_candidates_in_first_seen_order() {
        let broker = MemoryBroker::new();
        broker.publish_retained("selfmon/vmod.010aa1/prio/inputs/read/2", "CLOSED");
        broker.publish_retained("selfmon/vmod.010aa1/prio/inputs/read/1", "OPEN");
        broker.publish_retained("selfmon/vmod.010aa1/vrio/inputs/read/1", "0");

        let publisher = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            publisher.publish("selfmon/vmod.010aa1/prio/inputs/read/2", "OPEN");
        });

        let found = enumerate(&broker, &module(), false, &window(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            found,
            vec![
                ZoneCandidate::input(Bus::Prio, 2),
                ZoneCandidate::input(Bus::Prio, 1),
                ZoneCandidate::input(Bus::Vrio, 1),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn large_panels_are_enumerated_completely() {
        let broker = MemoryBroker::new();
        for index in 1..=300 {
            broker.publish_retained(
                &format!("selfmon/vmod.010aa1/prio/inputs/read/{}", index),
                "CLOSED",
            );
        }

        let found = enumerate(&broker, &module(), false, &window(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(found.len(), 300);
        assert_eq!(found[0], ZoneCandidate::input(Bus::Prio, 1));
        assert_eq!(found[299], ZoneCandidate::input(Bus::Prio, 300));
    }

    #[tokio::test(start_paused = true)]
    async fn outputs_are_skipped_unless_enabled() {
        let broker = MemoryBroker::new();
        broker.publish_retained("selfmon/vmod.010aa1/prio/inputs/read/1", "OPEN");
        broker.publish_retained("selfmon/vmod.010aa1/prio/outputs/1", "ON");

        let without = enumerate(&broker, &module(), false, &window(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(without, vec![ZoneCandidate::input(Bus::Prio, 1)]);

        let with = enumerate(&broker, &module(), true, &window(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            with,
            vec![ZoneCandidate::input(Bus::Prio, 1), ZoneCandidate::output(Bus::Prio, 1)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn other_modules_and_indexless_topics_are_ignored() {
        let broker = MemoryBroker::new();
        let publisher = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            publisher.publish("selfmon/vmod.other/prio/inputs/read/5", "OPEN");
            publisher.publish("selfmon/vmod.010aa1/prio/inputs/read", "OPEN");
            publisher.publish("selfmon/vmod.010aa1/prio/inputs/read/07", "OPEN");
        });

        let found = enumerate(&broker, &module(), false, &window(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_broker_is_a_connection_error() {
        let broker = MemoryBroker::unreachable();
        let result = enumerate(&broker, &module(), true, &window(), &CancellationToken::new()).await;
        assert!(matches!(result, Err(BridgeError::ConnectionFailed(_))));
    }
}
