//! Module discovery: which VMOD instances publish on this broker?

use super::{collect, CollectWindow};
use crate::error::{BridgeError, Result};
use crate::mapping::topic::{parse, DISCOVERY_FILTER};
use crate::mapping::ModuleId;
use crate::mqtt::BrokerLink;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// How the wizard continues after discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// Nothing seen within the window; fall back to manual entry.
    NoneFound,
    /// Exactly one module; selected without asking.
    Single(ModuleId),
    /// Several modules, in discovery order.
    Several(Vec<ModuleId>),
}

impl From<Vec<ModuleId>> for DiscoveryOutcome {
    fn from(mut modules: Vec<ModuleId>) -> Self {
        match modules.len() {
            0 => DiscoveryOutcome::NoneFound,
            1 => DiscoveryOutcome::Single(modules.remove(0)),
            _ => DiscoveryOutcome::Several(modules),
        }
    }
}

/// Collects the distinct module ids seen on the broker within `window`.
///
/// An empty result means "connected, but nobody published"; an unreachable
/// broker is reported as [`BridgeError::ConnectionFailed`] instead.
pub async fn discover(
    link: &dyn BrokerLink,
    window: &CollectWindow,
    cancel: &CancellationToken,
) -> Result<Vec<ModuleId>> {
    if !link.is_connected() {
        return Err(BridgeError::ConnectionFailed(
            "broker unreachable during module discovery".to_string(),
        ));
    }

    info!(
        "Discovering SelfMon modules for up to {:?}",
        window.timeout
    );
    let subscription = link.subscribe(&[DISCOVERY_FILTER.to_string()]).await?;
    let found = collect(subscription, window, cancel, |message| {
        parse(&message.topic).map(|address| (address.module_id.clone(), address.module_id))
    })
    .await?;

    let modules = found.into_values();
    info!("Discovery finished, found {} module(s): {:?}", modules.len(), modules);
    Ok(modules)
}
