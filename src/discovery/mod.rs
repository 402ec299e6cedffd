//! Timed discovery against the broker's topic namespace.
//!
//! Both setup-time collectors follow the same discipline: open one
//! subscription, feed every message through the topic parser, keep the
//! distinct results in first-seen order, and stop at a hard deadline. An
//! optional quiet period ends the window early once results have stopped
//! changing. Cancelling the token drops the subscription and the
//! accumulated state.
//!
//! ```text
//! Subscription ──► extract(msg) ──► OrderedSet ──► Vec (first-seen order)
//!                      ▲
//!       deadline / quiet period / cancel
//! ```

pub mod modules;
pub mod zones;

pub use modules::{discover, DiscoveryOutcome};
pub use zones::{enumerate, zone_filters};

use crate::error::{BridgeError, Result};
use crate::mqtt::{MQTTMessage, Subscription};
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Bounds of one collection window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectWindow {
    /// Hard deadline, always honored.
    pub timeout: Duration,
    /// Early exit after this long without a new distinct result.
    pub quiet_period: Option<Duration>,
}

impl CollectWindow {
    pub fn fixed(timeout: Duration) -> Self {
        Self {
            timeout,
            quiet_period: None,
        }
    }

    pub fn with_quiet_period(mut self, quiet_period: Duration) -> Self {
        self.quiet_period = Some(quiet_period);
        self
    }
}

/// Insertion-ordered map: first position wins, last value wins.
#[derive(Debug, Clone)]
pub struct OrderedSet<K, V> {
    entries: Vec<(K, V)>,
    positions: HashMap<K, usize>,
}

impl<K: Eq + Hash + Clone, V> Default for OrderedSet<K, V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            positions: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone, V> OrderedSet<K, V> {
    /// Returns `true` when `key` was not seen before.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        match self.positions.get(&key) {
            Some(&position) => {
                self.entries[position].1 = value;
                false
            }
            None => {
                self.positions.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_values(self) -> Vec<V> {
        self.entries.into_iter().map(|(_, value)| value).collect()
    }
}

/// Runs one collection window over `subscription`.
///
/// The subscription is dropped, and thereby unsubscribed, on every exit path.
pub(crate) async fn collect<K, V, F>(
    mut subscription: Subscription,
    window: &CollectWindow,
    cancel: &CancellationToken,
    mut extract: F,
) -> Result<OrderedSet<K, V>>
where
    K: Eq + Hash + Clone,
    F: FnMut(&MQTTMessage) -> Option<(K, V)>,
{
    let deadline = deadline_after(window.timeout);
    let mut quiet_deadline: Option<Instant> = None;
    let mut found = OrderedSet::default();

    loop {
        let wake_at = match quiet_deadline {
            Some(quiet) if quiet < deadline => quiet,
            _ => deadline,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Collection on {:?} cancelled", subscription.filters());
                return Err(BridgeError::Cancelled(format!(
                    "collection on {:?}",
                    subscription.filters()
                )));
            }
            _ = tokio::time::sleep_until(wake_at) => break,
            message = subscription.recv() => {
                let Some(message) = message else {
                    return Err(BridgeError::ChannelClosed(format!(
                        "subscription on {:?} ended",
                        subscription.filters()
                    )));
                };
                if let Some((key, value)) = extract(&message) {
                    if found.insert(key, value) {
                        quiet_deadline = window.quiet_period.map(deadline_after);
                    }
                }
            }
        }
    }

    debug!(
        "Collection on {:?} finished with {} result(s)",
        subscription.filters(),
        found.len()
    );
    Ok(found)
}

/// `now + after`, saturating at roughly thirty years for oversized windows.
fn deadline_after(after: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(after)
        .unwrap_or_else(|| now + Duration::from_secs(FAR_FUTURE_SECS))
}

const FAR_FUTURE_SECS: u64 = 86_400 * 365 * 30;
