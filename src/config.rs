//! Bridge configuration, stored as TOML in the user's config directory.

use crate::discovery::CollectWindow;
use crate::mqtt::MqttConfig;
use crate::wizard::SetupWindows;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const CONFIG_DIR: &str = "selfmon";
const CONFIG_FILE: &str = "bridge.toml";
const STATE_DIR: &str = "state";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct DiscoverySettings {
    pub module_timeout_secs: u64,
    pub zone_timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_quiet_period_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_quiet_period_ms: Option<u64>,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            module_timeout_secs: 8,
            zone_timeout_secs: 10,
            module_quiet_period_ms: None,
            zone_quiet_period_ms: None,
        }
    }
}

impl DiscoverySettings {
    pub fn windows(&self) -> SetupWindows {
        SetupWindows {
            modules: window(self.module_timeout_secs, self.module_quiet_period_ms),
            zones: window(self.zone_timeout_secs, self.zone_quiet_period_ms),
        }
    }
}

fn window(timeout_secs: u64, quiet_period_ms: Option<u64>) -> CollectWindow {
    let window = CollectWindow::fixed(Duration::from_secs(timeout_secs));
    match quiet_period_ms {
        Some(ms) => window.with_quiet_period(Duration::from_millis(ms)),
        None => window,
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Integration files live below this directory.
    pub state_dir: PathBuf,
    pub mqtt: MqttConfig,
    pub discovery: DiscoverySettings,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            state_dir: config_dir().join(STATE_DIR),
            mqtt: MqttConfig::default(),
            discovery: DiscoverySettings::default(),
        }
    }
}

impl BridgeConfig {
    pub fn default_path() -> PathBuf {
        config_dir().join(CONFIG_FILE)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| eyre!("Failed to serialize config: {}", e))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write config file: {}", e))?;
        Ok(())
    }

    /// Writes a default file at `path` if none exists, then loads it.
    pub async fn ensure_default_config(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
        {
            info!("Creating default configuration at {}", path.display());
            Self::default().save(path).await?;
        }
        Self::load(path).await
    }
}

/// `<config dir>/selfmon`, falling back to the home directory, then `.`.
fn config_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_config_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let created = BridgeConfig::ensure_default_config(&path).await.unwrap();
        assert_eq!(created, BridgeConfig::default());

        let mut changed = created.clone();
        changed.mqtt.port = 8883;
        changed.save(&path).await.unwrap();

        let reloaded = BridgeConfig::ensure_default_config(&path).await.unwrap();
        assert_eq!(reloaded.mqtt.port, 8883);
    }

    #[test]
    fn partial_files_fall_back_to_defaults() {
        let config: BridgeConfig = toml::from_str(
            r#"
            [mqtt]
            host = "broker.local"

            [discovery]
            module_quiet_period_ms = 1500
            "#,
        )
        .unwrap();

        assert_eq!(config.mqtt.host, "broker.local");
        assert_eq!(config.mqtt.port, 1883);

        let windows = config.discovery.windows();
        assert_eq!(windows.modules.timeout, Duration::from_secs(8));
        assert_eq!(windows.modules.quiet_period, Some(Duration::from_millis(1500)));
        assert_eq!(windows.zones.quiet_period, None);
    }
}
