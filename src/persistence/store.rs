use super::IntegrationConfig;
use crate::mapping::ModuleId;
use color_eyre::{eyre::eyre, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const INTEGRATIONS_DIR: &str = "integrations";
const FILE_EXTENSION: &str = "toml";

/// One TOML file per configured module below `<state dir>/integrations`.
#[derive(Debug, Clone)]
pub struct IntegrationStore {
    dir: PathBuf,
}

impl IntegrationStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: state_dir.as_ref().join(INTEGRATIONS_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, module_id: &ModuleId) -> PathBuf {
        self.dir
            .join(format!("{}.{}", module_id.as_str(), FILE_EXTENSION))
    }

    pub async fn save(&self, config: &IntegrationConfig) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| eyre!("Failed to create integrations directory: {}", e))?;

        let content = toml::to_string_pretty(config)
            .map_err(|e| eyre!("Failed to serialize integration {}: {}", config.module_id, e))?;

        let path = self.path_for(&config.module_id);
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| eyre!("Failed to write integration file {}: {}", path.display(), e))?;

        info!("Integration {} saved to {}", config.module_id, path.display());
        Ok(path)
    }

    pub async fn load(&self, module_id: &ModuleId) -> Result<Option<IntegrationConfig>> {
        let path = self.path_for(module_id);
        if !tokio::fs::try_exists(&path)
            .await
            .map_err(|e| eyre!("Failed to check if integration file exists: {}", e))?
        {
            return Ok(None);
        }

        read_config(&path).await.map(Some)
    }

    /// Every stored integration, ordered by module id.
    ///
    /// Unreadable files are skipped with a warning.
    pub async fn load_all(&self) -> Result<Vec<IntegrationConfig>> {
        let mut configs = Vec::new();
        for path in self.files().await? {
            match read_config(&path).await {
                Ok(config) => configs.push(config),
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }
        configs.sort_by(|a, b| a.module_id.cmp(&b.module_id));
        Ok(configs)
    }

    /// Deletes the integration; `false` if none was stored.
    pub async fn remove(&self, module_id: &ModuleId) -> Result<bool> {
        let path = self.path_for(module_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Integration {} removed", module_id);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(eyre!("Failed to remove {}: {}", path.display(), e)),
        }
    }

    pub async fn configured_modules(&self) -> Result<BTreeSet<ModuleId>> {
        Ok(self
            .load_all()
            .await?
            .into_iter()
            .map(|config| config.module_id)
            .collect())
    }

    async fn files(&self) -> Result<Vec<PathBuf>> {
        if !tokio::fs::try_exists(&self.dir)
            .await
            .map_err(|e| eyre!("Failed to check integrations directory: {}", e))?
        {
            debug!("No integrations directory at {}", self.dir.display());
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| eyre!("Failed to read integrations directory: {}", e))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| eyre!("Failed to read directory entry: {}", e))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(FILE_EXTENSION) {
                files.push(path);
            }
        }
        Ok(files)
    }
}

async fn read_config(path: &Path) -> Result<IntegrationConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| eyre!("Failed to read integration file {}: {}", path.display(), e))?;

    let config: IntegrationConfig = toml::from_str(&content)
        .map_err(|e| eyre!("Failed to parse integration file {}: {}", path.display(), e))?;

    Ok(config.normalized())
}
