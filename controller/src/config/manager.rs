use super::Config;
use anyhow::{anyhow, Result};
use glob::glob;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

use crate::compute::ComputeSettings;

pub struct ConfigManager {
    current_config: Arc<Config>,
}

impl ConfigManager {
    pub async fn new(config_dir: String) -> Result<Self> {
        let config = Self::load_configuration(&config_dir).await?;
        Ok(Self {
            current_config: Arc::new(config),
        })
    }

    pub fn get_current_config(&self) -> Arc<Config> {
        self.current_config.clone()
    }

    async fn load_configuration(config_dir: &str) -> Result<Config> {
        let main_config_path = format!("{}/main.toml", config_dir);
        let main_config_content = fs::read_to_string(&main_config_path).await
            .map_err(|e| anyhow!("Failed to read main config {}: {}", main_config_path, e))?;

        let mut config: Config = toml::from_str(&main_config_content)
            .map_err(|e| anyhow!("Failed to parse main config: {}", e))?;

        // Every other file describes one compute
        let pattern = format!("{}/*.toml", config_dir);
        let mut computes = HashMap::new();

        for entry in glob(&pattern).map_err(|e| anyhow!("Glob pattern error: {}", e))? {
            let path = entry.map_err(|e| anyhow!("Glob entry error: {}", e))?;
            let filename = path.file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| anyhow!("Invalid filename"))?;

            if filename == "main.toml" {
                continue;
            }

            let compute_name = filename.strip_suffix(".toml")
                .ok_or_else(|| anyhow!("Invalid config filename: {}", filename))?;

            debug!("Loading compute config: {}", path.display());

            let content = fs::read_to_string(&path).await
                .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;

            let mut settings: ComputeSettings = toml::from_str(&content)
                .map_err(|e| anyhow!("Failed to parse {}: {}", path.display(), e))?;

            // The file name identifies the compute when no id is given
            if settings.compute_id.is_none() {
                settings.compute_id = Some(compute_name.to_string());
            }

            computes.insert(compute_name.to_string(), settings);
        }

        config.computes = computes;

        info!("Loaded {} computes (local compute {})",
            config.computes.len(),
            if config.local_compute_enabled { "enabled" } else { "disabled" }
        );

        Ok(config)
    }
}
