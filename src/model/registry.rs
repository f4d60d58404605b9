use crate::config::Config;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

/// A registered language model as recorded in `models.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub hf_repo_id: String,
    pub model_path: PathBuf,
    pub model_type: Option<String>,
    pub hidden_size: Option<usize>,
    pub vocab_size: Option<usize>,
    pub downloaded_at: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelInfo>,
}

impl ModelRegistry {
    pub fn load(config: &Config) -> Result<Self> {
        if !config.registry_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config.registry_path)?;
        let registry: ModelRegistry = toml::from_str(&content)?;
        tracing::debug!(
            "Loaded {} registered models from {:?}",
            registry.models.len(),
            config.registry_path
        );
        Ok(registry)
    }

    pub fn save(&self, config: &Config) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(&config.registry_path, content)?;
        Ok(())
    }

    /// Inserts the model, replacing any entry with the same name.
    pub fn add_model(&mut self, model: ModelInfo) -> Option<ModelInfo> {
        self.models.insert(model.name.clone(), model)
    }

    pub fn remove_model(&mut self, name: &str) -> Option<ModelInfo> {
        self.models.remove(name)
    }

    pub fn get_model(&self, name: &str) -> Result<&ModelInfo> {
        self.models
            .get(name)
            .ok_or_else(|| Error::ModelNotFound(name.to_string()))
    }

    pub fn list_models(&self) -> Vec<&ModelInfo> {
        self.models.values().collect()
    }
}
