use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::download::ModelStore;
use crate::model::hub::{LanguageModel, TokenizerArtifact, WeightFormat};
use crate::model::registry::{ModelInfo, ModelRegistry};
use async_trait::async_trait;
use candle_core::pickle;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Read access to registered models for the HTTP and CLI layers.
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    async fn list_models(&self) -> Vec<ModelInfo>;

    async fn get_model(&self, name: &str) -> Result<ModelInfo>;

    /// Artifacts registered during this process's lifetime, if `name` is one of them.
    async fn get_loaded(&self, name: &str) -> Option<Arc<LoadedModel>>;
}

pub struct LoadedModel {
    pub model: LanguageModel,
    pub tokenizer: TokenizerArtifact,
}

pub struct LanguageModelService {
    config: Config,
    registry: RwLock<ModelRegistry>,
    loaded: RwLock<HashMap<String, Arc<LoadedModel>>>,
}

impl LanguageModelService {
    pub fn open(config: Config) -> Result<Self> {
        let registry = ModelRegistry::load(&config)?;
        Ok(Self {
            config,
            registry: RwLock::new(registry),
            loaded: RwLock::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl ModelStore<LanguageModel, TokenizerArtifact> for LanguageModelService {
    async fn add_new_model(
        &self,
        name: &str,
        path: &Path,
        model: LanguageModel,
        tokenizer: TokenizerArtifact,
    ) -> Result<()> {
        tracing::info!("Storing model '{}' at {:?}", name, path);

        let dest = path.to_path_buf();
        let (model, tokenizer) = tokio::task::spawn_blocking(move || {
            persist_artifacts(&dest, &model, &tokenizer).map(|_| (model, tokenizer))
        })
        .await
        .map_err(|e| Error::RegistryError(format!("Storage task failed: {}", e)))??;

        let info = ModelInfo {
            name: name.to_string(),
            hf_repo_id: model.repo_id.clone(),
            model_path: path.to_path_buf(),
            model_type: model.summary.model_type.clone(),
            hidden_size: model.summary.hidden_size,
            vocab_size: model.summary.vocab_size.or(Some(tokenizer.vocab_size)),
            downloaded_at: chrono::Utc::now().to_rfc3339(),
        };

        {
            let mut registry = self.registry.write().await;
            let previous = registry.add_model(info);
            if previous.is_some() {
                tracing::warn!("Replacing existing registration for '{}'", name);
            }
            if let Err(e) = registry.save(&self.config) {
                // keep memory in line with models.toml
                match previous {
                    Some(previous) => {
                        registry.add_model(previous);
                    }
                    None => {
                        registry.remove_model(name);
                    }
                }
                return Err(e);
            }
        }

        self.loaded.write().await.insert(
            name.to_string(),
            Arc::new(LoadedModel {
                model,
                tokenizer,
            }),
        );

        Ok(())
    }
}

#[async_trait]
impl ModelCatalog for LanguageModelService {
    async fn list_models(&self) -> Vec<ModelInfo> {
        self.registry
            .read()
            .await
            .list_models()
            .into_iter()
            .cloned()
            .collect()
    }

    async fn get_model(&self, name: &str) -> Result<ModelInfo> {
        self.registry.read().await.get_model(name).cloned()
    }

    async fn get_loaded(&self, name: &str) -> Option<Arc<LoadedModel>> {
        self.loaded.read().await.get(name).cloned()
    }
}

fn persist_artifacts(dest: &Path, model: &LanguageModel, tokenizer: &TokenizerArtifact) -> Result<()> {
    std::fs::create_dir_all(dest)?;

    copy_into(&model.config_file, dest)?;

    match model.format {
        WeightFormat::SafeTensors => {
            for file in &model.weight_files {
                copy_into(file, dest)?;
            }
        }
        WeightFormat::PyTorch => {
            for file in &model.weight_files {
                convert_to_safetensors(file, &dest.join("model.safetensors"))?;
            }
        }
    }

    tokenizer
        .tokenizer
        .save(dest.join("tokenizer.json"), false)
        .map_err(|e| Error::RegistryError(format!("Failed to save tokenizer: {}", e)))?;

    for file in &tokenizer.extra_files {
        copy_into(file, dest)?;
    }

    Ok(())
}

fn copy_into(src: &Path, dest_dir: &Path) -> Result<()> {
    let file_name = src
        .file_name()
        .ok_or_else(|| Error::RegistryError(format!("Invalid artifact path: {:?}", src)))?;
    let target = dest_dir.join(file_name);
    // hub cache entries are symlinks into the blob store
    std::fs::copy(src, target)?;
    Ok(())
}

fn convert_to_safetensors(pytorch_file: &Path, safetensors_file: &Path) -> Result<()> {
    tracing::info!("Converting {:?} to model.safetensors...", pytorch_file);

    let tensors_vec = pickle::read_all(pytorch_file)
        .map_err(|e| Error::ModelLoadFailed(format!("Failed to read PyTorch file: {}", e)))?;

    tracing::info!("Loading {} tensors from PyTorch model", tensors_vec.len());

    let tensors: HashMap<_, _> = tensors_vec.into_iter().collect();

    candle_core::safetensors::save(&tensors, safetensors_file)
        .map_err(|e| Error::ModelLoadFailed(format!("Failed to save SafeTensors: {}", e)))?;

    tracing::info!("Converted to SafeTensors format");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::hub::ModelSummary;
    use std::str::FromStr;
    use tempfile::TempDir;
    use tokenizers::Tokenizer;

    const TOKENIZER_JSON: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": { "[UNK]": 0, "hello": 1, "world": 2 },
            "unk_token": "[UNK]"
        }
    }"#;

    fn fake_artifacts(cache: &Path) -> Result<(LanguageModel, TokenizerArtifact)> {
        let config_file = cache.join("config.json");
        std::fs::write(&config_file, r#"{"model_type": "bert", "hidden_size": 4}"#)?;
        let weights = cache.join("model.safetensors");
        std::fs::write(&weights, b"not really safetensors")?;
        let aux = cache.join("tokenizer_config.json");
        std::fs::write(&aux, "{}")?;

        let model = LanguageModel {
            repo_id: "acme/tiny-bert".to_string(),
            summary: ModelSummary {
                model_type: Some("bert".to_string()),
                hidden_size: Some(4),
                vocab_size: None,
            },
            config_file,
            weight_files: vec![weights],
            format: WeightFormat::SafeTensors,
            tensor_count: 0,
        };
        let tokenizer = Tokenizer::from_str(TOKENIZER_JSON)
            .map_err(|e| Error::TokenizerLoadFailed(e.to_string()))?;

        Ok((model, TokenizerArtifact::new(tokenizer, vec![aux])))
    }

    #[tokio::test]
    async fn test_add_new_model_persists_and_registers() -> Result<()> {
        let tmp = TempDir::new()?;
        let cache = tmp.path().join("cache");
        std::fs::create_dir_all(&cache)?;
        let config = Config::with_data_dir(tmp.path().join("data"))?;
        let dest = config.storage_dir.join("acme/tiny-bert");

        let service = LanguageModelService::open(config.clone())?;
        let (model, tokenizer) = fake_artifacts(&cache)?;
        service
            .add_new_model("acme/tiny-bert", &dest, model, tokenizer)
            .await?;

        for file in ["config.json", "model.safetensors", "tokenizer.json", "tokenizer_config.json"] {
            assert!(dest.join(file).is_file(), "missing {}", file);
        }

        let info = service.get_model("acme/tiny-bert").await?;
        assert_eq!(info.model_path, dest);
        assert_eq!(info.model_type.as_deref(), Some("bert"));
        assert_eq!(info.vocab_size, Some(3));

        let loaded = service.get_loaded("acme/tiny-bert").await.expect("model kept in memory");
        assert_eq!(loaded.tokenizer.vocab_size, 3);

        // registry survives a restart
        let reopened = LanguageModelService::open(config)?;
        assert_eq!(reopened.list_models().await.len(), 1);
        assert!(reopened.get_loaded("acme/tiny-bert").await.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_missing_artifact_leaves_registry_untouched() -> Result<()> {
        let tmp = TempDir::new()?;
        let cache = tmp.path().join("cache");
        std::fs::create_dir_all(&cache)?;
        let config = Config::with_data_dir(tmp.path().join("data"))?;

        let service = LanguageModelService::open(config)?;
        let (mut model, tokenizer) = fake_artifacts(&cache)?;
        model.weight_files = vec![cache.join("gone.safetensors")];

        let result = service
            .add_new_model("acme/tiny-bert", &tmp.path().join("out"), model, tokenizer)
            .await;

        assert!(matches!(result, Err(Error::IoError(_))));
        assert!(service.list_models().await.is_empty());
        assert!(matches!(
            service.get_model("acme/tiny-bert").await,
            Err(Error::ModelNotFound(_))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_pytorch_weights_are_converted() -> Result<()> {
        let tmp = TempDir::new()?;
        let cache = tmp.path().join("cache");
        std::fs::create_dir_all(&cache)?;
        let config = Config::with_data_dir(tmp.path().join("data"))?;
        let dest = config.storage_dir.join("acme/tiny-bert");

        let service = LanguageModelService::open(config)?;
        let (mut model, tokenizer) = fake_artifacts(&cache)?;
        model.weight_files = vec![Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("testdata")
            .join("tiny_pytorch_model.bin")];
        model.format = WeightFormat::PyTorch;

        service
            .add_new_model("acme/tiny-bert", &dest, model, tokenizer)
            .await?;

        assert!(!dest.join("tiny_pytorch_model.bin").exists());
        let tensors = candle_core::safetensors::load(dest.join("model.safetensors"), &candle_core::Device::Cpu)
            .map_err(|e| Error::ModelLoadFailed(e.to_string()))?;
        let weight = &tensors["embeddings.weight"];
        assert_eq!(weight.dims(), &[2, 3]);
        assert_eq!(
            weight.flatten_all().and_then(|t| t.to_vec1::<f32>()).ok(),
            Some(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0])
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_failed_registry_save_rolls_back() -> Result<()> {
        let tmp = TempDir::new()?;
        let cache = tmp.path().join("cache");
        std::fs::create_dir_all(&cache)?;
        let config = Config::with_data_dir(tmp.path().join("data"))?;
        let first = config.storage_dir.join("first");

        let service = LanguageModelService::open(config.clone())?;
        let (model, tokenizer) = fake_artifacts(&cache)?;
        service
            .add_new_model("acme/tiny-bert", &first, model, tokenizer)
            .await?;

        // a directory in place of models.toml makes every save fail
        std::fs::remove_file(&config.registry_path)?;
        std::fs::create_dir(&config.registry_path)?;

        let (model, tokenizer) = fake_artifacts(&cache)?;
        let result = service
            .add_new_model("acme/other", &config.storage_dir.join("other"), model, tokenizer)
            .await;
        assert!(matches!(result, Err(Error::IoError(_))));
        assert!(matches!(
            service.get_model("acme/other").await,
            Err(Error::ModelNotFound(_))
        ));
        assert!(service.get_loaded("acme/other").await.is_none());

        let (model, tokenizer) = fake_artifacts(&cache)?;
        let result = service
            .add_new_model("acme/tiny-bert", &config.storage_dir.join("second"), model, tokenizer)
            .await;
        assert!(result.is_err());
        assert_eq!(service.get_model("acme/tiny-bert").await?.model_path, first);
        assert_eq!(service.list_models().await.len(), 1);

        Ok(())
    }
}
