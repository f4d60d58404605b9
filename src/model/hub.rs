use crate::config::HubConfig;
use crate::error::{Error, Result};
use candle_core::safetensors::MmapedSafetensors;
use hf_hub::api::sync::{Api, ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;

const SAFETENSORS_FILE: &str = "model.safetensors";
const SAFETENSORS_INDEX_FILE: &str = "model.safetensors.index.json";
const PYTORCH_FILE: &str = "pytorch_model.bin";
const TOKENIZER_AUX_FILES: [&str; 2] = ["tokenizer_config.json", "special_tokens_map.json"];

/// Loads model and tokenizer artifacts from a model hub by repository id.
///
/// Both calls block on network and disk IO.
pub trait HubClient: Send + Sync + 'static {
    type Model: Send + 'static;
    type Tokenizer: Send + 'static;

    fn load_model(&self, name: &str) -> Result<Self::Model>;

    fn load_tokenizer(&self, name: &str) -> Result<Self::Tokenizer>;
}

/// The fields of `config.json` the registry records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelSummary {
    pub model_type: Option<String>,
    pub hidden_size: Option<usize>,
    pub vocab_size: Option<usize>,
}

impl ModelSummary {
    pub fn from_config(config: &Value) -> Self {
        let model_type = config
            .get("model_type")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let hidden_size = config
            .get("hidden_size")
            .or_else(|| config.get("n_embd"))
            .or_else(|| config.get("d_model"))
            .or_else(|| config.get("dim"))
            .and_then(|v| v.as_u64())
            .map(|v| v as usize);

        let vocab_size = config
            .get("vocab_size")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize);

        Self {
            model_type,
            hidden_size,
            vocab_size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightFormat {
    SafeTensors,
    PyTorch,
}

/// A model fetched into the local hub cache.
#[derive(Debug)]
pub struct LanguageModel {
    pub repo_id: String,
    pub summary: ModelSummary,
    pub config_file: PathBuf,
    pub weight_files: Vec<PathBuf>,
    pub format: WeightFormat,
    pub tensor_count: usize,
}

pub struct TokenizerArtifact {
    pub tokenizer: Tokenizer,
    pub vocab_size: usize,
    pub extra_files: Vec<PathBuf>,
}

impl TokenizerArtifact {
    pub fn new(tokenizer: Tokenizer, extra_files: Vec<PathBuf>) -> Self {
        let vocab_size = tokenizer.get_vocab_size(true);
        Self {
            tokenizer,
            vocab_size,
            extra_files,
        }
    }
}

pub struct HfHubClient {
    api: Api,
    revision: Option<String>,
}

impl HfHubClient {
    pub fn new(config: &HubConfig) -> Result<Self> {
        let mut builder = ApiBuilder::new()
            .with_progress(false)
            .with_token(config.token.clone());

        if let Some(cache_dir) = &config.cache_dir {
            builder = builder.with_cache_dir(cache_dir.clone());
        }

        let api = builder
            .build()
            .map_err(|e| Error::DownloadFailed(e.to_string()))?;

        Ok(Self {
            api,
            revision: config.revision.clone(),
        })
    }

    fn repo(&self, name: &str) -> ApiRepo {
        match &self.revision {
            Some(revision) => self.api.repo(Repo::with_revision(
                name.to_string(),
                RepoType::Model,
                revision.clone(),
            )),
            None => self.api.model(name.to_string()),
        }
    }
}

impl HubClient for HfHubClient {
    type Model = LanguageModel;
    type Tokenizer = TokenizerArtifact;

    fn load_model(&self, name: &str) -> Result<LanguageModel> {
        tracing::info!("Loading model from HuggingFace: {}", name);
        let repo = self.repo(name);

        let config_file = repo
            .get("config.json")
            .map_err(|e| Error::DownloadFailed(format!("Could not find config: {}", e)))?;
        let config: Value = serde_json::from_str(&std::fs::read_to_string(&config_file)?)
            .map_err(|e| Error::ModelLoadFailed(format!("Failed to parse config: {}", e)))?;
        let summary = ModelSummary::from_config(&config);

        let (weight_files, format) = fetch_weights(|file| repo.get(file))?;

        let tensor_count = match format {
            WeightFormat::SafeTensors => count_tensors(&weight_files)?,
            WeightFormat::PyTorch => 0,
        };

        tracing::info!(
            "Model '{}' loaded ({:?}, {} weight files, {} tensors)",
            name,
            format,
            weight_files.len(),
            tensor_count
        );

        Ok(LanguageModel {
            repo_id: name.to_string(),
            summary,
            config_file,
            weight_files,
            format,
            tensor_count,
        })
    }

    fn load_tokenizer(&self, name: &str) -> Result<TokenizerArtifact> {
        tracing::info!("Loading tokenizer from HuggingFace: {}", name);
        let repo = self.repo(name);

        let tokenizer_file = repo
            .get("tokenizer.json")
            .map_err(|e| Error::DownloadFailed(format!("Could not find tokenizer: {}", e)))?;
        let tokenizer = Tokenizer::from_file(&tokenizer_file)
            .map_err(|e| Error::TokenizerLoadFailed(e.to_string()))?;

        let mut extra_files = Vec::new();
        for file in TOKENIZER_AUX_FILES {
            match repo.get(file) {
                Ok(path) => extra_files.push(path),
                Err(e) => tracing::debug!("Skipping {} for {}: {}", file, name, e),
            }
        }

        Ok(TokenizerArtifact::new(tokenizer, extra_files))
    }
}

/// Weight files in preference order: single safetensors, sharded safetensors, pytorch pickle.
fn fetch_weights<F, E>(get: F) -> Result<(Vec<PathBuf>, WeightFormat)>
where
    F: Fn(&str) -> std::result::Result<PathBuf, E>,
    E: Display,
{
    let safetensors_err = match get(SAFETENSORS_FILE) {
        Ok(path) => return Ok((vec![path], WeightFormat::SafeTensors)),
        Err(e) => e,
    };
    tracing::debug!("No {}: {}", SAFETENSORS_FILE, safetensors_err);

    match get(SAFETENSORS_INDEX_FILE) {
        Ok(index_path) => {
            let index: Value = serde_json::from_str(&std::fs::read_to_string(&index_path)?)?;
            let shards = shard_files(&index)?;
            tracing::info!("Downloading {} weight shards...", shards.len());

            let mut paths = Vec::with_capacity(shards.len() + 1);
            paths.push(index_path);
            for shard in shards {
                let path = get(&shard)
                    .map_err(|e| Error::DownloadFailed(format!("Could not fetch {}: {}", shard, e)))?;
                paths.push(path);
            }
            return Ok((paths, WeightFormat::SafeTensors));
        }
        Err(e) => tracing::debug!("No {}: {}", SAFETENSORS_INDEX_FILE, e),
    }

    let path = get(PYTORCH_FILE).map_err(|e| {
        Error::DownloadFailed(format!(
            "Could not find model file: {} ({}: {})",
            e, SAFETENSORS_FILE, safetensors_err
        ))
    })?;
    Ok((vec![path], WeightFormat::PyTorch))
}

/// Unique shard file names from a `model.safetensors.index.json` document.
pub fn shard_files(index: &Value) -> Result<Vec<String>> {
    let weight_map = index
        .get("weight_map")
        .and_then(|v| v.as_object())
        .ok_or_else(|| Error::ModelLoadFailed("Index has no weight_map".to_string()))?;

    let shards: BTreeSet<String> = weight_map
        .values()
        .filter_map(|v| v.as_str())
        .map(str::to_string)
        .collect();

    if shards.is_empty() {
        return Err(Error::ModelLoadFailed("Index lists no shards".to_string()));
    }

    Ok(shards.into_iter().collect())
}

fn count_tensors(files: &[PathBuf]) -> Result<usize> {
    let shards: Vec<&Path> = files
        .iter()
        .filter(|p| p.extension().is_some_and(|ext| ext == "safetensors"))
        .map(PathBuf::as_path)
        .collect();

    let safetensors = unsafe {
        MmapedSafetensors::multi(&shards)
            .map_err(|e| Error::ModelLoadFailed(format!("Failed to load safetensors: {}", e)))?
    };

    Ok(safetensors.tensors().len())
}
