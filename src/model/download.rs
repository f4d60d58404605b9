use crate::error::{Error, Result};
use crate::model::hub::HubClient;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Takes ownership of freshly loaded artifacts and tracks them under `name`.
#[async_trait]
pub trait ModelStore<M, T>: Send + Sync {
    async fn add_new_model(&self, name: &str, path: &Path, model: M, tokenizer: T) -> Result<()>;
}

/// Object-safe entry point used by the HTTP layer.
#[async_trait]
pub trait ModelDownload: Send + Sync {
    async fn download(&self, model_id: &str, path: Option<PathBuf>) -> Result<PathBuf>;
}

/// Model ids become path components under the storage directory.
pub fn validate_model_id(model_id: &str) -> Result<()> {
    if model_id.trim().is_empty() {
        return Err(Error::InvalidInput("hf_model_id cannot be empty".to_string()));
    }

    let escapes = Path::new(model_id)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        return Err(Error::InvalidInput(format!(
            "hf_model_id must be a relative repository id: {}",
            model_id
        )));
    }

    Ok(())
}

pub struct DownloadService<H, S> {
    base_path: PathBuf,
    hub: Arc<H>,
    store: Arc<S>,
}

impl<H, S> DownloadService<H, S>
where
    H: HubClient,
    S: ModelStore<H::Model, H::Tokenizer>,
{
    pub fn new(base_path: impl Into<PathBuf>, hub: Arc<H>, store: Arc<S>) -> Self {
        Self {
            base_path: base_path.into(),
            hub,
            store,
        }
    }

    pub fn storage_path(&self, model_id: &str, path: Option<PathBuf>) -> PathBuf {
        path.unwrap_or_else(|| self.base_path.join(model_id))
    }

    async fn load_model(&self, model_id: &str) -> Result<H::Model> {
        let hub = Arc::clone(&self.hub);
        let name = model_id.to_string();
        tokio::task::spawn_blocking(move || hub.load_model(&name))
            .await
            .map_err(|e| Error::ModelLoadFailed(format!("Model loader task failed: {}", e)))?
    }

    async fn load_tokenizer(&self, model_id: &str) -> Result<H::Tokenizer> {
        let hub = Arc::clone(&self.hub);
        let name = model_id.to_string();
        tokio::task::spawn_blocking(move || hub.load_tokenizer(&name))
            .await
            .map_err(|e| Error::TokenizerLoadFailed(format!("Tokenizer loader task failed: {}", e)))?
    }
}

#[async_trait]
impl<H, S> ModelDownload for DownloadService<H, S>
where
    H: HubClient,
    S: ModelStore<H::Model, H::Tokenizer> + 'static,
{
    async fn download(&self, model_id: &str, path: Option<PathBuf>) -> Result<PathBuf> {
        validate_model_id(model_id)?;
        tracing::info!("Downloading language model '{}'", model_id);

        let model = self.load_model(model_id).await?;
        let tokenizer = self.load_tokenizer(model_id).await?;

        let path = self.storage_path(model_id, path);
        self.store
            .add_new_model(model_id, &path, model, tokenizer)
            .await?;

        tracing::info!("Model '{}' registered at {:?}", model_id, path);
        Ok(path)
    }
}
