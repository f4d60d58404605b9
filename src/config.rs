use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
	pub data_dir: PathBuf,
	/// Base storage path; models land in `<storage_dir>/<model_id>` unless a path is given.
	pub storage_dir: PathBuf,
	pub registry_path: PathBuf,
	pub hub: HubConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubConfig {
	pub token: Option<String>,
	pub revision: Option<String>,
	pub cache_dir: Option<PathBuf>,
}

impl Config {
	pub fn new() -> crate::error::Result<Self> {
		let project_dirs = ProjectDirs::from("", "", "lmhub")
			.ok_or_else(|| crate::error::Error::ConfigError("Could not determine config directory".to_string()))?;

		Self::with_data_dir(project_dirs.data_dir())
	}

	pub fn with_data_dir(data_dir: impl AsRef<Path>) -> crate::error::Result<Self> {
		let data_dir = data_dir.as_ref().to_path_buf();
		let storage_dir = data_dir.join("models");
		let registry_path = data_dir.join("models.toml");

		std::fs::create_dir_all(&data_dir)?;
		std::fs::create_dir_all(&storage_dir)?;

		Ok(Self {
			data_dir,
			storage_dir,
			registry_path,
			hub: HubConfig::default(),
		})
	}

	pub fn from_env() -> crate::error::Result<Self> {
		let mut config = match std::env::var("LMHUB_DATA_DIR") {
			Ok(data_dir) => Self::with_data_dir(data_dir)?,
			Err(_) => Self::new()?,
		};

		if let Ok(storage_dir) = std::env::var("LMHUB_STORAGE_DIR") {
			config.storage_dir = PathBuf::from(storage_dir);
			std::fs::create_dir_all(&config.storage_dir)?;
		}

		config.hub = HubConfig {
			token: non_empty_var("HF_TOKEN"),
			revision: non_empty_var("LMHUB_REVISION"),
			cache_dir: non_empty_var("LMHUB_HUB_CACHE").map(PathBuf::from),
		};

		Ok(config)
	}
}

fn non_empty_var(key: &str) -> Option<String> {
	std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
