pub mod download;
pub mod hub;
pub mod registry;
pub mod service;

pub use download::{DownloadService, ModelDownload};
pub use hub::HfHubClient;
pub use registry::ModelInfo;
pub use service::{LanguageModelService, ModelCatalog};
