use crate::error::{Error, Result};
use crate::model::download::validate_model_id;
use crate::model::{ModelCatalog, ModelDownload, ModelInfo};
use axum::{
	extract::{Path as UrlPath, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
	Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
	downloads: Arc<dyn ModelDownload>,
	catalog: Arc<dyn ModelCatalog>,
}

impl AppState {
	pub fn new(downloads: Arc<dyn ModelDownload>, catalog: Arc<dyn ModelCatalog>) -> Self {
		Self { downloads, catalog }
	}
}

#[derive(Serialize)]
pub struct HealthResponse {
	pub status: String,
	pub models: usize,
}

#[derive(Deserialize)]
pub struct DownloadHfModelRequest {
	pub hf_model_id: String,
}

#[derive(Serialize)]
pub struct ModelDetails {
	#[serde(flatten)]
	pub info: ModelInfo,
	pub loaded: bool,
	pub tensor_count: Option<usize>,
	pub tokenizer_vocab_size: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadHfModelResponse {
	pub success: bool,
	pub message: String,
}

impl IntoResponse for Error {
	fn into_response(self) -> Response {
		let status = match self {
			Error::ModelNotFound(_) => StatusCode::NOT_FOUND,
			Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
			_ => StatusCode::INTERNAL_SERVER_ERROR,
		};

		if status.is_server_error() {
			tracing::error!("Request failed: {}", self);
		}

		let body = Json(serde_json::json!({
			"error": self.to_string(),
		}));

		(status, body).into_response()
	}
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
	Json(HealthResponse {
		status: "ok".to_string(),
		models: state.catalog.list_models().await.len(),
	})
}

async fn download_hf_lang_model_handler(
	State(state): State<AppState>,
	Json(payload): Json<DownloadHfModelRequest>,
) -> Result<Json<DownloadHfModelResponse>> {
	validate_model_id(&payload.hf_model_id)?;

	state
		.downloads
		.download(&payload.hf_model_id, None)
		.await?;

	Ok(Json(DownloadHfModelResponse {
		success: true,
		message: "Model downloaded successfully".to_string(),
	}))
}

async fn list_models_handler(State(state): State<AppState>) -> Json<Vec<ModelInfo>> {
	Json(state.catalog.list_models().await)
}

async fn get_model_handler(
	State(state): State<AppState>,
	UrlPath(name): UrlPath<String>,
) -> Result<Json<ModelDetails>> {
	let info = state.catalog.get_model(&name).await?;
	let loaded = state.catalog.get_loaded(&name).await;

	Ok(Json(ModelDetails {
		info,
		loaded: loaded.is_some(),
		tensor_count: loaded.as_ref().map(|l| l.model.tensor_count),
		tokenizer_vocab_size: loaded.as_ref().map(|l| l.tokenizer.vocab_size),
	}))
}

pub fn create_router(state: AppState) -> Router {
	Router::new()
		.route("/api/health", get(health_handler))
		.route("/api/models", get(list_models_handler))
		.route("/api/models/{*name}", get(get_model_handler))
		.route("/download/hf_lang_model/", post(download_hf_lang_model_handler))
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive())
		.with_state(state)
}

pub async fn serve(host: &str, port: u16, state: AppState) -> Result<()> {
	let app = create_router(state);
	let addr = format!("{}:{}", host, port);

	tracing::info!("Starting server on {}", addr);

	let listener = tokio::net::TcpListener::bind(&addr)
		.await
		.map_err(|e| Error::ConfigError(format!("Failed to bind to {}: {}", addr, e)))?;

	axum::serve(listener, app)
		.await
		.map_err(|e| Error::ConfigError(format!("Server error: {}", e)))?;

	Ok(())
}
