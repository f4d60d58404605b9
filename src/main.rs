mod cli;
mod config;
mod error;
mod model;
mod server;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
use config::Config;
use model::{DownloadService, HfHubClient, LanguageModelService, ModelCatalog, ModelDownload};
use std::sync::Arc;

type Downloads = DownloadService<HfHubClient, LanguageModelService>;

fn build_services(config: &Config) -> anyhow::Result<(Arc<Downloads>, Arc<LanguageModelService>)> {
    let hub = HfHubClient::new(&config.hub).context("Failed to initialize HuggingFace client")?;
    let models = Arc::new(
        LanguageModelService::open(config.clone()).context("Failed to open model registry")?,
    );
    let downloads = Arc::new(DownloadService::new(
        config.storage_dir.clone(),
        Arc::new(hub),
        Arc::clone(&models),
    ));
    Ok((downloads, models))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Serve { port, host } => {
            let (downloads, models) = build_services(&config)?;
            let state = server::AppState::new(downloads, models);

            println!("🚀 lmhub server starting...");
            println!("   Data: {:?}", config.data_dir);
            println!("   Storage: {:?}", config.storage_dir);
            println!("   Listening on: http://{}:{}", host, port);
            println!("   Health: http://{}:{}/api/health", host, port);
            println!("   Download: POST http://{}:{}/download/hf_lang_model/", host, port);

            server::serve(&host, port, state).await?;
        }

        Commands::Pull { model, path } => {
            let (downloads, _) = build_services(&config)?;
            let stored_at = downloads.download(&model, path).await?;

            println!("✓ Successfully downloaded model: {}", model);
            println!("  Path: {:?}", stored_at);
        }

        Commands::List => {
            let models = LanguageModelService::open(config)?.list_models().await;

            if models.is_empty() {
                println!("No models registered.");
                println!("Use 'lmhub pull <model-id>' to download a model.");
            } else {
                println!("Registered models:\n");
                for model in models {
                    println!("  {}", model.name);
                    println!("    Repository: {}", model.hf_repo_id);
                    println!("    Path: {:?}", model.model_path);
                    println!("    Downloaded: {}", model.downloaded_at);
                    if let Some(model_type) = &model.model_type {
                        println!("    Type: {}", model_type);
                    }
                    if let Some(dim) = model.hidden_size {
                        println!("    Hidden size: {}", dim);
                    }
                    println!();
                }
            }
        }
    }

    Ok(())
}
