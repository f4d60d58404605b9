use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lmhub")]
#[command(version, about = "Download HuggingFace language models into a local registry", long_about = None)]
pub struct Cli {
	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Start the HTTP API server
	Serve {
		/// Port to listen on
		#[arg(long, env = "LMHUB_PORT", default_value = "8080")]
		port: u16,

		/// Host to bind to
		#[arg(long, env = "LMHUB_HOST", default_value = "0.0.0.0")]
		host: String,
	},

	/// Download a model and its tokenizer and register them
	Pull {
		/// HuggingFace model repository ID (e.g., "openai-community/gpt2")
		model: String,

		/// Where to store the model (defaults to <storage dir>/<model>)
		#[arg(long)]
		path: Option<PathBuf>,
	},

	/// List registered models
	List,
}
