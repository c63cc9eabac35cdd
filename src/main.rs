use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use speech_emotion_lib::config::Config;
use speech_emotion_lib::inference::{sweep_stale_uploads, InferenceService};
use speech_emotion_lib::model::ModelArtifacts;
use speech_emotion_lib::server;

/// Speech emotion recognition service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (defaults to ~/.speech-emotion/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Classifier weights (.json or .onnx)
    #[arg(short, long, global = true)]
    model: Option<PathBuf>,

    /// Feature scaler (.json)
    #[arg(short, long, global = true)]
    scaler: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service (default)
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Classify a single audio file and print the verdict as JSON
    Predict {
        /// Audio file to classify
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load_or_default(),
    };
    if let Some(model) = args.model {
        config.model.classifier_path = Some(model);
    }
    if let Some(scaler) = args.scaler {
        config.model.scaler_path = Some(scaler);
    }
    let command = args.command.unwrap_or(Command::Serve { port: None });
    if let Command::Serve { port: Some(port) } = &command {
        config.server.port = *port;
    }

    let classifier_path = config.classifier_path()?;
    let scaler_path = config.scaler_path()?;
    info!("Classifier: {:?}", classifier_path);
    info!("Scaler: {:?}", scaler_path);

    let artifacts = ModelArtifacts::load(
        &classifier_path,
        &scaler_path,
        config.model.n_threads,
        config.features.feature_dim,
    )
    .context("Failed to load model artifacts")?;
    let service = InferenceService::new(&config, Arc::new(artifacts))
        .context("Failed to initialize inference service")?;

    match command {
        Command::Serve { .. } => {
            if let Err(e) = sweep_stale_uploads(&config.server.upload_dir) {
                warn!(
                    "Failed to sweep upload directory {:?}: {}",
                    config.server.upload_dir, e
                );
            }
            server::serve(&config.server, Arc::new(service)).await
        }
        Command::Predict { file } => {
            let verdict = tokio::task::spawn_blocking(move || service.infer_path(&file))
                .await
                .context("Prediction task failed")?
                .context("Prediction failed")?;
            println!("{}", serde_json::to_string_pretty(&verdict)?);
            Ok(())
        }
    }
}
