mod api;

use std::sync::Arc;

use anyhow::{Context, Result};
use api::{router, AppState};
use clap::Parser;
use fluxzip_core::{load_model, ClipPromptTokenizer, DeviceMap, ImageService, LoadOptions};
use hf_hub::api::tokio::ApiBuilder;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// Define command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "FLUX image bundle server")]
struct Args {
    /// Hugging Face access token used to download gated weights
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    hf_token: String,

    /// Use CPU instead of GPU
    #[arg(long)]
    cpu: bool,

    /// Accelerator ordinal to place the model on
    #[arg(long, default_value_t = 0)]
    device: usize,

    /// Model variant to use
    #[arg(long, default_value = "black-forest-labs/FLUX.1-schnell")]
    model: String,

    /// Repository holding the tokenizer used to truncate prompts
    #[arg(long, default_value = "openai/clip-vit-base-patch32")]
    tokenizer: String,

    /// Width of generated images
    #[arg(long, default_value_t = 1024)]
    width: usize,

    /// Height of generated images
    #[arg(long, default_value_t = 1024)]
    height: usize,

    /// Host address to bind the server to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind the server to
    #[arg(long, default_value_t = 8000)]
    port: u16,
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let api = ApiBuilder::new()
        .with_token(Some(args.hf_token.clone()))
        .with_progress(false)
        .build()
        .context("failed to create hf hub API")?;

    let tokenizer = ClipPromptTokenizer::from_hub(&api, &args.tokenizer).await?;
    let options = LoadOptions {
        width: args.width,
        height: args.height,
    };
    let model = load_model(&args.model, api, DeviceMap::new(args.cpu, args.device), options)
        .await
        .with_context(|| format!("failed to load {}", args.model))?;

    let service = ImageService::new(model, Arc::new(tokenizer));
    let app = router(AppState(Arc::new(service)));

    let bind_address = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    tracing::info!(addr = %listener.local_addr()?, "Started server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_required() {
        if std::env::var_os("HF_TOKEN").is_some() {
            return;
        }
        let err = Args::try_parse_from(["fluxzip-server"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn defaults_match_the_public_endpoint() {
        let args = Args::try_parse_from(["fluxzip-server", "--hf-token", "hf_x"]).unwrap();
        assert_eq!(args.host, "0.0.0.0");
        assert_eq!(args.port, 8000);
        assert_eq!(args.model, "black-forest-labs/FLUX.1-schnell");
        assert_eq!((args.width, args.height), (1024, 1024));
        assert!(!args.cpu);
    }
}
