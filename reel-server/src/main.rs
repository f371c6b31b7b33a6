use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use reel_core::{
    DeviceMap, FfmpegEncoder, ModelConfig, ModelContext, Precision, RequestOrchestrator,
    SamplerLoader,
};
use reel_server::AppState;
use tokio::{self, net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Define command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Reel video generation server")]
struct Args {
    /// Root directory of the model weights
    #[arg(long, env = "REEL_MODEL_BASE", default_value = "ckpts")]
    model_base: PathBuf,

    /// Transformer weights, if not under the model root
    #[arg(long, env = "REEL_DIT_WEIGHT")]
    dit_weight: Option<PathBuf>,

    /// Negative prompt applied to every request
    #[arg(long, env = "REEL_NEG_PROMPT")]
    neg_prompt: Option<String>,

    /// Guidance scale applied to every request
    #[arg(long, env = "REEL_CFG_SCALE", default_value_t = 1.0)]
    cfg_scale: f64,

    #[arg(long, env = "REEL_BATCH_SIZE", default_value_t = 1)]
    batch_size: usize,

    /// Directory generated videos are written to
    #[arg(long, env = "REEL_SAVE_PATH", default_value = "./results")]
    save_path: PathBuf,

    /// Appended to the save path as `<save_path>_<suffix>`
    #[arg(long, env = "REEL_SAVE_PATH_SUFFIX", default_value = "")]
    save_path_suffix: String,

    #[arg(long, env = "REEL_PRECISION", default_value = "bf16")]
    precision: Precision,

    /// Run the sampler on CPU
    #[arg(long, env = "REEL_CPU")]
    cpu: bool,

    /// Write artifacts from this process. Disable on replicas.
    #[arg(long, env = "REEL_PRIMARY_WRITER", action = ArgAction::Set, default_value_t = true)]
    primary_writer: bool,

    #[arg(long, env = "REEL_SAMPLER_PROGRAM", default_value = "python3")]
    sampler_program: String,

    #[arg(long, env = "REEL_SAMPLER_SCRIPT", default_value = "scripts/sample_video.py")]
    sampler_script: PathBuf,

    #[arg(long, env = "REEL_FFMPEG", default_value = "ffmpeg")]
    ffmpeg: String,

    /// Host address to bind the server to
    #[arg(long, env = "REEL_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to bind the server to
    #[arg(long, env = "REEL_PORT", default_value_t = 5000)]
    port: u16,
}

impl Args {
    fn model_config(&self) -> ModelConfig {
        ModelConfig {
            model_base: self.model_base.clone(),
            dit_weight: self.dit_weight.clone(),
            neg_prompt: self.neg_prompt.clone(),
            cfg_scale: self.cfg_scale,
            batch_size: self.batch_size,
            save_path: self.save_path.clone(),
            save_path_suffix: self.save_path_suffix.clone(),
            precision: self.precision,
            primary_writer: self.primary_writer,
            sampler_program: self.sampler_program.clone(),
            sampler_script: self.sampler_script.clone(),
            ffmpeg: self.ffmpeg.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reel_server=debug,reel_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = args.model_config();
    let encoder = Arc::new(FfmpegEncoder::new(config.ffmpeg.clone()));

    // Nothing is served until the model is loaded.
    let context = ModelContext::load::<SamplerLoader>(config, DeviceMap::from_cpu_flag(args.cpu))
        .await
        .context("failed to initialize model context")?;
    let orchestrator = RequestOrchestrator::new(Arc::new(context), encoder);

    let app = reel_server::router(AppState::new(orchestrator));

    let bind_address = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    info!("Started server on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
