use anyhow::Result;
use clap::Parser;
use image_compressor::app::App;
use image_compressor::models::Config;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "image-compressor")]
#[command(about = "Consume image jobs from RabbitMQ and recompress them as JPEG")]
struct CliArgs {
    /// Load environment variables from this file instead of ./.env
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,

    /// Override WORKER_POOL_SIZE.
    #[arg(long, value_name = "N", value_parser = parse_workers)]
    workers: Option<usize>,
}

fn parse_workers(input: &str) -> std::result::Result<usize, String> {
    match input.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(format!(
            "Invalid worker count '{}'. Expected a positive integer",
            input
        )),
    }
}

fn load_env_file(path: &Path) -> image_compressor::Result<()> {
    dotenvy::from_path(path)?;
    Ok(())
}

fn log_filter() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    std::env::var("LOG_LEVEL")
        .ok()
        .filter(|level| !level.trim().is_empty())
        .and_then(|level| EnvFilter::try_new(format!("image_compressor={}", level.trim())).ok())
        .unwrap_or_else(|| "image_compressor=info".into())
}

async fn start(args: CliArgs) -> image_compressor::Result<()> {
    let mut config = Config::from_env()?;
    if let Some(workers) = args.workers {
        config = config.with_pool_size(workers)?;
    }

    let app = App::new(&config).await?;
    app.run().await
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Loaded before the subscriber so LOG_LEVEL from the file applies.
    if let Some(path) = &args.env_file {
        load_env_file(path)?;
    }

    tracing_subscriber::registry()
        .with(log_filter())
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting image-compressor");

    match start(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("image-compressor failed: {}", e);
            std::process::exit(1);
        }
    }
}
