use anyhow::Context;
use clap::Parser;
use dotenv::dotenv;
use rust_recipe_agent::api;
use rust_recipe_agent::config::AppConfig;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, default_value = "3000")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    run_api_server(args).await
}

async fn run_api_server(args: Args) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", args.host, args.port))?;

    let config = AppConfig::from_env();
    info!(
        vision_model = config.vision.primary_model().unwrap_or_default(),
        detector_endpoints = config.detector.models.len(),
        max_items = config.normalize.max_items,
        "configuration loaded"
    );

    let app = api::create_api(api::AppState::from_config(&config));

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    info!(%addr, "ready to accept connections");

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
