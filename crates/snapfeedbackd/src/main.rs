//! snapfeedbackd - HTTP front end for SnapFeedback
//!
//! Usage:
//!   snapfeedbackd --port 8000
//!   snapfeedbackd --host 127.0.0.1 --json --verbose

mod api;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use snapfeedback_core::metrics::METRICS;
use snapfeedback_core::{FeedbackService, FsAssetStore, OpenAiVisionClient, Settings};
use snapfeedback_state::SurrealStore;
use tracing::Level;

#[derive(Parser)]
#[command(name = "snapfeedbackd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Rubric feedback for playground and toy photos", long_about = None)]
struct Cli {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8000)]
    port: u16,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; real deployments set the environment directly.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    snapfeedback_core::init_tracing(cli.json, level);

    let settings = Settings::from_env().context("Failed to load configuration")?;

    let store = Arc::new(
        SurrealStore::from_env()
            .await
            .context("Failed to connect to SnapFeedback database")?,
    );
    let assets = Arc::new(
        FsAssetStore::new(&settings.upload_dir)
            .with_context(|| format!("Failed to open upload dir {}", settings.upload_dir.display()))?,
    );
    let client = Arc::new(
        OpenAiVisionClient::new(settings.openai.clone()).context("Failed to build vision client")?,
    );
    tracing::info!(model = client.model(), "vision client ready");

    let service = Arc::new(FeedbackService::new(
        settings.service_config(),
        client,
        store.clone(),
        store,
        assets,
    ));

    let app = api::router(
        api::AppState { service },
        &settings.upload_dir,
        &settings.frontend_origin,
    )?;

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .context("parse bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(%addr, "snapfeedbackd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve HTTP")?;

    METRICS.flush();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown requested");
}
