use std::sync::Arc;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::Parser;
use lookalike_core::{
    app_config, embedding::onnx::OnnxBackbone, init_ort, Embedder, IndexState, VisualSearch,
};
use lookalike_server::{router, state::AppState};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lookalike-server")]
#[command(version)]
#[command(about = "serves visual similarity search over the catalog", long_about = None)]
struct Args {
    /// Configuration file layered over the defaults and the user configuration
    #[arg(short, long)]
    config: Option<Utf8PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("lookalike_server=info,lookalike_core=info,tower_http=info")))
        .init();

    let args = Args::parse();
    let config = app_config::load_config(args.config.as_deref())?;
    info!(catalog_dir = %config.catalog_dir, artifact = %config.artifact_path, "Initializing lookalike server");

    init_ort(config.onnx_lib_dir.as_deref())?;
    let embedder = Arc::new(Embedder::new(OnnxBackbone::from_config(&config)?));

    let index = IndexState::load(&config.artifact_path);
    match &index {
        IndexState::Ready(index) => info!(entries = index.len(), "Catalog index ready"),
        IndexState::Unavailable { reason } => warn!(%reason, "Starting without a catalog index, uploads will be refused"),
    }

    let search = VisualSearch::new(embedder, index, config.top_k);
    let app = router(AppState::new(search, config.catalog_dir.clone()), config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Could not bind to {}", config.bind_address))?;
    info!("Listening on {}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl+C, running until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
