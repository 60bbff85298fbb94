use anyhow::{Context, Result};
use faceid_core::{OnnxEmbedder, Registry};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod engine;
mod service;
mod uploads;

#[cfg(test)]
mod testing;

use config::Config;
use service::FaceService;
use uploads::UploadDir;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    tracing::info!(?config, "faceidd starting");

    // Models, registry and upload dir are loaded up front (fail-fast).
    let embedder = OnnxEmbedder::load(
        &config.detector_model_path(),
        &config.recognizer_model_path(),
    )
    .context("loading face models")?;
    let engine = engine::spawn_engine(embedder, config.engine_queue, config.embed_timeout)?;

    let registry = Arc::new(
        Registry::open(&config.data_dir)
            .with_context(|| format!("opening registry in {}", config.data_dir.display()))?,
    );
    let uploads = Arc::new(
        UploadDir::create(&config.upload_dir)
            .with_context(|| format!("creating {}", config.upload_dir.display()))?,
    );
    tracing::info!(path = %uploads.root().display(), "upload directory ready");

    let service = FaceService::new(engine, registry, uploads, config.match_threshold);
    let app = api::router(service, config.max_upload_bytes);

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("invalid FACEID_LISTEN_ADDR {:?}", config.listen_addr))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "faceidd ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("faceidd shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
}
