use anyhow::Result;
use likeness_core::comparator::{OnnxComparator, RemoteComparator};
use likeness_core::{ComparatorHandle, DirectoryPhotoStore, StagingArea, Verifier};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod http;

use config::{ComparatorKind, Config};
use engine::EngineHandle;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    config.validate()?;

    tracing::info!(
        photos_dir = %config.photos_dir.display(),
        photos_dir_exists = config.photos_dir.is_dir(),
        temp_dir = %config.temp_dir.display(),
        comparator = ?config.comparator,
        "likenessd starting"
    );

    let staging = StagingArea::new(&config.temp_dir);
    staging.ensure()?;

    // Model loading and the remote health probe both block.
    let comparator = tokio::task::spawn_blocking({
        let config = config.clone();
        move || probe_comparator(&config)
    })
    .await?;

    let verifier = Verifier::new(
        comparator,
        Arc::new(DirectoryPhotoStore::new(&config.photos_dir)),
        staging,
    )
    .with_sample_limit(config.sample_limit);
    let engine = EngineHandle::new(Arc::new(verifier), config.verify_timeout());

    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "likenessd ready");

    axum::serve(listener, http::router(engine, config.max_body_bytes))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("likenessd shut down");
    Ok(())
}

/// Decide comparator availability once. Failure leaves the daemon up in
/// degraded mode.
fn probe_comparator(config: &Config) -> ComparatorHandle {
    match (config.comparator, config.remote_url.as_deref()) {
        (ComparatorKind::Onnx, _) => {
            tracing::info!(model_dir = %config.model_dir.display(), "loading ONNX models");
            ComparatorHandle::probe(|| OnnxComparator::load(&config.model_dir, config.metric))
        }
        (ComparatorKind::Remote, Some(url)) => {
            tracing::info!(url, "connecting to remote face service");
            ComparatorHandle::probe(|| {
                RemoteComparator::connect(url, config.metric, config.verify_timeout())
            })
        }
        (ComparatorKind::Remote, None) => ComparatorHandle::unavailable("no remote URL configured"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
