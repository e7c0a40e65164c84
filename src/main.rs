use std::sync::Arc;

use dual_store::metrics;
use dual_store::select_dual_writer;
use dual_store::DualStoreConfig;
use dual_store::Error;
use dual_store::MemoryStorage;
use dual_store::Result;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    init_observability();

    let settings = DualStoreConfig::new()?.validate()?;

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());

    let metrics_server = if settings.monitoring.prometheus_enabled {
        Some(tokio::spawn(metrics::start_server(
            settings.monitoring.prometheus_addr(),
            graceful_rx.clone(),
        )))
    } else {
        None
    };

    let legacy = Arc::new(MemoryStorage::new(settings.watch.clone()));
    let unified = Arc::new(MemoryStorage::new(settings.watch.clone()));
    let writer = select_dual_writer(settings.dual_writer.mode, legacy, unified.clone());
    info!(mode = %writer.mode(), "dual store ready. Waiting for CTRL+C signal...");

    if let Err(e) = graceful_shutdown(graceful_tx).await {
        error!("Failed to shutdown: {:?}", e);
    }

    unified.shutdown().await;
    if let Some(handle) = metrics_server {
        if let Err(e) = handle.await {
            error!("metrics server stopped abnormally: {:?}", e);
        }
    }

    info!("Exiting program.");
    Ok(())
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt()).map_err(|e| Error::Fatal(format!("SIGINT handler: {}", e)))?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(|e| Error::Fatal(format!("SIGTERM handler: {}", e)))?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        Error::Fatal(format!("Failed to send shutdown signal: {}", e))
    })?;

    info!("Shutdown completed");
    Ok(())
}

fn init_observability() {
    let base_subscriber = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();
}
