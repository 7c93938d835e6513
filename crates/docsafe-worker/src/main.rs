use anyhow::Context;
use docsafe_core::Config;
use docsafe_infra::{init_telemetry, shutdown_telemetry, TelemetryOptions};
use docsafe_storage::{create_backend, DocumentStorage};
use docsafe_worker::factory::{create_directory, create_publisher, create_queue, create_scanner};
use docsafe_worker::{BroadcastPublisher, ScanMetrics, ScanWorker};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;
    config.validate()?;

    init_telemetry(&TelemetryOptions::from_env(
        "docsafe-worker",
        env!("CARGO_PKG_VERSION"),
        &config.environment,
    ))
    .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let backend = create_backend(&config)
        .await
        .context("Failed to create storage backend")?;
    tracing::info!(backend = ?backend.backend_type(), "Storage backend ready");
    let storage = DocumentStorage::new(backend).with_default_presign_ttl(Duration::from_secs(
        config.storage.presign_default_ttl_secs,
    ));

    let queue = create_queue(&config)
        .await
        .context("Failed to create scan queue")?;
    let scanner = create_scanner(&config);

    let directory = create_directory(&config).context("Failed to create document directory")?;

    let broadcast = BroadcastPublisher::new(EVENT_CHANNEL_CAPACITY);
    let publisher =
        create_publisher(&config, broadcast).context("Failed to create event publisher")?;

    #[cfg(feature = "observability-opentelemetry")]
    let metrics = Arc::new(ScanMetrics::with_meter(opentelemetry::global::meter(
        "docsafe-worker",
    )));
    #[cfg(not(feature = "observability-opentelemetry"))]
    let metrics = Arc::new(ScanMetrics::new());

    let worker = ScanWorker::new(queue, storage, scanner, publisher, directory, metrics);

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    worker
        .run(
            Duration::from_millis(config.worker.poll_interval_ms),
            config.worker.batch_size,
            cancel,
        )
        .await;

    shutdown_telemetry().await;
    Ok(())
}

/// Cancel `token` on Ctrl+C or SIGTERM.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        _ = terminate => tracing::info!("Received terminate signal"),
    }

    tracing::info!("Shutting down scan worker...");
    token.cancel();
}
