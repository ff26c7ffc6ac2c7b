use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ca_bundle_injector::config::ControllerConfig;
use ca_bundle_injector::constants::{
    TRUSTED_CA_BUNDLE_CONFIGMAP, TRUSTED_CA_BUNDLE_CONFIGMAP_KEY, TRUSTED_CA_BUNDLE_CONFIGMAP_LABEL,
    TRUSTED_CA_BUNDLE_CONFIGMAP_NS, INJECT_LABEL_VALUE,
};
use ca_bundle_injector::controller::{Dispatcher, ReconcileDriver};
use ca_bundle_injector::health::StatusRegistry;
use ca_bundle_injector::metrics::{self, Metrics};
use ca_bundle_injector::models::ConfigMap;
use ca_bundle_injector::store::InMemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default filter
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ca_bundle_injector=debug")),
        )
        .init();

    tracing::info!("🚀 Starting trusted CA bundle injector");

    let config = ControllerConfig::load()?;
    tracing::info!(
        workers = config.workers,
        pass_timeout_secs = config.pass_timeout_secs,
        metrics_port = config.metrics_port,
        "Loaded configuration"
    );

    // === 1. Metrics and health ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());
    let status = Arc::new(StatusRegistry::new());

    // actix-web wants its own system, so it gets its own thread
    let metrics_registry = metrics.registry().clone();
    let server_status = status.clone();
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        let result = actix_web::rt::System::new().block_on(metrics::start_metrics_server(
            metrics_registry,
            server_status,
            metrics_port,
        ));
        if let Err(e) = result {
            tracing::error!("Metrics server error: {}", e);
        }
    });

    // === 2. Store and watch ===
    let store = Arc::new(InMemoryStore::new());
    // Subscribe before seeding so the seed writes are reconciled too
    let events = store.watch();

    // === 3. Controller ===
    let driver = Arc::new(ReconcileDriver::new(
        store.clone(),
        status.clone(),
        config.retry_config(),
        metrics.clone(),
    ));
    let mut dispatcher = Dispatcher::new(driver, config.workers, metrics.clone());
    if let Some(timeout) = config.pass_timeout() {
        dispatcher = dispatcher.with_pass_timeout(timeout);
    }
    let shutdown = dispatcher.shutdown_token();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl-C, shutting down"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C, shutting down"),
        }
        shutdown.cancel();
    });

    let run = tokio::spawn(dispatcher.run(events));

    // === 4. Seed demo objects ===
    seed(&store, &config).await?;

    let summary = run.await?;
    tracing::info!(
        passes = summary.passes,
        failed = summary.failed_passes,
        canceled = summary.canceled_passes,
        "🎉 Controller stopped"
    );

    Ok(())
}

async fn seed(store: &InMemoryStore, config: &ControllerConfig) -> anyhow::Result<()> {
    for namespace in ["demo-frontend", "demo-backend"] {
        store
            .put(
                ConfigMap::new(namespace, "trusted-ca")
                    .with_label(TRUSTED_CA_BUNDLE_CONFIGMAP_LABEL, INJECT_LABEL_VALUE),
            )
            .await;
    }
    tracing::info!("📝 Seeded demo target config maps");

    match &config.bundle_file {
        Some(path) => {
            let pem = tokio::fs::read_to_string(path).await.map_err(|e| {
                anyhow::anyhow!("failed to read bundle file {}: {}", path.display(), e)
            })?;
            store
                .put(
                    ConfigMap::new(TRUSTED_CA_BUNDLE_CONFIGMAP_NS, TRUSTED_CA_BUNDLE_CONFIGMAP)
                        .with_data(TRUSTED_CA_BUNDLE_CONFIGMAP_KEY, pem),
                )
                .await;
            tracing::info!(path = %path.display(), "✅ Seeded trusted CA bundle");
        }
        None => {
            tracing::warn!("No bundle_file configured; passes are no-ops until the bundle exists");
        }
    }

    Ok(())
}
