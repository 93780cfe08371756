//! Maintenance daemon: restores the graph from its snapshot, runs the
//! updater loop until interrupted, then writes a final snapshot.

use anyhow::Context;
use riskgraph_core::{init_tracing, ConfigManager};
use riskgraph_graph::{GraphService, JsonFileSnapshotStore};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let manager = ConfigManager::load().context("Failed to load RiskGraph configuration")?;
    if let Some(path) = manager.config_path() {
        eprintln!("Using configuration from {}", path.display());
    }
    let config = manager.into_config();
    init_tracing(&config.logging);

    let snapshot_enabled = config.snapshot.enabled;
    let snapshot_path = config.snapshot.path.clone();
    let mut service = GraphService::new(config);
    if snapshot_enabled {
        service = service.with_store(Arc::new(JsonFileSnapshotStore::new(&snapshot_path)));
        let restored = service
            .load_snapshot()
            .await
            .with_context(|| format!("Failed to load snapshot {}", snapshot_path.display()))?;
        if !restored {
            info!(path = %snapshot_path.display(), "No snapshot found, starting empty");
        }
    }

    let stats = service.statistics();
    info!(
        nodes = stats.node_count,
        edges = stats.edge_count,
        "RiskGraph updater starting"
    );

    let updater = service.updater();
    let token = service.shutdown_token();
    let handle = tokio::spawn(async move { updater.run(token).await });

    shutdown_signal().await;
    service.shutdown();
    handle.await.context("Updater task panicked")?;

    if let Err(e) = service.save_snapshot().await {
        warn!(error = %e, "Final snapshot save failed");
    }
    info!("RiskGraph updater stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down gracefully"),
        _ = terminate => info!("Received SIGTERM, shutting down gracefully"),
    }
}
