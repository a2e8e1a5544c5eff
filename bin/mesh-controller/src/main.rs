use anyhow::Result;
use mesh_core::{ChannelUpdater, Features, MeshIndex};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod topology;

use config::{ControllerConfig, LogFormat};
use topology::TopologySnapshot;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ControllerConfig::from_env()?;
    init_tracing(config.log_format);

    info!("Starting mesh-controller...");

    let features = Features::from_env();
    info!(
        "Waypoint interop enabled: {}",
        features.waypoint_interop_enabled()
    );

    let (updater, mut pushes) = ChannelUpdater::new();
    let index = Arc::new(MeshIndex::new(features, Arc::new(updater)));

    tokio::spawn(async move {
        while let Some(request) = pushes.recv().await {
            let configs: Vec<String> = request
                .configs_updated
                .iter()
                .map(ToString::to_string)
                .collect();
            info!(
                "Push requested (full: {}, reason: {:?}): {}",
                request.full,
                request.reason,
                configs.join(", ")
            );
        }
    });

    let snapshot = TopologySnapshot::load(&config.topology_path)?;
    index.sync(snapshot.workloads, snapshot.services)?;
    debug!("Config dump: {}", index.config_dump()?);

    let mut interval = tokio::time::interval(config.reload_interval);
    // first tick completes immediately
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match reload(&config.topology_path, &index) {
                    Ok(0) => debug!("Topology unchanged"),
                    Ok(count) => info!("Applied {} topology changes", count),
                    Err(e) => error!("Error reloading topology: {:#}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down mesh-controller");
                break;
            }
        }
    }

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

/// Reconcile the index with the topology file. Returns the number of
/// events applied.
fn reload(path: &Path, index: &MeshIndex) -> Result<usize> {
    let snapshot = TopologySnapshot::load(path)?;
    let events = snapshot.diff(index);
    if events.is_empty() {
        return Ok(0);
    }

    let count = events.len();
    debug!("Applying {} topology events", count);
    if index.apply_batch(events)?.is_none() {
        debug!("Topology changes did not affect any waypoint config");
    }
    Ok(count)
}
