//! Watch command: keep replicating until interrupted

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use stockroom_core::{
    spawn_replication, ConnectivityMonitor, HttpGateway, HttpReachabilityFeed, RemoteGateway,
    ReplicationEngine, Store,
};

use super::sync::require_replication;
use crate::output::{Output, OutputFormat};

/// Run the replication worker in the foreground
///
/// Passes run after the warm-up delay and whenever the remote becomes
/// reachable again. Stops on Ctrl-C.
pub async fn watch(store: &Store, output: &Output) -> Result<()> {
    require_replication(store)?;
    let config = store.config();

    let gateway = HttpGateway::from_config(config).context("Failed to set up remote")?;
    let remote = gateway.base_url().to_string();
    let gateway: Arc<dyn RemoteGateway> = Arc::new(gateway);

    let monitor = ConnectivityMonitor::start(HttpReachabilityFeed::new(
        Arc::clone(&gateway),
        config.probe_interval(),
    ));
    let printer = *output;
    let _listener = monitor.add_listener(move |online| {
        if printer.format == OutputFormat::Human {
            println!("{}", if online { "● online" } else { "○ offline" });
        }
    });

    let engine = Arc::new(ReplicationEngine::new(
        store.clone(),
        gateway,
        monitor.clone(),
    ));
    let handle = spawn_replication(engine, config.startup_delay());
    let mut outcomes = handle.subscribe_outcomes();

    output.message(&format!("Watching {} (Ctrl-C to stop)", remote));
    info!(%remote, "Watch started");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }
            changed = outcomes.changed() => {
                if changed.is_err() {
                    break;
                }
                let outcome = outcomes.borrow_and_update().clone();
                if let Some(outcome) = outcome {
                    output.print_outcome(&outcome);
                }
            }
        }
    }

    output.message("Stopping...");
    handle.shutdown().await;
    monitor.shutdown();
    Ok(())
}
