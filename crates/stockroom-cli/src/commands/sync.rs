//! Sync command handler

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::debug;

use stockroom_core::{
    ConnectivityMonitor, HttpGateway, PassOutcome, RemoteGateway, ReplicationEngine, Store,
    Trigger,
};

use crate::output::Output;

/// Fail with setup hints unless replication is configured
pub fn require_replication(store: &Store) -> Result<()> {
    let config = store.config();

    if !config.sync_enabled {
        bail!(
            "Sync is not enabled. Enable it with:\n  \
             stockroom config set sync_enabled true\n  \
             stockroom config set remote_url http://your-server:5984"
        );
    }

    if config.remote_url.is_none() {
        bail!(
            "Remote URL not configured. Set it with:\n  \
             stockroom config set remote_url http://your-server:5984"
        );
    }

    Ok(())
}

/// Run one pass against the configured remote
///
/// A one-shot command has no long-lived connectivity feed, so the monitor
/// is seeded from a single probe.
async fn run_once(store: &Store, trigger: Trigger) -> Result<PassOutcome> {
    let gateway = HttpGateway::from_config(store.config()).context("Failed to set up remote")?;
    let gateway: Arc<dyn RemoteGateway> = Arc::new(gateway);

    let online = gateway.probe().await;
    debug!(online, "Probed remote before pass");

    let engine = ReplicationEngine::new(
        store.clone(),
        gateway,
        ConnectivityMonitor::with_state(online),
    );
    Ok(engine.run_pass(trigger).await)
}

/// Sync with the remote service
pub async fn sync(store: &Store, output: &Output) -> Result<()> {
    require_replication(store)?;

    output.message("Syncing with remote...");
    let outcome = run_once(store, Trigger::Manual).await?;
    output.print_outcome(&outcome);

    if !outcome.is_completed() && !output.is_json() {
        bail!("Sync did not run: {}", outcome);
    }
    Ok(())
}

/// Best-effort pass after a local write; silent unless it fails
pub async fn sync_quiet(store: &Store) -> Result<Option<PassOutcome>> {
    if !store.config().replication_configured() {
        return Ok(None);
    }
    run_once(store, Trigger::LocalChange).await.map(Some)
}
