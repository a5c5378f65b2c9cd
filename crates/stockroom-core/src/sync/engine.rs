//! Replication engine
//!
//! Runs reconciliation passes between the local [`Store`] and a
//! [`RemoteGateway`]. A pass probes the remote, pulls every collection,
//! cascades local business deletes to pulled articles, then pushes every
//! collection's pending work. Collections are handled
//! concurrently; documents within a collection are handled one at a time.
//!
//! Conflict policy: the remote wins on pull, a local edit is retried once
//! on push against the freshly fetched revision. A document whose remote
//! call fails is logged and left pending for the next trigger.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::state::{PassOutcome, PassStats, ReplicationState, Trigger};
use crate::connectivity::ConnectivityMonitor;
use crate::gateway::{GatewayError, RemoteGateway};
use crate::models::{Document, Revision};
use crate::storage::{ApplyOutcome, Collection, StoreError};
use crate::store::Store;

/// Why a single document was left pending
#[derive(Error, Debug)]
enum DocumentFailure {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What happened to a single pushed document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PushAction {
    Created,
    Updated,
    Deleted,
    Adopted,
    Deferred,
}

/// Resets the published state when a pass ends, however it ends
struct PhaseGuard<'a> {
    state: &'a watch::Sender<ReplicationState>,
}

impl<'a> PhaseGuard<'a> {
    fn enter(&self, phase: ReplicationState) {
        self.state.send_replace(phase);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.state.send_replace(ReplicationState::Idle);
    }
}

/// Orchestrates pull-then-push reconciliation
pub struct ReplicationEngine {
    store: Store,
    gateway: Arc<dyn RemoteGateway>,
    monitor: ConnectivityMonitor,
    gate: Mutex<()>,
    state: watch::Sender<ReplicationState>,
}

impl ReplicationEngine {
    pub fn new(
        store: Store,
        gateway: Arc<dyn RemoteGateway>,
        monitor: ConnectivityMonitor,
    ) -> Self {
        let (state, _) = watch::channel(ReplicationState::Idle);
        Self {
            store,
            gateway,
            monitor,
            gate: Mutex::new(()),
            state,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    pub fn state(&self) -> ReplicationState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ReplicationState> {
        self.state.subscribe()
    }

    /// Run one reconciliation pass
    ///
    /// If a pass is already running this waits for it to finish and
    /// returns [`PassOutcome::Coalesced`] without calling the remote.
    pub async fn run_pass(&self, trigger: Trigger) -> PassOutcome {
        let _gate = match self.gate.try_lock() {
            Ok(gate) => gate,
            Err(_) => {
                debug!(%trigger, "Pass already running, coalescing");
                let _wait = self.gate.lock().await;
                return PassOutcome::Coalesced;
            }
        };

        if !self.monitor.is_online() {
            debug!(%trigger, "Offline, skipping pass");
            return PassOutcome::Offline;
        }

        let started = Instant::now();
        let phase = PhaseGuard { state: &self.state };
        info!(%trigger, "Starting replication pass");

        phase.enter(ReplicationState::Probing);
        if !self.gateway.probe().await {
            info!(%trigger, "Remote unreachable, pass aborted");
            return PassOutcome::Unreachable;
        }

        let businesses = self.store.businesses();
        let articles = self.store.articles();

        phase.enter(ReplicationState::Pulling);
        let (pulled_businesses, pulled_articles) =
            tokio::join!(self.pull(businesses), self.pull(articles));

        // Pulled articles may belong to a business deleted here
        if let Err(e) = self.store.cascade_deletes() {
            warn!(error = %e, "Could not cascade deletes to pulled articles");
        }

        phase.enter(ReplicationState::Pushing);
        let (pushed_businesses, pushed_articles) =
            tokio::join!(self.push(businesses), self.push(articles));

        let mut stats = PassStats::default();
        for part in [
            &pulled_businesses,
            &pulled_articles,
            &pushed_businesses,
            &pushed_articles,
        ] {
            stats.merge(part);
        }
        stats.duration = started.elapsed();

        info!(
            %trigger,
            pulled = stats.pulled(),
            pushed = stats.pushed(),
            deferred = stats.deferred,
            elapsed_ms = stats.duration.as_millis() as u64,
            "Replication pass finished"
        );
        PassOutcome::Completed(stats)
    }

    // ==================== Pull ====================

    async fn pull<T: Document>(&self, collection: &Collection<T>) -> PassStats {
        let mut stats = PassStats::default();
        let remote_docs = self.gateway.list_all(T::COLLECTION).await;

        for remote in &remote_docs {
            match collection.apply_remote(remote) {
                Ok(ApplyOutcome::Inserted) => stats.pulled_inserted += 1,
                Ok(ApplyOutcome::Updated) => stats.pulled_updated += 1,
                Ok(ApplyOutcome::Unchanged) => {}
                Err(e) => {
                    warn!(collection = %T::COLLECTION, id = %remote.id, error = %e, "Skipping remote document");
                }
            }
        }

        debug!(
            collection = %T::COLLECTION,
            listed = remote_docs.len(),
            inserted = stats.pulled_inserted,
            updated = stats.pulled_updated,
            "Pulled collection"
        );
        stats
    }

    // ==================== Push ====================

    async fn push<T: Document>(&self, collection: &Collection<T>) -> PassStats {
        let mut stats = PassStats::default();

        for doc in collection.needing_push() {
            let result = if doc.is_tombstoned() {
                self.push_delete(collection, &doc, &mut stats).await
            } else if doc.is_pending() {
                self.push_create(collection, &doc, &mut stats).await
            } else {
                self.push_update(collection, &doc, &mut stats).await
            };

            match result {
                Ok(PushAction::Created) => stats.created += 1,
                Ok(PushAction::Updated) => stats.updated += 1,
                Ok(PushAction::Deleted) => stats.deleted += 1,
                Ok(PushAction::Adopted) => stats.adopted += 1,
                Ok(PushAction::Deferred) => stats.deferred += 1,
                Err(e) => {
                    warn!(collection = %T::COLLECTION, id = %doc.id(), error = %e, "Push failed, leaving document pending");
                    stats.deferred += 1;
                }
            }
        }

        stats
    }

    /// Create a pending document remotely
    ///
    /// A create rejected because the id already exists is resolved by
    /// adopting the remote copy.
    async fn push_create<T: Document>(
        &self,
        collection: &Collection<T>,
        doc: &T,
        stats: &mut PassStats,
    ) -> Result<PushAction, DocumentFailure> {
        let id = doc.id();
        match self.gateway.create(T::COLLECTION, id, &doc.to_remote()).await {
            Ok(revision) => {
                debug!(collection = %T::COLLECTION, id, %revision, "Created remotely");
                collection.mark_synced(id, revision, doc)?;
                Ok(PushAction::Created)
            }
            Err(e) if e.is_duplicate() => {
                stats.conflicts += 1;
                match self.gateway.fetch(T::COLLECTION, id).await? {
                    Some(remote) => {
                        debug!(collection = %T::COLLECTION, id, revision = %remote.revision, "Adopting existing remote document");
                        collection.apply_remote(&remote)?;
                        Ok(PushAction::Adopted)
                    }
                    None => {
                        warn!(collection = %T::COLLECTION, id, "Create rejected but document not found remotely");
                        Ok(PushAction::Deferred)
                    }
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write a local edit of a synced document
    async fn push_update<T: Document>(
        &self,
        collection: &Collection<T>,
        doc: &T,
        stats: &mut PassStats,
    ) -> Result<PushAction, DocumentFailure> {
        let id = doc.id();
        let Some(known) = doc.revision() else {
            return Ok(PushAction::Deferred);
        };

        match self
            .gateway
            .update(T::COLLECTION, id, &doc.to_remote(), known)
            .await
        {
            Ok(revision) => {
                collection.mark_synced(id, revision, doc)?;
                Ok(PushAction::Updated)
            }
            Err(GatewayError::RevisionConflict { .. }) => {
                stats.conflicts += 1;
                let Some(remote) = self.gateway.fetch(T::COLLECTION, id).await? else {
                    debug!(collection = %T::COLLECTION, id, "Edited document deleted remotely, purging");
                    collection.purge(id)?;
                    return Ok(PushAction::Deleted);
                };

                let retry = collection.adopt_revision(id, remote.revision.clone())?;
                debug!(collection = %T::COLLECTION, id, revision = %remote.revision, "Retrying update");
                let revision = self
                    .gateway
                    .update(T::COLLECTION, id, &retry.to_remote(), &remote.revision)
                    .await?;
                collection.mark_synced(id, revision, &retry)?;
                Ok(PushAction::Updated)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a tombstoned document remotely, then purge it locally
    async fn push_delete<T: Document>(
        &self,
        collection: &Collection<T>,
        doc: &T,
        stats: &mut PassStats,
    ) -> Result<PushAction, DocumentFailure> {
        let id = doc.id();

        let Some(known) = doc.revision() else {
            // Never confirmed; the remote may still hold it if a create
            // response was lost
            return match self.gateway.fetch(T::COLLECTION, id).await? {
                None => {
                    collection.purge(id)?;
                    Ok(PushAction::Deleted)
                }
                Some(remote) => {
                    self.delete_remote(collection, id, &remote.revision).await?;
                    Ok(PushAction::Deleted)
                }
            };
        };

        match self.delete_remote(collection, id, known).await {
            Ok(()) => Ok(PushAction::Deleted),
            Err(DocumentFailure::Gateway(GatewayError::RevisionConflict { .. })) => {
                stats.conflicts += 1;
                match self.gateway.fetch(T::COLLECTION, id).await? {
                    None => {
                        collection.purge(id)?;
                        Ok(PushAction::Deleted)
                    }
                    Some(remote) => {
                        collection.apply_remote(&remote)?;
                        debug!(collection = %T::COLLECTION, id, revision = %remote.revision, "Retrying delete");
                        self.delete_remote(collection, id, &remote.revision).await?;
                        Ok(PushAction::Deleted)
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_remote<T: Document>(
        &self,
        collection: &Collection<T>,
        id: &str,
        revision: &Revision,
    ) -> Result<(), DocumentFailure> {
        self.gateway.delete(T::COLLECTION, id, revision).await?;
        collection.purge(id)?;
        debug!(collection = %T::COLLECTION, id, "Deleted remotely and purged");
        Ok(())
    }
}
