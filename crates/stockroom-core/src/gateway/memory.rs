//! In-process remote service
//!
//! Behaves like the HTTP service (revisions, conflicts, 404-as-deleted) so
//! the replication engine can be exercised without a network. Tests can
//! take it offline, slow it down, inject a conflict on the next write, and
//! inspect every call that reached it.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::{GatewayError, GatewayResult, RemoteDocument, RemoteGateway};
use crate::models::{CollectionName, Revision};

/// A call that reached the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Probe,
    List(CollectionName),
    Fetch(CollectionName, String),
    Create(CollectionName, String),
    Update(CollectionName, String),
    Delete(CollectionName, String),
}

impl GatewayCall {
    /// Whether the call writes to the remote
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            GatewayCall::Create(..) | GatewayCall::Update(..) | GatewayCall::Delete(..)
        )
    }
}

/// Call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayCalls {
    pub probes: usize,
    pub lists: usize,
    pub fetches: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl GatewayCalls {
    pub fn writes(&self) -> usize {
        self.creates + self.updates + self.deletes
    }

    pub fn total(&self) -> usize {
        self.probes + self.lists + self.fetches + self.writes()
    }
}

#[derive(Debug, Clone)]
struct StoredDoc {
    generation: u64,
    revision: Revision,
    body: Value,
}

#[derive(Default)]
struct Inner {
    reachable: bool,
    listings_fail: bool,
    latency: Duration,
    docs: HashMap<CollectionName, BTreeMap<String, StoredDoc>>,
    log: Vec<GatewayCall>,
    injected: HashMap<(CollectionName, String), GatewayError>,
}

impl Inner {
    fn record(&mut self, call: GatewayCall) -> GatewayResult<()> {
        self.log.push(call);
        if self.reachable {
            Ok(())
        } else {
            Err(GatewayError::Unavailable("connection refused".to_string()))
        }
    }

    fn take_injected(&mut self, collection: CollectionName, id: &str) -> GatewayResult<()> {
        match self.injected.remove(&(collection, id.to_string())) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn collection(&mut self, collection: CollectionName) -> &mut BTreeMap<String, StoredDoc> {
        self.docs.entry(collection).or_default()
    }

    fn write(&mut self, collection: CollectionName, id: &str, body: Value) -> Revision {
        let docs = self.collection(collection);
        let generation = docs.get(id).map_or(1, |doc| doc.generation + 1);
        let revision = next_revision(generation);
        docs.insert(
            id.to_string(),
            StoredDoc {
                generation,
                revision: revision.clone(),
                body,
            },
        );
        revision
    }
}

fn next_revision(generation: u64) -> Revision {
    let hash = Uuid::new_v4().simple().to_string();
    Revision::new(format!("{}-{}", generation, &hash[..12]))
}

fn to_remote(id: &str, doc: &StoredDoc) -> RemoteDocument {
    RemoteDocument::new(id, doc.revision.clone(), doc.body.clone())
}

/// In-memory [`RemoteGateway`]
pub struct InMemoryGateway {
    inner: Mutex<Inner>,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGateway {
    /// An empty, reachable service
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                reachable: true,
                ..Inner::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// Make listings fail (and so come back empty) while other calls work
    pub fn set_listings_fail(&self, fail: bool) {
        self.lock().listings_fail = fail;
    }

    /// Delay applied to every call before it is served
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Store a document as if another client had created it
    pub fn seed(&self, collection: CollectionName, id: &str, body: Value) -> Revision {
        self.lock().write(collection, id, body)
    }

    /// Edit an existing document as another client would; `None` if absent
    pub fn remote_edit(&self, collection: CollectionName, id: &str, body: Value) -> Option<Revision> {
        let mut inner = self.lock();
        if !inner.collection(collection).contains_key(id) {
            return None;
        }
        Some(inner.write(collection, id, body))
    }

    /// Delete a document as another client would
    pub fn remote_delete(&self, collection: CollectionName, id: &str) -> bool {
        self.lock().collection(collection).remove(id).is_some()
    }

    /// Fail the next create, update, or delete of `id` with `error`
    pub fn fail_next_write(&self, collection: CollectionName, id: &str, error: GatewayError) {
        self.lock()
            .injected
            .insert((collection, id.to_string()), error);
    }

    /// Fail the next write of `id` with a revision conflict
    pub fn conflict_next_write(&self, collection: CollectionName, id: &str) {
        self.fail_next_write(
            collection,
            id,
            GatewayError::RevisionConflict {
                collection,
                id: id.to_string(),
            },
        );
    }

    pub fn get(&self, collection: CollectionName, id: &str) -> Option<RemoteDocument> {
        let mut inner = self.lock();
        inner.collection(collection).get(id).map(|doc| to_remote(id, doc))
    }

    /// All documents in a collection, ordered by id
    pub fn documents(&self, collection: CollectionName) -> Vec<RemoteDocument> {
        let mut inner = self.lock();
        inner
            .collection(collection)
            .iter()
            .map(|(id, doc)| to_remote(id, doc))
            .collect()
    }

    /// Every call received, in order
    pub fn call_log(&self) -> Vec<GatewayCall> {
        self.lock().log.clone()
    }

    pub fn calls(&self) -> GatewayCalls {
        let inner = self.lock();
        let mut calls = GatewayCalls::default();
        for call in &inner.log {
            match call {
                GatewayCall::Probe => calls.probes += 1,
                GatewayCall::List(_) => calls.lists += 1,
                GatewayCall::Fetch(..) => calls.fetches += 1,
                GatewayCall::Create(..) => calls.creates += 1,
                GatewayCall::Update(..) => calls.updates += 1,
                GatewayCall::Delete(..) => calls.deletes += 1,
            }
        }
        calls
    }

    pub fn reset_calls(&self) {
        self.lock().log.clear();
    }

    async fn delay(&self) {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl RemoteGateway for InMemoryGateway {
    async fn probe(&self) -> bool {
        self.delay().await;
        self.lock().record(GatewayCall::Probe).is_ok()
    }

    async fn list_all(&self, collection: CollectionName) -> Vec<RemoteDocument> {
        self.delay().await;
        let mut inner = self.lock();
        if inner.record(GatewayCall::List(collection)).is_err() || inner.listings_fail {
            return Vec::new();
        }
        inner
            .collection(collection)
            .iter()
            .map(|(id, doc)| to_remote(id, doc))
            .collect()
    }

    async fn fetch(
        &self,
        collection: CollectionName,
        id: &str,
    ) -> GatewayResult<Option<RemoteDocument>> {
        self.delay().await;
        let mut inner = self.lock();
        inner.record(GatewayCall::Fetch(collection, id.to_string()))?;
        Ok(inner.collection(collection).get(id).map(|doc| to_remote(id, doc)))
    }

    async fn create(
        &self,
        collection: CollectionName,
        id: &str,
        body: &Value,
    ) -> GatewayResult<Revision> {
        self.delay().await;
        let mut inner = self.lock();
        inner.record(GatewayCall::Create(collection, id.to_string()))?;
        inner.take_injected(collection, id)?;

        if inner.collection(collection).contains_key(id) {
            return Err(GatewayError::Rejected {
                status: 409,
                reason: "Document update conflict.".to_string(),
            });
        }
        Ok(inner.write(collection, id, body.clone()))
    }

    async fn update(
        &self,
        collection: CollectionName,
        id: &str,
        body: &Value,
        known_revision: &Revision,
    ) -> GatewayResult<Revision> {
        self.delay().await;
        let mut inner = self.lock();
        inner.record(GatewayCall::Update(collection, id.to_string()))?;
        inner.take_injected(collection, id)?;

        let current = inner.collection(collection).get(id).map(|doc| doc.revision.clone());
        if current.as_ref() != Some(known_revision) {
            return Err(GatewayError::RevisionConflict {
                collection,
                id: id.to_string(),
            });
        }
        Ok(inner.write(collection, id, body.clone()))
    }

    async fn delete(
        &self,
        collection: CollectionName,
        id: &str,
        known_revision: &Revision,
    ) -> GatewayResult<()> {
        self.delay().await;
        let mut inner = self.lock();
        inner.record(GatewayCall::Delete(collection, id.to_string()))?;
        inner.take_injected(collection, id)?;

        let docs = inner.collection(collection);
        let current = docs.get(id).map(|doc| doc.revision.clone());
        match current {
            None => Ok(()),
            Some(revision) if &revision == known_revision => {
                docs.remove(id);
                Ok(())
            }
            Some(_) => Err(GatewayError::RevisionConflict {
                collection,
                id: id.to_string(),
            }),
        }
    }
}
