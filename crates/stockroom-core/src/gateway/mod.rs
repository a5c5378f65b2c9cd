//! Remote document gateway
//!
//! Translates the replication engine's intent (list, fetch, create,
//! update, delete) into calls against the remote document service.
//!
//! ## Implementations
//!
//! - [`HttpGateway`]: CouchDB-style HTTP API via `reqwest`
//! - `InMemoryGateway`: in-process server for tests and demos, behind the
//!   `test-util` feature
//!
//! Every write after the first is conditional on the last known
//! [`Revision`]; a stale revision yields [`GatewayError::RevisionConflict`].

mod credentials;
mod error;
mod http;
#[cfg(any(test, feature = "test-util"))]
mod memory;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::models::{CollectionName, Revision};

pub use credentials::{Anonymous, BasicAuth, CredentialProvider};
pub use error::{GatewayError, GatewayResult};
pub use http::HttpGateway;
#[cfg(any(test, feature = "test-util"))]
pub use memory::{GatewayCall, GatewayCalls, InMemoryGateway};

/// A document as seen by the remote service
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDocument {
    pub id: String,
    pub revision: Revision,
    /// Wire fields without the `_id`/`_rev` envelope
    pub body: serde_json::Value,
}

impl RemoteDocument {
    pub fn new(id: impl Into<String>, revision: impl Into<Revision>, body: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            revision: revision.into(),
            body,
        }
    }

    /// Decode the wire fields into a typed shape
    pub fn decode_body<T: DeserializeOwned>(&self) -> Result<T, String> {
        serde_json::from_value(self.body.clone())
            .map_err(|e| format!("malformed remote document {}: {}", self.id, e))
    }
}

/// Access to the remote, authoritative document service
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Lightweight reachability check
    async fn probe(&self) -> bool;

    /// Every non-deleted document with its revision.
    ///
    /// Transport failures yield an empty list so a pass can continue in
    /// local-only mode.
    async fn list_all(&self, collection: CollectionName) -> Vec<RemoteDocument>;

    /// A single document, `None` when the remote has no such id
    async fn fetch(
        &self,
        collection: CollectionName,
        id: &str,
    ) -> GatewayResult<Option<RemoteDocument>>;

    /// Create a document under its client-generated id
    async fn create(
        &self,
        collection: CollectionName,
        id: &str,
        body: &serde_json::Value,
    ) -> GatewayResult<Revision>;

    /// Replace a document, conditional on `known_revision`
    async fn update(
        &self,
        collection: CollectionName,
        id: &str,
        body: &serde_json::Value,
        known_revision: &Revision,
    ) -> GatewayResult<Revision>;

    /// Delete a document, conditional on `known_revision`; an id the
    /// remote no longer has counts as deleted
    async fn delete(
        &self,
        collection: CollectionName,
        id: &str,
        known_revision: &Revision,
    ) -> GatewayResult<()>;
}
