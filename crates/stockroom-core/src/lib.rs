//! Stockroom Core Library
//!
//! This crate provides the core functionality for Stockroom, an
//! offline-first record keeper for businesses and the articles they sell.
//! Every write lands in a local store first; a replication engine
//! reconciles it with a remote document service whenever one is reachable.
//!
//! # Architecture
//!
//! - **Local store**: SQLite-backed, per-collection, reactive to writes
//! - **Connectivity monitor**: single source of truth for online/offline
//! - **Remote gateway**: HTTP access to the remote document service
//! - **Replication engine**: pull-then-push reconciliation passes
//!
//! # Quick Start
//!
//! ```text
//! let store = Store::open()?;
//! let acme = store.add_business("Acme")?;
//!
//! let gateway = Arc::new(HttpGateway::from_config(store.config())?);
//! let monitor = ConnectivityMonitor::start(HttpReachabilityFeed::new(gateway.clone(), interval));
//! let engine = Arc::new(ReplicationEngine::new(store.clone(), gateway, monitor));
//! let handle = spawn_replication(engine, store.config().startup_delay());
//! ```
//!
//! # Modules
//!
//! - `store`: Unified storage interface (main entry point)
//! - `models`: Business and Article documents with replication metadata
//! - `storage`: SQLite persistence and reactive collections
//! - `connectivity`: Online/offline monitor and feeds
//! - `gateway`: Remote document service access
//! - `sync`: Replication engine and worker
//! - `config`: Application configuration

pub mod config;
pub mod connectivity;
pub mod gateway;
pub mod models;
pub mod storage;
pub mod store;
pub mod sync;

pub use config::Config;
pub use connectivity::{
    ConnectivityController, ConnectivityFeed, ConnectivityMonitor, HttpReachabilityFeed,
    ListenerHandle, ManualFeed,
};
pub use gateway::{
    Anonymous, BasicAuth, CredentialProvider, GatewayError, HttpGateway, RemoteDocument,
    RemoteGateway,
};
#[cfg(any(test, feature = "test-util"))]
pub use gateway::InMemoryGateway;
pub use models::{
    Article, ArticlePatch, Business, BusinessPatch, CollectionName, Document, NewArticle,
    Revision, SyncMeta,
};
pub use storage::{Collection, StoreError, Subscription};
pub use store::{Backlog, CollectionBacklog, Store, StoreDump};
pub use sync::{
    spawn_replication, PassOutcome, PassStats, ReplicationEngine, ReplicationHandle,
    ReplicationState, Trigger,
};
