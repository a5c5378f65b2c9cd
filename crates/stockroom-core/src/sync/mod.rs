//! Replication between the local store and the remote document service
//!
//! ## Passes
//!
//! A reconciliation pass is `Idle → Probing → Pulling → Pushing → Idle`:
//! 1. Probe the remote; an unreachable remote ends the pass untouched
//! 2. Pull every collection, inserting unknown documents and overwriting
//!    local copies whose revision differs
//! 3. Push pending creates, local edits and tombstones
//!
//! Only one pass runs at a time. The [`worker`] turns connectivity edges,
//! startup and local writes into passes.
//!
//! ## Usage
//!
//! ```ignore
//! let engine = Arc::new(ReplicationEngine::new(store, gateway, monitor));
//! let handle = spawn_replication(engine, config.startup_delay());
//!
//! store.add_business("Acme")?;
//! handle.request_sync();
//! ```

mod engine;
mod state;
pub mod worker;

pub use engine::ReplicationEngine;
pub use state::{PassOutcome, PassStats, ReplicationState, Trigger};
pub use worker::{spawn_replication, ReplicationHandle};
