//! Storage layer
//!
//! The local document store: durable, per-collection, schema-validated and
//! reactive to writes.
//!
//! ## Architecture
//!
//! - **SQLite**: durable rows, one JSON body per document
//! - **Collection**: in-memory copy, key checks, observers
//!
//! A mutation is written to SQLite before the in-memory copy changes and
//! before subscribers are notified.

pub mod collection;
pub mod error;
pub mod persistence;
pub mod schema;

pub use collection::{restore_both, ApplyOutcome, Collection, Matches, Snapshot, Subscription};
pub use error::{StoreError, StoreResult};
pub use persistence::SqlitePersistence;
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
