//! Replication state machine types

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Phase of the replication engine
///
/// A pass moves `Idle → Probing → Pulling → Pushing → Idle`; a pass that
/// finds the remote unreachable goes straight back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationState {
    Idle,
    Probing,
    Pulling,
    Pushing,
}

impl ReplicationState {
    /// Whether a pass is running
    pub fn is_active(&self) -> bool {
        !matches!(self, ReplicationState::Idle)
    }
}

impl fmt::Display for ReplicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReplicationState::Idle => "idle",
            ReplicationState::Probing => "probing",
            ReplicationState::Pulling => "pulling",
            ReplicationState::Pushing => "pushing",
        };
        f.write_str(label)
    }
}

/// Why a pass was started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Warm-up delay after start elapsed
    Startup,
    /// Connectivity went from offline to online
    Reconnected,
    /// A local write asked for best-effort replication
    LocalChange,
    /// Explicit "sync now"
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Trigger::Startup => "startup",
            Trigger::Reconnected => "reconnected",
            Trigger::LocalChange => "local change",
            Trigger::Manual => "manual",
        };
        f.write_str(label)
    }
}

/// Counters for one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassStats {
    /// Remote documents that were unknown locally
    pub pulled_inserted: usize,
    /// Local documents overwritten from the remote
    pub pulled_updated: usize,
    /// Pending documents created remotely
    pub created: usize,
    /// Local edits written remotely
    pub updated: usize,
    /// Tombstones purged, with or without a remote delete
    pub deleted: usize,
    /// Pending documents replaced by the remote copy with the same id
    pub adopted: usize,
    /// Revision conflicts and duplicate creates encountered
    pub conflicts: usize,
    /// Documents left pending for the next trigger
    pub deferred: usize,
    #[serde(skip)]
    pub duration: Duration,
}

impl PassStats {
    pub fn pulled(&self) -> usize {
        self.pulled_inserted + self.pulled_updated
    }

    pub fn pushed(&self) -> usize {
        self.created + self.updated + self.deleted + self.adopted
    }

    pub(crate) fn merge(&mut self, other: &PassStats) {
        self.pulled_inserted += other.pulled_inserted;
        self.pulled_updated += other.pulled_updated;
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.adopted += other.adopted;
        self.conflicts += other.conflicts;
        self.deferred += other.deferred;
    }
}

/// Result of asking for a pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "stats", rename_all = "snake_case")]
pub enum PassOutcome {
    /// The pass ran to the end
    Completed(PassStats),
    /// The monitor reported offline; nothing was attempted
    Offline,
    /// The probe failed; local data was not touched
    Unreachable,
    /// Another pass was already running and covered this request
    Coalesced,
}

impl PassOutcome {
    pub fn stats(&self) -> Option<&PassStats> {
        match self {
            PassOutcome::Completed(stats) => Some(stats),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, PassOutcome::Completed(_))
    }
}

impl fmt::Display for PassOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassOutcome::Completed(stats) => write!(
                f,
                "pulled {}, pushed {}, deferred {}",
                stats.pulled(),
                stats.pushed(),
                stats.deferred
            ),
            PassOutcome::Offline => f.write_str("offline, nothing to do"),
            PassOutcome::Unreachable => f.write_str("remote unreachable"),
            PassOutcome::Coalesced => f.write_str("merged into a running pass"),
        }
    }
}
