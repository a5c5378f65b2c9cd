//! Background replication worker
//!
//! Owns a [`ReplicationEngine`] on a Tokio task and turns triggers into
//! passes:
//! - the startup warm-up delay elapsing
//! - the connectivity monitor going from offline to online
//! - a local write calling [`ReplicationHandle::request_sync`]
//! - [`ReplicationHandle::sync_now`]
//!
//! Triggers that arrive while a pass runs are coalesced into it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::engine::ReplicationEngine;
use super::state::{PassOutcome, ReplicationState, Trigger};

/// Commands sent to the worker task
#[derive(Debug)]
enum Command {
    /// Best-effort pass after a local write
    Request,
    /// Run a pass and report its outcome
    SyncNow(oneshot::Sender<PassOutcome>),
    /// Stop the worker
    Shutdown,
}

/// Handle to control the replication worker
pub struct ReplicationHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ReplicationState>,
    last_outcome: watch::Receiver<Option<PassOutcome>>,
    task: JoinHandle<()>,
}

/// Spawn the replication worker
///
/// The first pass runs once `startup_delay` has elapsed. Must be called
/// within a Tokio runtime.
pub fn spawn_replication(engine: Arc<ReplicationEngine>, startup_delay: Duration) -> ReplicationHandle {
    let (commands, command_rx) = mpsc::unbounded_channel();
    let (outcome_tx, last_outcome) = watch::channel(None);
    let state = engine.subscribe_state();

    let task = tokio::spawn(worker_loop(engine, startup_delay, command_rx, outcome_tx));

    ReplicationHandle {
        commands,
        state,
        last_outcome,
        task,
    }
}

async fn worker_loop(
    engine: Arc<ReplicationEngine>,
    startup_delay: Duration,
    mut commands: mpsc::UnboundedReceiver<Command>,
    outcome_tx: watch::Sender<Option<PassOutcome>>,
) {
    let (edge_tx, mut edges) = mpsc::unbounded_channel();
    let _listener = engine.monitor().add_listener(move |online| {
        let _ = edge_tx.send(online);
    });
    // The listener reports the current state once on registration
    let mut was_online = edges.recv().await.unwrap_or(false);

    let startup = tokio::time::sleep(startup_delay);
    tokio::pin!(startup);
    let mut started = false;

    loop {
        let mut reply = None;
        let trigger = tokio::select! {
            _ = &mut startup, if !started => {
                started = true;
                Trigger::Startup
            }
            Some(online) = edges.recv() => {
                let edge = online && !was_online;
                was_online = online;
                if !edge {
                    continue;
                }
                Trigger::Reconnected
            }
            command = commands.recv() => match command {
                Some(Command::Request) => Trigger::LocalChange,
                Some(Command::SyncNow(sender)) => {
                    reply = Some(sender);
                    Trigger::Manual
                }
                Some(Command::Shutdown) | None => break,
            },
        };

        let outcome = engine.run_pass(trigger).await;
        debug!(%trigger, %outcome, "Pass ended");
        if let Some(sender) = reply {
            let _ = sender.send(outcome.clone());
        }
        outcome_tx.send_replace(Some(outcome));

        // Triggers that queued up during the pass were covered by it
        while let Ok(online) = edges.try_recv() {
            was_online = online;
        }
        let mut shutdown = false;
        while let Ok(command) = commands.try_recv() {
            match command {
                Command::Request => {}
                Command::SyncNow(sender) => {
                    let _ = sender.send(PassOutcome::Coalesced);
                }
                Command::Shutdown => shutdown = true,
            }
        }
        if shutdown {
            break;
        }
    }

    info!("Replication worker stopped");
}

impl ReplicationHandle {
    /// Ask for a best-effort pass; returns immediately
    pub fn request_sync(&self) {
        let _ = self.commands.send(Command::Request);
    }

    /// Run a pass and wait for its outcome
    ///
    /// Returns `None` if the worker has stopped.
    pub async fn sync_now(&self) -> Option<PassOutcome> {
        let (sender, receiver) = oneshot::channel();
        self.commands.send(Command::SyncNow(sender)).ok()?;
        receiver.await.ok()
    }

    pub fn state(&self) -> ReplicationState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ReplicationState> {
        self.state.clone()
    }

    /// Outcome of the most recent pass, if any
    pub fn last_outcome(&self) -> Option<PassOutcome> {
        self.last_outcome.borrow().clone()
    }

    /// Watch pass outcomes as they complete
    pub fn subscribe_outcomes(&self) -> watch::Receiver<Option<PassOutcome>> {
        self.last_outcome.clone()
    }

    /// Stop the worker after any running pass and wait for it
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        let _ = self.task.await;
    }
}
