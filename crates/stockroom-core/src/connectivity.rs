//! Connectivity monitor
//!
//! Process-wide source of truth for online/offline state. A
//! [`ConnectivityFeed`] supplies raw readings; the monitor turns them into
//! edges and calls its listeners, in registration order, only when the
//! state actually flips.
//!
//! ## Feeds
//!
//! - [`HttpReachabilityFeed`]: probes the remote service on an interval
//! - [`ManualFeed`]: driven by a [`ConnectivityController`], for tests and
//!   embedders that already know the platform state

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::gateway::RemoteGateway;

/// Source of raw connectivity readings
#[async_trait]
pub trait ConnectivityFeed: Send + 'static {
    /// Current reachability, used once when the monitor starts
    async fn probe(&mut self) -> bool;

    /// Wait for the next reading; `None` when the feed has ended
    async fn next(&mut self) -> Option<bool>;
}

type Listener = Arc<dyn Fn(bool) + Send + Sync>;

struct Inner {
    state: watch::Sender<bool>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener: AtomicU64,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn listeners(&self) -> MutexGuard<'_, Vec<(u64, Listener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a reading; listeners run only on an edge
    ///
    /// The flip and the listener snapshot happen under the listeners lock,
    /// so a listener registered concurrently sees either the old state
    /// followed by this edge, or only the new state.
    fn set(&self, online: bool) {
        let listeners: Vec<Listener> = {
            let registered = self.listeners();
            let flipped = self.state.send_if_modified(|current| {
                if *current == online {
                    false
                } else {
                    *current = online;
                    true
                }
            });
            if !flipped {
                return;
            }
            registered
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect()
        };

        info!(online, "Connectivity changed");
        for listener in listeners {
            listener(online);
        }
    }
}

/// Online/offline state shared across the process
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<Inner>,
}

impl ConnectivityMonitor {
    fn with_inner(online: bool) -> Self {
        let (state, _) = watch::channel(online);
        Self {
            inner: Arc::new(Inner {
                state,
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
                task: Mutex::new(None),
            }),
        }
    }

    /// Start monitoring `feed`
    ///
    /// The monitor reports offline until the initial probe completes; the
    /// probe and every later reading run on a background task. Must be
    /// called within a Tokio runtime.
    pub fn start(mut feed: impl ConnectivityFeed) -> Self {
        let monitor = Self::with_inner(false);
        let weak = Arc::downgrade(&monitor.inner);

        let task = tokio::spawn(async move {
            let initial = feed.probe().await;
            debug!(online = initial, "Initial connectivity probe");
            if !apply(&weak, initial) {
                return;
            }
            while let Some(online) = feed.next().await {
                if !apply(&weak, online) {
                    return;
                }
            }
            debug!("Connectivity feed ended");
        });

        *monitor
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(task);
        monitor
    }

    /// A monitor fixed at `online`, with no feed
    pub fn with_state(online: bool) -> Self {
        Self::with_inner(online)
    }

    /// Last known state
    pub fn is_online(&self) -> bool {
        *self.inner.state.borrow()
    }

    /// Register a listener
    ///
    /// The listener is called once right away with the current state, then
    /// on every edge until the handle is dropped. The initial call runs
    /// under the listeners lock; it must not register or drop listeners.
    pub fn add_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        let listener: Listener = Arc::new(listener);

        let mut registered = self.inner.listeners();
        listener(self.is_online());
        registered.push((id, listener));
        drop(registered);

        ListenerHandle {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.inner.listeners().len()
    }

    /// Observe state changes as a watch channel
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.inner.state.subscribe()
    }

    /// Stop following the feed; the last state is kept
    pub fn shutdown(&self) {
        let task = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

fn apply(weak: &Weak<Inner>, online: bool) -> bool {
    match weak.upgrade() {
        Some(inner) => {
            inner.set(online);
            true
        }
        None => false,
    }
}

/// Keeps a listener registered; dropping it unsubscribes
#[must_use = "dropping the handle removes the listener"]
pub struct ListenerHandle {
    id: u64,
    inner: Weak<Inner>,
}

impl ListenerHandle {
    pub fn unsubscribe(self) {}
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.listeners().retain(|(id, _)| *id != self.id);
        }
    }
}

/// Feed that probes the remote service on a fixed interval
pub struct HttpReachabilityFeed {
    gateway: Arc<dyn RemoteGateway>,
    interval: Duration,
}

impl HttpReachabilityFeed {
    pub fn new(gateway: Arc<dyn RemoteGateway>, interval: Duration) -> Self {
        Self { gateway, interval }
    }
}

#[async_trait]
impl ConnectivityFeed for HttpReachabilityFeed {
    async fn probe(&mut self) -> bool {
        self.gateway.probe().await
    }

    async fn next(&mut self) -> Option<bool> {
        tokio::time::sleep(self.interval).await;
        Some(self.gateway.probe().await)
    }
}

/// Feed driven by a [`ConnectivityController`]
pub struct ManualFeed {
    current: Arc<AtomicBool>,
    readings: mpsc::UnboundedReceiver<bool>,
}

/// Reports readings to a [`ManualFeed`]
#[derive(Clone)]
pub struct ConnectivityController {
    current: Arc<AtomicBool>,
    readings: mpsc::UnboundedSender<bool>,
}

impl ManualFeed {
    /// A feed whose initial probe answers `online`
    pub fn new(online: bool) -> (Self, ConnectivityController) {
        let current = Arc::new(AtomicBool::new(online));
        let (sender, readings) = mpsc::unbounded_channel();
        (
            Self {
                current: Arc::clone(&current),
                readings,
            },
            ConnectivityController {
                current,
                readings: sender,
            },
        )
    }
}

#[async_trait]
impl ConnectivityFeed for ManualFeed {
    async fn probe(&mut self) -> bool {
        self.current.load(Ordering::SeqCst)
    }

    async fn next(&mut self) -> Option<bool> {
        self.readings.recv().await
    }
}

impl ConnectivityController {
    /// Report a reading; repeated readings are forwarded and ignored by
    /// the monitor unless they flip the state
    pub fn set_online(&self, online: bool) {
        self.current.store(online, Ordering::SeqCst);
        let _ = self.readings.send(online);
    }
}
