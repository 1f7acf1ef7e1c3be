//! Reconnect trigger: runs a sync whenever connectivity comes back.
//!
//! Detecting connectivity is the host's job. It reports what it sees to a
//! [`ConnectivityMonitor`]; [`ReconnectSync`] watches the monitor and drains
//! the queue on every offline → online transition.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Notify, watch};
use tracing::{debug, error, info};

use super::SyncCoordinator;
use crate::model::WorkflowStep;
use crate::store::KvStore;

/// Network reachability as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Connectivity {
    Online,
    Offline,
}

impl std::fmt::Display for Connectivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Connectivity::Online => "online",
            Connectivity::Offline => "offline",
        };
        write!(f, "{s}")
    }
}

/// Latest known connectivity, observable through [`subscribe`](Self::subscribe).
#[derive(Debug)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<Connectivity>,
}

impl ConnectivityMonitor {
    pub fn new(initial: Connectivity) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Report the current state. Returns true if it changed.
    pub fn set(&self, state: Connectivity) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        })
    }

    pub fn current(&self) -> Connectivity {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.tx.subscribe()
    }
}

/// Drives a [`SyncCoordinator`] from connectivity changes.
pub struct ReconnectSync<S> {
    coordinator: Arc<SyncCoordinator<S>>,
    shutdown: Arc<Notify>,
    stopped: Arc<AtomicBool>,
    sync_on_start: bool,
}

impl<S> Clone for ReconnectSync<S> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
            shutdown: Arc::clone(&self.shutdown),
            stopped: Arc::clone(&self.stopped),
            sync_on_start: self.sync_on_start,
        }
    }
}

impl<S: KvStore> ReconnectSync<S> {
    pub fn new(coordinator: Arc<SyncCoordinator<S>>) -> Self {
        Self {
            coordinator,
            shutdown: Arc::new(Notify::new()),
            stopped: Arc::new(AtomicBool::new(false)),
            sync_on_start: true,
        }
    }

    /// Whether to run a catch-up sync when started while already online.
    pub fn sync_on_start(mut self, enabled: bool) -> Self {
        self.sync_on_start = enabled;
        self
    }

    /// Stop every loop running on this handle or any of its clones. Loops
    /// started afterwards return immediately.
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Watch `status` and sync through `deliver` on every offline → online
    /// transition, until [`shutdown`](Self::shutdown) is called or the
    /// monitor is dropped.
    ///
    /// `status` must come from [`ConnectivityMonitor::subscribe`], which only
    /// publishes real changes. A change that lands back on online while the
    /// last seen state was also online therefore went offline and back in
    /// between (typically during a triggered sync) and triggers as well.
    /// Storage errors from a triggered sync are logged and the loop keeps
    /// going.
    pub async fn run<F, Fut, E>(&self, mut status: watch::Receiver<Connectivity>, mut deliver: F)
    where
        F: FnMut(WorkflowStep) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
        E: std::fmt::Display,
    {
        let mut last = *status.borrow_and_update();
        info!(state = %last, "reconnect sync started");

        if self.sync_on_start && last == Connectivity::Online && !self.is_stopped() {
            self.trigger(&mut deliver, "startup").await;
        }

        loop {
            // Register before checking the flag so a shutdown in between
            // still wakes this iteration.
            let notified = self.shutdown.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_stopped() {
                info!("reconnect sync shutting down");
                return;
            }

            tokio::select! {
                _ = &mut notified => {
                    info!("reconnect sync shutting down");
                    return;
                }
                changed = status.changed() => {
                    if changed.is_err() {
                        info!("connectivity monitor dropped, reconnect sync stopping");
                        return;
                    }
                    let now = *status.borrow_and_update();
                    debug!(from = %last, to = %now, "connectivity changed");
                    if now == Connectivity::Online {
                        let reason = if last == Connectivity::Offline {
                            "reconnect"
                        } else {
                            "reconnect after flap"
                        };
                        self.trigger(&mut deliver, reason).await;
                    }
                    last = now;
                }
            }
        }
    }

    async fn trigger<F, Fut, E>(&self, deliver: &mut F, reason: &'static str)
    where
        F: FnMut(WorkflowStep) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
        E: std::fmt::Display,
    {
        match self.coordinator.sync(&mut *deliver).await {
            Ok(outcome) => info!(reason, ?outcome, "triggered sync finished"),
            Err(e) => error!(reason, "triggered sync failed: {e}"),
        }
    }
}
