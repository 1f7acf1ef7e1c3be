//! Sync coordinator: drains the durable queue against a delivery function.
//!
//! A run snapshots the queue, hands each step to the delivery function in
//! order, and waits for every outcome before moving on. The first failure
//! ends the run; the failure is logged and reported in [`SyncOutcome`] but
//! never returned as an error. Only storage failures are errors.

pub mod connectivity;

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tokio::sync::Mutex;
use tracing::{Instrument, Span, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::WorkflowStep;
use crate::queue::DurableQueue;
use crate::store::KvStore;
use crate::telemetry::metrics;
use crate::telemetry::sync::{record_delivery_failure, record_run_result, start_sync_span};

/// What to do with steps delivered earlier in a run that later halts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// Keep the whole snapshot queued. Steps delivered before the failure
    /// are delivered again on the next run.
    #[default]
    RetainAll,
    /// Remove the steps that were delivered before the failure.
    DropDelivered,
}

impl std::str::FromStr for SyncPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "retain-all" => Ok(Self::RetainAll),
            "drop-delivered" => Ok(Self::DropDelivered),
            _ => Err(Error::Config(format!(
                "unknown sync policy '{s}' (expected retain-all or drop-delivered)"
            ))),
        }
    }
}

impl std::fmt::Display for SyncPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncPolicy::RetainAll => "retain-all",
            SyncPolicy::DropDelivered => "drop-delivered",
        };
        write!(f, "{s}")
    }
}

/// Configuration for the sync coordinator.
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    pub policy: SyncPolicy,
    /// Upper bound on a single delivery. `None` waits indefinitely.
    pub delivery_timeout: Option<Duration>,
}

/// How a sync run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing was queued; the delivery function was not called.
    Empty,
    /// Every snapshot step was delivered and removed from the queue.
    Delivered { count: usize },
    /// A delivery failed and the run stopped there.
    Halted {
        /// Zero-based position of the failing step in the snapshot. Every
        /// step before it was delivered in this run.
        failed_at: usize,
        /// Steps still queued from this run's snapshot.
        retained: usize,
        error: String,
    },
}

impl SyncOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, SyncOutcome::Empty | SyncOutcome::Delivered { .. })
    }

    fn label(&self) -> &'static str {
        match self {
            SyncOutcome::Empty => "empty",
            SyncOutcome::Delivered { .. } => "delivered",
            SyncOutcome::Halted { .. } => "halted",
        }
    }
}

/// Drains a [`DurableQueue`] in FIFO order.
///
/// Runs on one coordinator are serialized: a second `sync` waits for the
/// first to finish and then takes a fresh snapshot.
pub struct SyncCoordinator<S> {
    queue: Arc<DurableQueue<S>>,
    config: SyncConfig,
    run_lock: Mutex<()>,
}

impl<S: KvStore> SyncCoordinator<S> {
    pub fn new(queue: Arc<DurableQueue<S>>, config: SyncConfig) -> Self {
        Self {
            queue,
            config,
            run_lock: Mutex::new(()),
        }
    }

    pub fn queue(&self) -> &Arc<DurableQueue<S>> {
        &self.queue
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Deliver every pending step, in order, through `deliver`.
    ///
    /// Returns `Err` only when the queue itself cannot be read or updated;
    /// in that case nothing is removed from storage.
    pub async fn sync<F, Fut, E>(&self, mut deliver: F) -> Result<SyncOutcome>
    where
        F: FnMut(WorkflowStep) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
        E: Display,
    {
        let _run = self.run_lock.lock().await;

        let snapshot = self.queue.list().await?;
        if snapshot.is_empty() {
            metrics::sync_runs().add(1, &[KeyValue::new("result", "empty")]);
            return Ok(SyncOutcome::Empty);
        }

        let run_id = Uuid::new_v4();
        let span = start_sync_span(&run_id, snapshot.len());
        let start = Instant::now();

        let outcome = self
            .drain(&mut deliver, &snapshot, &span)
            .instrument(span.clone())
            .await?;

        let delivered = match &outcome {
            SyncOutcome::Delivered { count } => *count,
            SyncOutcome::Halted { failed_at, .. } => *failed_at,
            SyncOutcome::Empty => 0,
        };
        record_run_result(&span, outcome.label(), delivered);
        metrics::sync_runs().add(1, &[KeyValue::new("result", outcome.label())]);
        metrics::operation_duration_ms().record(
            start.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("operation", "sync.run")],
        );

        Ok(outcome)
    }

    async fn drain<F, Fut, E>(
        &self,
        deliver: &mut F,
        snapshot: &[WorkflowStep],
        span: &Span,
    ) -> Result<SyncOutcome>
    where
        F: FnMut(WorkflowStep) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
        E: Display,
    {
        for (position, step) in snapshot.iter().enumerate() {
            let Err(error) = self.deliver_one(deliver, step.clone()).await else {
                continue;
            };

            record_delivery_failure(span, position, &error);
            warn!(
                position,
                pending = snapshot.len(),
                %error,
                "delivery failed, stopping sync run"
            );

            let removed = match self.config.policy {
                SyncPolicy::RetainAll => 0,
                SyncPolicy::DropDelivered => {
                    self.queue.remove_delivered(&snapshot[..position]).await?
                }
            };

            return Ok(SyncOutcome::Halted {
                failed_at: position,
                retained: snapshot.len() - removed,
                error,
            });
        }

        self.queue.remove_delivered(snapshot).await?;
        info!(count = snapshot.len(), "all pending steps delivered");
        Ok(SyncOutcome::Delivered {
            count: snapshot.len(),
        })
    }

    /// Run one delivery, applying the configured timeout.
    async fn deliver_one<F, Fut, E>(
        &self,
        deliver: &mut F,
        step: WorkflowStep,
    ) -> std::result::Result<(), String>
    where
        F: FnMut(WorkflowStep) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
        E: Display,
    {
        let attempt = deliver(step);
        let result = match self.config.delivery_timeout {
            Some(limit) => match tokio::time::timeout(limit, attempt).await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_) => {
                    metrics::steps_delivered().add(1, &[KeyValue::new("result", "timeout")]);
                    return Err(format!("delivery timed out after {}ms", limit.as_millis()));
                }
            },
            None => attempt.await.map_err(|e| e.to_string()),
        };

        let label = if result.is_ok() { "ok" } else { "failed" };
        metrics::steps_delivered().add(1, &[KeyValue::new("result", label)]);
        result
    }
}
