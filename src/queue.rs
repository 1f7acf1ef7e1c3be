//! Durable queue of pending workflow steps.
//!
//! The whole queue is one JSON array stored under [`QUEUE_KEY`]. Every
//! mutation is a read-modify-write of that array, linearized by an
//! in-process writer lock so overlapping appends cannot drop each other's
//! steps. Reads take no lock: a backend `set` replaces the document
//! atomically.

use std::time::Instant;

use opentelemetry::KeyValue;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::model::{QUEUE_KEY, WorkflowStep};
use crate::store::KvStore;
use crate::telemetry::metrics;

/// Ordered, persisted queue of workflow steps awaiting delivery.
pub struct DurableQueue<S> {
    store: S,
    key: String,
    writer: Mutex<()>,
}

impl<S: KvStore> DurableQueue<S> {
    /// Queue stored under the well-known [`QUEUE_KEY`].
    pub fn new(store: S) -> Self {
        Self::with_key(store, QUEUE_KEY)
    }

    /// Queue stored under a custom key.
    pub fn with_key(store: S, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            writer: Mutex::new(()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Stamp `payload` with the current time and push it onto the end of
    /// the queue. Returns the step as stored.
    ///
    /// A missing record is treated as an empty queue. Storage failures are
    /// returned to the caller; nothing is retried here.
    pub async fn append(&self, payload: Map<String, Value>) -> Result<WorkflowStep> {
        let start = Instant::now();
        let _writer = self.writer.lock().await;

        let mut steps = self.read().await?;

        // Wall clocks can step backwards; keep timestamps non-decreasing.
        let now = chrono::Utc::now().timestamp_millis();
        let timestamp = steps.last().map_or(now, |last| now.max(last.timestamp));

        let step = WorkflowStep::stamped(payload, timestamp);
        steps.push(step.clone());
        self.write(&steps).await?;

        debug!(key = %self.key, pending = steps.len(), timestamp, "step appended");
        metrics::steps_appended().add(1, &[]);
        record_operation("append", start);
        Ok(step)
    }

    /// The current queue, oldest first. Empty if nothing is stored.
    pub async fn list(&self) -> Result<Vec<WorkflowStep>> {
        let start = Instant::now();
        let steps = self.read().await?;
        record_operation("list", start);
        Ok(steps)
    }

    /// Number of pending steps.
    pub async fn len(&self) -> Result<usize> {
        Ok(self.read().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Delete the stored record. Clearing an empty queue is a no-op.
    pub async fn clear(&self) -> Result<()> {
        let start = Instant::now();
        let _writer = self.writer.lock().await;
        self.store.del(&self.key).await?;
        debug!(key = %self.key, "queue cleared");
        record_operation("clear", start);
        Ok(())
    }

    /// Remove `delivered` from the front of the queue.
    ///
    /// Only the leading steps that still equal `delivered` are removed, so
    /// steps appended after the caller's snapshot survive. When nothing
    /// would remain the record is deleted outright. Returns the number of
    /// steps removed.
    pub(crate) async fn remove_delivered(&self, delivered: &[WorkflowStep]) -> Result<usize> {
        if delivered.is_empty() {
            return Ok(0);
        }

        let start = Instant::now();
        let _writer = self.writer.lock().await;

        let steps = self.read().await?;
        let matched = steps
            .iter()
            .zip(delivered)
            .take_while(|(current, done)| current == done)
            .count();

        if matched == 0 {
            debug!(key = %self.key, "delivered prefix no longer at queue head");
        } else if matched == steps.len() {
            self.store.del(&self.key).await?;
        } else {
            self.write(&steps[matched..]).await?;
        }

        debug!(
            key = %self.key,
            removed = matched,
            remaining = steps.len() - matched,
            "delivered steps removed"
        );
        record_operation("remove_delivered", start);
        Ok(matched)
    }

    async fn read(&self) -> Result<Vec<WorkflowStep>> {
        match self.store.get(&self.key).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    async fn write(&self, steps: &[WorkflowStep]) -> Result<()> {
        let raw = serde_json::to_string(steps)?;
        self.store.set(&self.key, raw).await
    }
}

fn record_operation(operation: &'static str, start: Instant) {
    let attrs = [KeyValue::new("operation", operation)];
    metrics::queue_operations().add(1, &attrs);
    metrics::operation_duration_ms().record(start.elapsed().as_secs_f64() * 1000.0, &attrs);
}
