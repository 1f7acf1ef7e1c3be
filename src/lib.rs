//! # stepsync
//!
//! Client-side offline write queue for workflow steps.
//!
//! Steps recorded while the device is offline are appended to a durable
//! queue (SQLite via sqlx, or in-memory) and replayed in FIFO order against a
//! caller-supplied delivery function once connectivity returns.

pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod queue;
pub mod store;
pub mod sync;
pub mod telemetry;

pub use model::{QUEUE_KEY, WorkflowStep};
pub use queue::DurableQueue;
pub use sync::connectivity::{Connectivity, ConnectivityMonitor, ReconnectSync};
pub use sync::{SyncConfig, SyncCoordinator, SyncOutcome, SyncPolicy};
