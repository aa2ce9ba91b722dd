//! # workq queue
//!
//! Persistent job dispatcher and worker-pool scheduler.
//!
//! Features:
//! - Pluggable [`JobStore`] (memory here, SQLite in `workq-persist`)
//! - Worker registry with random load distribution
//! - Bounded dispatch queue with backpressure, optionally multi-level
//! - Retry with configurable backoff and crash recovery
//! - Cancellation-driven graceful shutdown

pub mod config;
pub mod dispatch_queue;
pub mod dispatcher;
pub mod error;
pub mod job;
pub mod memory;
pub mod registry;
pub mod store;
pub mod worker;

pub use config::{BackoffStrategy, QueueConfig};
pub use dispatch_queue::{DispatchQueue, Notification};
pub use dispatcher::Dispatcher;
pub use error::QueueError;
pub use job::{Job, JobId, JobStatus, NewJob};
pub use memory::MemoryJobStore;
pub use registry::WorkerRegistry;
pub use store::{JobStore, StoreError};
pub use worker::{WorkError, Worker};
pub use tokio_util::sync::CancellationToken;
