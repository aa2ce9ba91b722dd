//! # workq persistence
//!
//! Durable [`JobStore`](workq_queue::JobStore) implementations.
//!
//! Supports:
//! - SQLite (single node, file or in-memory)

pub mod job_store;
pub mod sqlite;

pub use job_store::SqliteJobStore;
pub use sqlite::{SqliteConfig, SqliteDatabase};
