//! Dispatcher errors

use crate::dispatch_queue::QueueClosed;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("No worker registered for type `{0}`")]
    NoWorker(String),
    #[error("Dispatcher is closed")]
    Closed,
    #[error("Shutdown interrupted before all dispatch loops finished")]
    ShutdownInterrupted,
}

impl From<QueueClosed> for QueueError {
    fn from(_: QueueClosed) -> Self {
        Self::Closed
    }
}
