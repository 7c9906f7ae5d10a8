//! # Task Queues
//!
//! FIFO queues of opaque task payloads with at-least-once delivery: a pulled
//! task stays owned by the consumer until it is acknowledged.

pub mod memory;
pub mod spool;

use async_trait::async_trait;
use thiserror::Error;

use crate::task::Task;

pub use memory::MemoryQueue;
pub use spool::SpoolQueue;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode task: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Unknown task id: {0}")]
    UnknownTask(String),
}

pub type QueueResult<T> = Result<T, QueueError>;

/// A payload handed to a consumer, identified for acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTask {
    pub id: String,
    pub payload: String,
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Append a task; returns its id.
    async fn push(&self, task: &Task) -> QueueResult<String>;

    /// Claim the oldest pending task, if any.
    async fn pull(&self) -> QueueResult<Option<QueuedTask>>;

    /// Drop a claimed task for good.
    async fn ack(&self, id: &str) -> QueueResult<()>;
}
