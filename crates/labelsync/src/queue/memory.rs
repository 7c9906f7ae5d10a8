//! In-process FIFO queue.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{QueueError, QueueResult, QueuedTask, TaskQueue};
use crate::task::{Task, TaskDecodeError};

#[derive(Debug, Default)]
struct Inner {
    pending: VecDeque<QueuedTask>,
    in_flight: HashMap<String, QueuedTask>,
}

#[derive(Debug, Default)]
pub struct MemoryQueue {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

impl MemoryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a raw payload without encoding a [`Task`].
    pub async fn push_raw(&self, payload: impl Into<String>) -> String {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        self.inner.lock().await.pending.push_back(QueuedTask {
            id: id.clone(),
            payload: payload.into(),
        });
        id
    }

    pub async fn pending_len(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    pub async fn in_flight_len(&self) -> usize {
        self.inner.lock().await.in_flight.len()
    }

    /// Decode every pending task, oldest first.
    pub async fn pending_tasks(&self) -> Result<Vec<Task>, TaskDecodeError> {
        self.inner
            .lock()
            .await
            .pending
            .iter()
            .map(|queued| Task::decode(&queued.payload))
            .collect()
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn push(&self, task: &Task) -> QueueResult<String> {
        let payload = task.encode()?;
        let id = self.push_raw(payload).await;
        debug!(%id, kind = task.kind.name(), "Enqueued task");
        Ok(id)
    }

    async fn pull(&self) -> QueueResult<Option<QueuedTask>> {
        let mut inner = self.inner.lock().await;
        let Some(task) = inner.pending.pop_front() else {
            return Ok(None);
        };
        inner.in_flight.insert(task.id.clone(), task.clone());
        Ok(Some(task))
    }

    async fn ack(&self, id: &str) -> QueueResult<()> {
        self.inner
            .lock()
            .await
            .in_flight
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| QueueError::UnknownTask(id.to_string()))
    }
}
