//! # Task Worker
//!
//! A single sequential consumer: pull one task, resolve the installation's
//! credential, dispatch, acknowledge, repeat. Scaling out means running more
//! workers against the same durable queue.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::credentials::Credentials;
use crate::processors::{dispatch, TaskContext, TaskOutcome};
use crate::queue::{QueueError, TaskQueue};
use crate::store::StoreFactory;
use crate::task::{Task, TaskDecodeError};

/// Default delay between polls of an empty queue.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// The producer speaks a task format this build does not know.
    #[error("Task {id} cannot be decoded, producer and worker versions disagree: {source}")]
    Decode {
        id: String,
        #[source]
        source: TaskDecodeError,
    },
}

/// Result of one pass of the worker loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The queue was empty.
    Idle,
    Completed(TaskOutcome),
    /// The task failed and was acknowledged anyway; the next event retries from live state.
    Failed(String),
}

pub struct Worker {
    queue: Arc<dyn TaskQueue>,
    credentials: Credentials,
    stores: Arc<dyn StoreFactory>,
    poll_interval: Duration,
}

impl Worker {
    #[must_use]
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        credentials: Credentials,
        stores: Arc<dyn StoreFactory>,
    ) -> Self {
        Self {
            queue,
            credentials,
            stores,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Pull and handle at most one task.
    ///
    /// An undecodable payload is fatal and stays unacknowledged so a worker
    /// that understands it can pick it up.
    pub async fn run_once(&self) -> Result<Step, WorkerError> {
        let Some(queued) = self.queue.pull().await? else {
            return Ok(Step::Idle);
        };
        let task = Task::decode(&queued.payload).map_err(|source| WorkerError::Decode {
            id: queued.id.clone(),
            source,
        })?;

        let step = self.handle(&task).await;
        self.queue.ack(&queued.id).await?;
        Ok(step)
    }

    #[instrument(
        skip(self, task),
        fields(
            org = %task.org,
            installation_id = task.installation_id,
            task_kind = task.kind.name()
        )
    )]
    async fn handle(&self, task: &Task) -> Step {
        let credential = match self.credentials.token_for(task.installation_id).await {
            Ok(credential) => credential,
            Err(e) => {
                error!(error = %e, "Failed to obtain installation token");
                return Step::Failed(e.to_string());
            }
        };

        let ctx = TaskContext {
            installation: task.installation(),
            store: self.stores.for_token(&credential.token),
            queue: Arc::clone(&self.queue),
        };
        match dispatch(&ctx, &task.kind).await {
            Ok(outcome) => {
                debug!(?outcome, "Task completed");
                Step::Completed(outcome)
            }
            Err(e) => {
                error!(error = %e, "Task failed");
                Step::Failed(e.to_string())
            }
        }
    }

    /// Consume tasks until `cancel` fires. A task already pulled always runs to completion.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), WorkerError> {
        info!(poll_interval = ?self.poll_interval, "Worker started");
        while !cancel.is_cancelled() {
            if self.run_once().await? == Step::Idle {
                tokio::select! {
                    () = cancel.cancelled() => {}
                    () = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }
        info!("Worker stopped");
        Ok(())
    }
}
