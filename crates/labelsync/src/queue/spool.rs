//! Durable directory spool.
//!
//! Each pending task is one `<id>.json` file. Ids start with the enqueue time
//! in milliseconds, so sorting names gives FIFO order. Pulling renames the
//! file to `<id>.<pid>.proc`, which is atomic and lets several workers share
//! one spool; acknowledging deletes it.
//!
//! A claim is stale once its owning process has exited or it has been held
//! longer than the lease. Opening a spool returns stale claims to pending and
//! leaves live ones alone.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info, warn};

use super::{QueueResult, QueuedTask, TaskQueue};
use crate::task::Task;

const PENDING_EXT: &str = "json";
const CLAIMED_EXT: &str = "proc";
const PARTIAL_EXT: &str = "tmp";

/// How long a claim may be held before another worker may take it back.
pub const DEFAULT_CLAIM_LEASE: Duration = Duration::from_secs(60 * 60);

#[derive(Debug)]
pub struct SpoolQueue {
    dir: PathBuf,
    owner: u32,
    lease: Duration,
    seq: AtomicU64,
}

impl SpoolQueue {
    /// Open (creating if needed) the spool at `dir` with [`DEFAULT_CLAIM_LEASE`].
    pub async fn open(dir: impl Into<PathBuf>) -> QueueResult<Self> {
        Self::open_with_lease(dir, DEFAULT_CLAIM_LEASE).await
    }

    /// Open (creating if needed) the spool at `dir` and requeue stale claims.
    pub async fn open_with_lease(dir: impl Into<PathBuf>, lease: Duration) -> QueueResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;

        let queue = Self {
            dir,
            owner: std::process::id(),
            lease,
            seq: AtomicU64::new(0),
        };
        let recovered = queue.recover_stale_claims().await?;
        if recovered > 0 {
            warn!(recovered, dir = %queue.dir.display(), "Requeued tasks abandoned by another consumer");
        }
        info!(dir = %queue.dir.display(), lease = ?queue.lease, "Opened task spool");
        Ok(queue)
    }

    async fn recover_stale_claims(&self) -> QueueResult<usize> {
        let mut recovered = 0usize;
        for stem in Self::stems_with_ext(&self.dir, CLAIMED_EXT).await? {
            let Some((id, owner)) = stem.split_once('.') else {
                continue;
            };
            let claimed = Self::path(&self.dir, &stem, CLAIMED_EXT);
            if !self.is_stale(&claimed, owner).await? {
                debug!(%id, owner, "Leaving live claim in place");
                continue;
            }
            match fs::rename(&claimed, Self::path(&self.dir, id, PENDING_EXT)).await {
                Ok(()) => recovered += 1,
                // acked or recovered by someone else meanwhile
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(recovered)
    }

    async fn is_stale(&self, claimed: &Path, owner: &str) -> QueueResult<bool> {
        if !owner_is_running(owner).await {
            return Ok(true);
        }
        let modified = match fs::metadata(claimed).await {
            Ok(metadata) => metadata.modified()?,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        // a modification time in the future counts as fresh
        Ok(modified.elapsed().is_ok_and(|held| held >= self.lease))
    }

    fn path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
        dir.join(format!("{stem}.{ext}"))
    }

    fn claim_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{}.{CLAIMED_EXT}", self.owner))
    }

    /// Sorted file stems in `dir` carrying extension `ext`.
    async fn stems_with_ext(dir: &Path, ext: &str) -> QueueResult<Vec<String>> {
        let mut stems = Vec::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ext) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stems.push(stem.to_string());
            }
        }
        stems.sort();
        Ok(stems)
    }

    fn next_id(&self) -> String {
        let millis = chrono::Utc::now().timestamp_millis();
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        format!("{millis:013}-{seq:08}-{}", self.owner)
    }

    /// Number of tasks waiting to be pulled.
    pub async fn pending_len(&self) -> QueueResult<usize> {
        Ok(Self::stems_with_ext(&self.dir, PENDING_EXT).await?.len())
    }

    /// Number of tasks claimed by any consumer of this spool.
    pub async fn claimed_len(&self) -> QueueResult<usize> {
        Ok(Self::stems_with_ext(&self.dir, CLAIMED_EXT).await?.len())
    }
}

/// Whether the process that wrote a claim still runs. Only Linux can tell;
/// elsewhere the lease alone decides.
#[cfg(target_os = "linux")]
async fn owner_is_running(owner: &str) -> bool {
    match owner.parse::<u32>() {
        Ok(pid) => fs::metadata(format!("/proc/{pid}")).await.is_ok(),
        Err(_) => false,
    }
}

#[cfg(not(target_os = "linux"))]
async fn owner_is_running(_owner: &str) -> bool {
    true
}

#[async_trait]
impl TaskQueue for SpoolQueue {
    async fn push(&self, task: &Task) -> QueueResult<String> {
        let payload = task.encode()?;
        let id = self.next_id();
        let partial = Self::path(&self.dir, &id, PARTIAL_EXT);
        fs::write(&partial, payload).await?;
        fs::rename(&partial, Self::path(&self.dir, &id, PENDING_EXT)).await?;
        debug!(%id, kind = task.kind.name(), "Spooled task");
        Ok(id)
    }

    async fn pull(&self) -> QueueResult<Option<QueuedTask>> {
        for id in Self::stems_with_ext(&self.dir, PENDING_EXT).await? {
            let claimed = self.claim_path(&id);
            match fs::rename(Self::path(&self.dir, &id, PENDING_EXT), &claimed).await {
                Ok(()) => {
                    let payload = fs::read_to_string(&claimed).await?;
                    return Ok(Some(QueuedTask { id, payload }));
                }
                // another worker claimed it first
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    /// A claim that is already gone was recovered after its lease ran out;
    /// whoever holds it now finishes the task.
    async fn ack(&self, id: &str) -> QueueResult<()> {
        match fs::remove_file(self.claim_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(%id, "Claim already released, nothing to acknowledge");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskKind;
    use crate::types::Installation;

    fn task(kind: TaskKind) -> Task {
        let installation = Installation {
            id: 5,
            org: "acme".to_string(),
            is_paid_plan: true,
        };
        Task::new(&installation, kind)
    }

    #[tokio::test]
    async fn test_push_pull_ack_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let queue = SpoolQueue::open(dir.path()).await.unwrap();

        queue.push(&task(TaskKind::SyncOrg)).await.unwrap();
        queue.push(&task(TaskKind::OnboardOrg)).await.unwrap();
        assert_eq!(queue.pending_len().await.unwrap(), 2);

        let first = queue.pull().await.unwrap().unwrap();
        assert_eq!(Task::decode(&first.payload).unwrap().kind, TaskKind::SyncOrg);
        queue.ack(&first.id).await.unwrap();

        let second = queue.pull().await.unwrap().unwrap();
        assert_eq!(Task::decode(&second.payload).unwrap().kind, TaskKind::OnboardOrg);
        queue.ack(&second.id).await.unwrap();

        assert!(queue.pull().await.unwrap().is_none());
        assert_eq!(queue.claimed_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_second_consumer_leaves_live_claims_alone() {
        let dir = tempfile::tempdir().unwrap();
        let first = SpoolQueue::open(dir.path()).await.unwrap();
        first.push(&task(TaskKind::SyncOrg)).await.unwrap();
        let claimed = first.pull().await.unwrap().unwrap();

        let second = SpoolQueue::open(dir.path()).await.unwrap();

        assert!(second.pull().await.unwrap().is_none());
        assert_eq!(second.claimed_len().await.unwrap(), 1);
        first.ack(&claimed.id).await.unwrap();
        assert_eq!(second.claimed_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expired_claim_is_requeued_on_open() {
        let dir = tempfile::tempdir().unwrap();
        {
            let queue = SpoolQueue::open(dir.path()).await.unwrap();
            queue.push(&task(TaskKind::SyncOrg)).await.unwrap();
            let claimed = queue.pull().await.unwrap();
            assert!(claimed.is_some());
            assert!(queue.pull().await.unwrap().is_none());
        }

        let reopened = SpoolQueue::open_with_lease(dir.path(), Duration::ZERO)
            .await
            .unwrap();
        let again = reopened.pull().await.unwrap().unwrap();
        assert_eq!(Task::decode(&again.payload).unwrap().kind, TaskKind::SyncOrg);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_claim_of_exited_process_is_requeued() {
        let dir = tempfile::tempdir().unwrap();
        let queue = SpoolQueue::open(dir.path()).await.unwrap();
        let id = queue.push(&task(TaskKind::OnboardOrg)).await.unwrap();
        // a claim whose owner tag names no process
        fs::rename(
            dir.path().join(format!("{id}.json")),
            dir.path().join(format!("{id}.gone.proc")),
        )
        .await
        .unwrap();

        let reopened = SpoolQueue::open(dir.path()).await.unwrap();

        assert_eq!(reopened.pending_len().await.unwrap(), 1);
        assert_eq!(reopened.claimed_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ack_after_claim_was_taken_back_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let first = SpoolQueue::open(dir.path()).await.unwrap();
        first.push(&task(TaskKind::SyncOrg)).await.unwrap();
        let stale = first.pull().await.unwrap().unwrap();

        let second = SpoolQueue::open_with_lease(dir.path(), Duration::ZERO)
            .await
            .unwrap();
        let retaken = second.pull().await.unwrap().unwrap();
        assert_eq!(retaken.id, stale.id);

        second.ack(&retaken.id).await.unwrap();
        first.ack(&stale.id).await.unwrap();
        assert_eq!(second.claimed_len().await.unwrap(), 0);
    }
}
