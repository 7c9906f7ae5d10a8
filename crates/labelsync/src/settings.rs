//! Worker settings: command-line flags with environment fallbacks.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::store::github::DEFAULT_API_URL;

/// Where the durable task spool lives.
#[derive(Debug, Clone, Args)]
pub struct QueueSettings {
    /// Directory of the task spool
    #[arg(long, env = "LABELSYNC_SPOOL_DIR", default_value = "/var/lib/labelsync/spool")]
    pub spool_dir: PathBuf,

    /// Seconds a claimed task may stay unacknowledged before another worker takes it back
    #[arg(long, env = "LABELSYNC_CLAIM_LEASE_SECS", default_value_t = 3600)]
    pub claim_lease_secs: u64,
}

impl QueueSettings {
    #[must_use]
    pub fn claim_lease(&self) -> Duration {
        Duration::from_secs(self.claim_lease_secs)
    }
}

/// Everything `labelsync-worker run` needs.
#[derive(Debug, Clone, Args)]
pub struct WorkerSettings {
    #[command(flatten)]
    pub queue: QueueSettings,

    /// GitHub App id
    #[arg(long, env = "GITHUB_APP_ID")]
    pub app_id: u64,

    /// PEM file holding the GitHub App private key
    #[arg(long, env = "GITHUB_PRIVATE_KEY_PATH")]
    pub private_key_path: PathBuf,

    /// GitHub REST API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Delay between polls of an empty queue, in milliseconds
    #[arg(long, env = "LABELSYNC_POLL_INTERVAL_MS", default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// Refresh installation tokens this many seconds before they expire
    #[arg(long, env = "LABELSYNC_TOKEN_REFRESH_MARGIN_SECS", default_value_t = 300)]
    pub token_refresh_margin_secs: i64,
}

impl WorkerSettings {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn token_refresh_margin(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_refresh_margin_secs)
    }
}
