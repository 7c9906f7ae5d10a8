//! LabelSync worker - consumes the task spool, or adds one task to it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use labelsync::credentials::{Credentials, GitHubAppTokenSource, MemoryCredentialCache};
use labelsync::queue::{SpoolQueue, TaskQueue};
use labelsync::settings::{QueueSettings, WorkerSettings};
use labelsync::store::GitHubStoreFactory;
use labelsync::{Task, Worker};

/// LabelSync worker - keeps repository labels in line with labelsync.yml.
#[derive(Parser)]
#[command(name = "labelsync-worker")]
#[command(about = "Reconciles repository labels from queued LabelSync tasks")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume tasks until SIGINT or SIGTERM
    Run(WorkerSettings),

    /// Push one task payload onto the spool
    Enqueue {
        #[command(flatten)]
        queue: QueueSettings,

        /// Task JSON, e.g. {"kind":"sync_org","ghInstallationId":1,"org":"acme"}
        payload: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Run(settings) => run_worker(settings).await,
        Commands::Enqueue { queue, payload } => enqueue(queue, &payload).await,
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose {
        "labelsync=debug,labelsync_worker=debug,info"
    } else {
        "labelsync=info,labelsync_worker=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

async fn run_worker(settings: WorkerSettings) -> Result<()> {
    info!(
        app_id = settings.app_id,
        api_url = %settings.api_url,
        spool_dir = %settings.queue.spool_dir.display(),
        "Starting LabelSync worker"
    );

    let private_key = tokio::fs::read(&settings.private_key_path)
        .await
        .with_context(|| {
            format!(
                "Failed to read GitHub App private key from {}",
                settings.private_key_path.display()
            )
        })?;
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;
    let token_source = GitHubAppTokenSource::new(
        http_client,
        settings.api_url.clone(),
        settings.app_id,
        &private_key,
    )
    .context("Invalid GitHub App private key")?;
    let credentials = Credentials::new(
        Arc::new(token_source),
        Arc::new(MemoryCredentialCache::default()),
        settings.token_refresh_margin(),
    );

    let stores = GitHubStoreFactory::new(settings.api_url.clone())
        .context("Failed to build GitHub client")?;
    let queue = SpoolQueue::open_with_lease(
        settings.queue.spool_dir.clone(),
        settings.queue.claim_lease(),
    )
        .await
        .context("Failed to open task spool")?;

    let worker = Worker::new(Arc::new(queue), credentials, Arc::new(stores))
        .with_poll_interval(settings.poll_interval());

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    worker
        .run(cancel)
        .await
        .context("Worker stopped on a fatal error")
}

async fn enqueue(queue: QueueSettings, payload: &str) -> Result<()> {
    let task = Task::decode(payload).context("Payload is not a valid task")?;
    let spool = SpoolQueue::open_with_lease(queue.spool_dir.clone(), queue.claim_lease())
        .await
        .context("Failed to open task spool")?;
    let id = spool.push(&task).await.context("Failed to enqueue task")?;

    info!(%id, task_kind = task.kind.name(), org = %task.org, "Enqueued task");
    Ok(())
}

/// Cancel `cancel` on SIGINT or SIGTERM.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("Shutdown requested, finishing the current task");
    cancel.cancel();
}
