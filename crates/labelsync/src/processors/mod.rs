//! # Task Processors
//!
//! One handler per [`TaskKind`]. [`dispatch`] is the only router and matches
//! exhaustively, so adding a kind without a handler does not compile.
//!
//! Every handler recomputes its work from live state, which makes replaying a
//! task after a crash or a duplicate delivery safe.

pub mod dryrun;
pub mod onboard;
pub mod org;
pub mod repository;
pub mod siblings;
pub mod unconfigured;

use std::fmt::Write as _;
use std::ops::ControlFlow;
use std::sync::Arc;

use labelsync_config::{config_repository, ConfigError, Configuration, RepoConfig, CONFIG_FILE};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::access::{check_access, AccessReport};
use crate::queue::{QueueError, TaskQueue};
use crate::report::SyncReport;
use crate::store::{LabelStore, StoreError};
use crate::task::TaskKind;
use crate::types::{Installation, RepoRef};

/// Title of the issue opened on the configuration repository when `labelsync.yml` is broken.
pub const CONFIG_ERROR_ISSUE_TITLE: &str = "Configuration error";

/// Title of the issue opened on the configuration repository when access is missing.
pub const ACCESS_ISSUE_TITLE: &str = "Insufficient repository access";

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Label store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type ProcessorResult<T> = Result<T, ProcessorError>;

/// Everything a processor may touch while handling one task.
#[derive(Clone)]
pub struct TaskContext {
    pub installation: Installation,
    pub store: Arc<dyn LabelStore>,
    pub queue: Arc<dyn TaskQueue>,
}

impl TaskContext {
    /// `name` inside the installation's organization.
    #[must_use]
    pub fn repo(&self, name: &str) -> RepoRef {
        RepoRef::new(self.installation.org.clone(), name)
    }

    /// The organization's configuration repository.
    #[must_use]
    pub fn config_repo(&self) -> RepoRef {
        self.repo(&config_repository(&self.installation.org))
    }
}

/// How a task ended. Failures of the store or queue surface as [`ProcessorError`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    RepoSynced(SyncReport),
    OrgFannedOut { repos: Vec<String> },
    AccessInsufficient { missing: Vec<String> },
    ConfigurationMissing,
    ConfigurationInvalid { reason: String },
    RepoNotConfigured { repo: String },
    DryRunReported { repos: Vec<String> },
    /// The configuration repository already existed; an organization sync was queued.
    SyncRequested,
    Onboarded { repos: Vec<String> },
    SiblingsAdded { labels: Vec<String> },
    NoSiblings,
    LabelRemoved { label: String },
    LabelUnconfigured { label: String },
    LabelConfigured { label: String },
}

/// Route a task to its handler.
#[instrument(
    skip(ctx, kind),
    fields(
        org = %ctx.installation.org,
        installation_id = ctx.installation.id,
        task_kind = kind.name()
    )
)]
pub async fn dispatch(ctx: &TaskContext, kind: &TaskKind) -> ProcessorResult<TaskOutcome> {
    match kind {
        TaskKind::SyncOrg => org::sync_org(ctx).await,
        TaskKind::SyncRepo { repo } => repository::sync_repo(ctx, repo).await,
        TaskKind::DryrunConfig { pr_number } => dryrun::dryrun_config(ctx, *pr_number).await,
        TaskKind::OnboardOrg => onboard::onboard_org(ctx).await,
        TaskKind::AddSiblings {
            repo,
            issue_number,
            label,
        } => siblings::add_siblings(ctx, repo, *issue_number, label).await,
        TaskKind::CheckUnconfiguredLabels { repo, label } => {
            unconfigured::check_unconfigured_labels(ctx, repo, label).await
        }
    }
}

/// `labelsync.yml` as read from the configuration repository.
#[derive(Debug)]
pub enum LoadedConfig {
    Missing,
    Invalid(ConfigError),
    Valid(Configuration),
}

/// Read and decode `labelsync.yml` at `git_ref` (the default branch when `None`).
#[instrument(skip(store))]
pub async fn load_configuration(
    store: &dyn LabelStore,
    org: &str,
    git_ref: Option<&str>,
) -> ProcessorResult<LoadedConfig> {
    let repo = RepoRef::new(org, config_repository(org));
    let Some(source) = store.fetch_file(&repo, CONFIG_FILE, git_ref).await? else {
        info!(config_repo = %repo, "No configuration file found");
        return Ok(LoadedConfig::Missing);
    };

    Ok(match Configuration::from_yaml(&source) {
        Ok(config) => LoadedConfig::Valid(config),
        Err(e) => {
            warn!(config_repo = %repo, error = %e, "Configuration is invalid");
            LoadedConfig::Invalid(e)
        }
    })
}

/// Markdown explaining why a configuration was rejected.
#[must_use]
pub fn configuration_error_body(error: &ConfigError) -> String {
    let mut body = format!("LabelSync could not use `{CONFIG_FILE}`, so no repository was synced.\n\n");
    match error {
        ConfigError::Parse(e) => {
            let _ = writeln!(body, "```\n{e}\n```");
        }
        ConfigError::Invalid { problems } => {
            for problem in problems {
                let _ = writeln!(body, "- {problem}");
            }
        }
    }
    body
}

/// Load the configuration on the default branch and resolve the entry for `repo`.
///
/// Breaks with the outcome that ends the task when there is nothing to apply.
async fn resolve_repo_config(
    ctx: &TaskContext,
    repo: &str,
) -> ProcessorResult<ControlFlow<TaskOutcome, RepoConfig>> {
    let config = match load_configuration(ctx.store.as_ref(), &ctx.installation.org, None).await? {
        LoadedConfig::Missing => return Ok(ControlFlow::Break(TaskOutcome::ConfigurationMissing)),
        LoadedConfig::Invalid(e) => {
            return Ok(ControlFlow::Break(TaskOutcome::ConfigurationInvalid {
                reason: e.to_string(),
            }))
        }
        LoadedConfig::Valid(config) => config,
    };

    match config.repo(repo) {
        Some(repo_config) => Ok(ControlFlow::Continue(repo_config.clone())),
        None => {
            info!(repo, "Repository is not configured");
            Ok(ControlFlow::Break(TaskOutcome::RepoNotConfigured {
                repo: repo.to_string(),
            }))
        }
    }
}

/// Check access to `required`, breaking with [`TaskOutcome::AccessInsufficient`] when it is missing.
async fn require_access(
    ctx: &TaskContext,
    required: &[String],
) -> ProcessorResult<ControlFlow<TaskOutcome, Vec<String>>> {
    match check_access(ctx.store.as_ref(), &ctx.installation.org, required).await? {
        AccessReport::Sufficient { accessible } => Ok(ControlFlow::Continue(accessible)),
        AccessReport::Insufficient { missing, .. } => {
            Ok(ControlFlow::Break(TaskOutcome::AccessInsufficient { missing }))
        }
    }
}

/// Repositories a configuration applies to, given what the installation can reach.
///
/// The configuration repository only ever matches an explicit entry, never the wildcard.
fn sync_targets(ctx: &TaskContext, config: &Configuration, accessible: &[String]) -> Vec<String> {
    let config_repo = config_repository(&ctx.installation.org);
    let explicit: Vec<&str> = config.explicit_repos().collect();
    config
        .target_repos(accessible)
        .into_iter()
        .filter(|name| {
            !name.eq_ignore_ascii_case(&config_repo) || explicit.contains(&name.as_str())
        })
        .collect()
}
