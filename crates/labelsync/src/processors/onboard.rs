use labelsync_config::{Configuration, LabelConfig, RepoConfig, CONFIG_FILE};
use tracing::{info, instrument, warn};

use super::{ProcessorResult, TaskContext, TaskOutcome};
use crate::access::accessible_repositories;
use crate::task::{Task, TaskKind};

const CONFIG_REPO_DESCRIPTION: &str = "Label configuration managed by LabelSync";
const INITIAL_COMMIT_MESSAGE: &str = "Initialize LabelSync configuration";

/// Create the configuration repository for a new installation, seeded with
/// the labels every accessible repository carries today. A configuration
/// repository that already holds `labelsync.yml` gets an organization sync
/// instead; one without it is seeded in place.
#[instrument(skip(ctx), fields(org = %ctx.installation.org, paid = ctx.installation.is_paid_plan))]
pub async fn onboard_org(ctx: &TaskContext) -> ProcessorResult<TaskOutcome> {
    let store = ctx.store.as_ref();
    let config_repo = ctx.config_repo();

    let repo_exists = store.repository_exists(&config_repo).await?;
    if repo_exists && store.fetch_file(&config_repo, CONFIG_FILE, None).await?.is_some() {
        info!(config_repo = %config_repo, "Configuration repository exists, queueing sync");
        ctx.queue
            .push(&Task::new(&ctx.installation, TaskKind::SyncOrg))
            .await?;
        return Ok(TaskOutcome::SyncRequested);
    }

    let mut repos = accessible_repositories(store, &ctx.installation.org).await?;
    repos.retain(|name| !name.eq_ignore_ascii_case(&config_repo.name));
    repos.sort();

    let mut config = Configuration::default();
    for name in &repos {
        let mut repo_config = RepoConfig::default();
        for label in store.list_labels(&ctx.repo(name)).await? {
            let mut label_config = LabelConfig::new(label.color);
            label_config.description = label.description.filter(|d| !d.is_empty());
            repo_config.labels.insert(label.name, label_config);
        }
        config.repos.insert(name.clone(), repo_config);
    }
    let yaml = config.to_yaml()?;

    if repo_exists {
        warn!(config_repo = %config_repo, "Configuration repository has no configuration, seeding it");
    } else {
        store
            .create_repository(&config_repo, CONFIG_REPO_DESCRIPTION)
            .await?;
    }
    store
        .put_file(&config_repo, CONFIG_FILE, &yaml, INITIAL_COMMIT_MESSAGE)
        .await?;
    info!(config_repo = %config_repo, repos = repos.len(), "Onboarded organization");

    Ok(TaskOutcome::Onboarded { repos })
}
