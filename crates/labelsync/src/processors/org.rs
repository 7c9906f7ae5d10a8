use tracing::{info, instrument, warn};

use super::{
    configuration_error_body, load_configuration, sync_targets, LoadedConfig, ProcessorResult,
    TaskContext, TaskOutcome, ACCESS_ISSUE_TITLE, CONFIG_ERROR_ISSUE_TITLE,
};
use crate::access::{check_access, missing_access_body, AccessReport};
use crate::task::{Task, TaskKind};

/// Validate the organization's configuration and access, then queue one
/// `sync_repo` task per target repository.
///
/// Broken configuration or missing access is reported as an issue on the
/// configuration repository and nothing is queued.
#[instrument(skip(ctx), fields(org = %ctx.installation.org, paid = ctx.installation.is_paid_plan))]
pub async fn sync_org(ctx: &TaskContext) -> ProcessorResult<TaskOutcome> {
    let store = ctx.store.as_ref();
    let config_repo = ctx.config_repo();

    let config = match load_configuration(store, &ctx.installation.org, None).await? {
        LoadedConfig::Missing => return Ok(TaskOutcome::ConfigurationMissing),
        LoadedConfig::Invalid(e) => {
            let issue = store
                .open_or_update_issue(&config_repo, CONFIG_ERROR_ISSUE_TITLE, &configuration_error_body(&e))
                .await?;
            warn!(issue, "Reported configuration error");
            return Ok(TaskOutcome::ConfigurationInvalid {
                reason: e.to_string(),
            });
        }
        LoadedConfig::Valid(config) => config,
    };

    let required: Vec<String> = config.explicit_repos().map(str::to_string).collect();
    let accessible = match check_access(store, &ctx.installation.org, &required).await? {
        AccessReport::Sufficient { accessible } => accessible,
        AccessReport::Insufficient { missing, .. } => {
            let issue = store
                .open_or_update_issue(&config_repo, ACCESS_ISSUE_TITLE, &missing_access_body(&missing))
                .await?;
            warn!(issue, ?missing, "Reported missing repository access");
            return Ok(TaskOutcome::AccessInsufficient { missing });
        }
    };

    let targets = sync_targets(ctx, &config, &accessible);
    for repo in &targets {
        ctx.queue
            .push(&Task::new(
                &ctx.installation,
                TaskKind::SyncRepo { repo: repo.clone() },
            ))
            .await?;
    }
    info!(repos = targets.len(), "Queued repository syncs");

    Ok(TaskOutcome::OrgFannedOut { repos: targets })
}
