//! Preview of a configuration pull request, posted as a single PR comment.

use labelsync_config::CONFIG_FILE;
use tracing::{info, instrument, warn};

use super::{
    configuration_error_body, load_configuration, sync_targets, LoadedConfig, ProcessorResult,
    TaskContext, TaskOutcome,
};
use crate::access::{check_access, missing_access_body, AccessReport};
use crate::diff::diff;
use crate::report::{Operation, SyncReport};

/// Heading of every dry-run comment.
pub const DRYRUN_HEADING: &str = "## LabelSync dry run";

/// Diff every target repository against the configuration at the pull
/// request's head and comment the result. Nothing is mutated.
#[instrument(skip(ctx), fields(org = %ctx.installation.org))]
pub async fn dryrun_config(ctx: &TaskContext, pr_number: u64) -> ProcessorResult<TaskOutcome> {
    let store = ctx.store.as_ref();
    let config_repo = ctx.config_repo();
    let head = store.pull_request_head(&config_repo, pr_number).await?;

    let config = match load_configuration(store, &ctx.installation.org, Some(head.as_str())).await? {
        LoadedConfig::Missing => {
            let body = format!("{DRYRUN_HEADING}\n\nThis pull request has no `{CONFIG_FILE}`.\n");
            store.comment_on_issue(&config_repo, pr_number, &body).await?;
            return Ok(TaskOutcome::ConfigurationMissing);
        }
        LoadedConfig::Invalid(e) => {
            let body = format!("{DRYRUN_HEADING}\n\n{}", configuration_error_body(&e));
            store.comment_on_issue(&config_repo, pr_number, &body).await?;
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
            let body = format!("{DRYRUN_HEADING}\n\n{}", missing_access_body(&missing));
            store.comment_on_issue(&config_repo, pr_number, &body).await?;
            return Ok(TaskOutcome::AccessInsufficient { missing });
        }
    };

    let targets = sync_targets(ctx, &config, &accessible);
    let mut body = format!("{DRYRUN_HEADING}\n\nChanges `{CONFIG_FILE}` at `{head}` would make:\n\n");
    for name in &targets {
        let repo = ctx.repo(name);
        let Some(repo_config) = config.repo(name) else {
            continue;
        };
        let report = match store.list_labels(&repo).await {
            Ok(current) => SyncReport::planned(repo.to_string(), &diff(repo_config, &current), repo_config.is_strict()),
            Err(e) => {
                warn!(repo = %repo, error = %e, "Failed to read labels for dry run");
                let mut report = SyncReport::new(repo.to_string());
                report.fail(Operation::ListLabels, "*", &e);
                report
            }
        };
        body.push_str(&report.to_markdown());
        body.push('\n');
    }

    store.comment_on_issue(&config_repo, pr_number, &body).await?;
    info!(pr_number, repos = targets.len(), "Posted dry run");
    Ok(TaskOutcome::DryRunReported { repos: targets })
}
