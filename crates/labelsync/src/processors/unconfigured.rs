use std::ops::ControlFlow;

use tracing::{debug, info, instrument, warn};

use super::{require_access, resolve_repo_config, ProcessorResult, TaskContext, TaskOutcome};

/// React to `label` being created in `repo` outside the configuration.
///
/// Labels the configuration names, directly or as an alias that the next
/// sync merges, are left alone. Anything else is deleted from a strict
/// repository and reported otherwise.
#[instrument(skip(ctx), fields(org = %ctx.installation.org))]
pub async fn check_unconfigured_labels(
    ctx: &TaskContext,
    repo: &str,
    label: &str,
) -> ProcessorResult<TaskOutcome> {
    let repo_config = match resolve_repo_config(ctx, repo).await? {
        ControlFlow::Continue(repo_config) => repo_config,
        ControlFlow::Break(outcome) => return Ok(outcome),
    };

    let claimed = repo_config.labels.iter().any(|(name, config)| {
        name.eq_ignore_ascii_case(label)
            || config.alias.iter().any(|alias| alias.eq_ignore_ascii_case(label))
    });
    if claimed {
        debug!("Label is configured");
        return Ok(TaskOutcome::LabelConfigured {
            label: label.to_string(),
        });
    }

    if let ControlFlow::Break(outcome) = require_access(ctx, &[repo.to_string()]).await? {
        return Ok(outcome);
    }

    if repo_config.is_strict() {
        ctx.store.delete_label(&ctx.repo(repo), label).await?;
        info!("Removed unconfigured label");
        Ok(TaskOutcome::LabelRemoved {
            label: label.to_string(),
        })
    } else {
        warn!("Label is not configured; leaving it in place");
        Ok(TaskOutcome::LabelUnconfigured {
            label: label.to_string(),
        })
    }
}
