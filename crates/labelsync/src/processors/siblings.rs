use std::ops::ControlFlow;

use tracing::{debug, info, instrument};

use super::{require_access, resolve_repo_config, ProcessorResult, TaskContext, TaskOutcome};

/// Co-apply the configured siblings of `label` to an issue it was just added to.
#[instrument(skip(ctx), fields(org = %ctx.installation.org))]
pub async fn add_siblings(
    ctx: &TaskContext,
    repo: &str,
    issue_number: u64,
    label: &str,
) -> ProcessorResult<TaskOutcome> {
    let repo_config = match resolve_repo_config(ctx, repo).await? {
        ControlFlow::Continue(repo_config) => repo_config,
        ControlFlow::Break(outcome) => return Ok(outcome),
    };

    let siblings = repo_config
        .label(label)
        .map(|config| config.siblings.clone())
        .unwrap_or_default();
    if siblings.is_empty() {
        debug!("Label has no siblings");
        return Ok(TaskOutcome::NoSiblings);
    }

    if let ControlFlow::Break(outcome) = require_access(ctx, &[repo.to_string()]).await? {
        return Ok(outcome);
    }

    ctx.store
        .add_labels_to_issue(&ctx.repo(repo), issue_number, &siblings)
        .await?;
    info!(?siblings, "Added sibling labels");

    Ok(TaskOutcome::SiblingsAdded { labels: siblings })
}
