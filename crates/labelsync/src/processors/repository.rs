//! Repository sync: diff one repository and apply the result in phases.
//!
//! 1. Creates and updates run concurrently.
//! 2. Issues carrying an aliased label are re-tagged with its successor.
//! 3. Fully merged aliases are deleted, then unconfigured labels when the
//!    repository is strict.
//!
//! A failed call is logged and recorded in the [`SyncReport`]; the rest of the
//! batch still runs. The next sync recomputes whatever is left.

use std::collections::HashSet;
use std::ops::ControlFlow;

use futures::future::{join, join_all};
use tracing::{debug, info, instrument, warn};

use super::{require_access, resolve_repo_config, ProcessorResult, TaskContext, TaskOutcome};
use crate::diff::{diff, AliasedLabel, LabelDiff};
use crate::report::{Operation, SyncReport};
use crate::store::LabelStore;
use crate::types::RepoRef;

#[instrument(skip(ctx), fields(org = %ctx.installation.org))]
pub async fn sync_repo(ctx: &TaskContext, repo: &str) -> ProcessorResult<TaskOutcome> {
    let repo_config = match resolve_repo_config(ctx, repo).await? {
        ControlFlow::Continue(repo_config) => repo_config,
        ControlFlow::Break(outcome) => return Ok(outcome),
    };
    if let ControlFlow::Break(outcome) = require_access(ctx, &[repo.to_string()]).await? {
        return Ok(outcome);
    }

    let repo_ref = ctx.repo(repo);
    let current = ctx.store.list_labels(&repo_ref).await?;
    let label_diff = diff(&repo_config, &current);
    if label_diff.is_empty() {
        info!("Labels already in sync");
        return Ok(TaskOutcome::RepoSynced(SyncReport::new(repo_ref.to_string())));
    }

    let report = apply_diff(ctx.store.as_ref(), &repo_ref, &label_diff, repo_config.is_strict()).await;
    info!(
        created = report.created.len(),
        updated = report.updated.len(),
        aliased = report.aliased.len(),
        removed = report.removed.len(),
        unconfigured = report.unconfigured.len(),
        failures = report.failures.len(),
        "Repository synced"
    );
    Ok(TaskOutcome::RepoSynced(report))
}

/// Apply `diff` to `repo`. Never fails as a whole; per-call failures land in the report.
#[instrument(skip(store, repo, label_diff), fields(repo = %repo))]
pub async fn apply_diff(
    store: &dyn LabelStore,
    repo: &RepoRef,
    label_diff: &LabelDiff,
    strict: bool,
) -> SyncReport {
    let mut report = SyncReport::new(repo.to_string());
    // successor labels that do not exist remotely after phase one
    let mut unavailable: HashSet<&str> = HashSet::new();

    let creates = label_diff.added.iter().map(|label| async move {
        (label, store.create_label(repo, label).await)
    });
    let updates = label_diff.changed.iter().map(|change| async move {
        let target = change.target();
        (change, store.update_label(repo, &change.old_name, &target).await)
    });
    let (created, updated) = join(join_all(creates), join_all(updates)).await;

    for (label, result) in created {
        match result {
            Ok(()) => {
                debug!(label = %label.name, "Created label");
                report.created.push(label.clone());
            }
            Err(e) => {
                warn!(label = %label.name, error = %e, "Failed to create label");
                unavailable.insert(label.name.as_str());
                report.fail(Operation::Create, &label.name, &e);
            }
        }
    }
    for (change, result) in updated {
        match result {
            Ok(()) => {
                debug!(label = %change.name, old_name = %change.old_name, "Updated label");
                report.updated.push(change.clone());
            }
            Err(e) => {
                warn!(label = %change.name, old_name = %change.old_name, error = %e, "Failed to update label");
                if change.is_rename() {
                    unavailable.insert(change.name.as_str());
                }
                report.fail(Operation::Update, &change.old_name, &e);
            }
        }
    }

    let failed_merges = relabel_aliased_issues(store, repo, &label_diff.aliased, &unavailable, &mut report).await;

    let merged: Vec<&AliasedLabel> = label_diff
        .aliased
        .iter()
        .filter(|alias| !failed_merges.contains(alias.old_name.as_str()))
        .collect();
    for alias in merged {
        match store.delete_label(repo, &alias.old_name).await {
            Ok(()) => {
                debug!(label = %alias.old_name, into = %alias.name, "Merged alias");
                report.aliased.push(alias.clone());
            }
            Err(e) => {
                warn!(label = %alias.old_name, error = %e, "Failed to delete merged alias");
                report.fail(Operation::Delete, &alias.old_name, &e);
            }
        }
    }

    if strict {
        for label in &label_diff.removed {
            match store.delete_label(repo, &label.name).await {
                Ok(()) => {
                    debug!(label = %label.name, "Removed unconfigured label");
                    report.removed.push(label.clone());
                }
                Err(e) => {
                    warn!(label = %label.name, error = %e, "Failed to remove label");
                    report.fail(Operation::Delete, &label.name, &e);
                }
            }
        }
    } else if !label_diff.removed.is_empty() {
        info!(
            count = label_diff.removed.len(),
            "Leaving unconfigured labels in place"
        );
        report.unconfigured.clone_from(&label_diff.removed);
    }

    report
}

/// Add each alias successor to every issue carrying the alias.
///
/// Returns the alias names whose merge did not complete; those are not deleted.
async fn relabel_aliased_issues<'a>(
    store: &dyn LabelStore,
    repo: &RepoRef,
    aliased: &'a [AliasedLabel],
    unavailable: &HashSet<&str>,
    report: &mut SyncReport,
) -> HashSet<&'a str> {
    let mut failed: HashSet<&str> = HashSet::new();
    let mut pending: Vec<&AliasedLabel> = Vec::new();
    for alias in aliased {
        if unavailable.contains(alias.name.as_str()) {
            warn!(label = %alias.old_name, into = %alias.name, "Skipping merge, successor label is missing");
            failed.insert(alias.old_name.as_str());
            report.fail(
                Operation::Relabel,
                &alias.old_name,
                format!("successor label `{}` is missing", alias.name),
            );
        } else {
            pending.push(alias);
        }
    }
    if pending.is_empty() {
        return failed;
    }

    let issues = match store.list_issues(repo).await {
        Ok(issues) => issues,
        Err(e) => {
            warn!(error = %e, "Failed to list issues for alias merge");
            for alias in pending {
                failed.insert(alias.old_name.as_str());
                report.fail(Operation::ListIssues, &alias.old_name, &e);
            }
            return failed;
        }
    };
    debug!(issues = issues.len(), aliases = pending.len(), "Re-tagging aliased issues");

    for issue in &issues {
        let mut sources: Vec<&AliasedLabel> = Vec::new();
        let mut additions: Vec<String> = Vec::new();
        for &alias in &pending {
            if !issue.has_label(&alias.old_name) {
                continue;
            }
            sources.push(alias);
            if !issue.has_label(&alias.name) && !additions.contains(&alias.name) {
                additions.push(alias.name.clone());
            }
        }
        if additions.is_empty() {
            continue;
        }

        if let Err(e) = store.add_labels_to_issue(repo, issue.number, &additions).await {
            warn!(issue = issue.number, error = %e, "Failed to re-tag issue");
            for alias in sources {
                failed.insert(alias.old_name.as_str());
                report.fail(
                    Operation::Relabel,
                    &alias.old_name,
                    format!("issue #{}: {e}", issue.number),
                );
            }
        }
    }

    failed
}
