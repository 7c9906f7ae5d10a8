//! Structured result of a repository sync and its markdown rendering.

use std::fmt::{self, Write as _};

use serde::Serialize;

use crate::diff::{AliasedLabel, ChangedLabel, LabelDiff};
use crate::types::Label;

/// The remote call that failed during a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ListLabels,
    Create,
    Update,
    ListIssues,
    Relabel,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ListLabels => "list labels",
            Self::Create => "create",
            Self::Update => "update",
            Self::ListIssues => "list issues",
            Self::Relabel => "relabel",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationFailure {
    pub operation: Operation,
    pub label: String,
    pub error: String,
}

/// What a sync did (or, for a dry run, would do) to one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub repo: String,
    pub created: Vec<Label>,
    pub updated: Vec<ChangedLabel>,
    pub aliased: Vec<AliasedLabel>,
    pub removed: Vec<Label>,
    /// Labels left in place because the repository is not strict.
    pub unconfigured: Vec<Label>,
    pub failures: Vec<OperationFailure>,
}

impl SyncReport {
    #[must_use]
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            ..Self::default()
        }
    }

    /// The report applying `diff` would produce if every call succeeded.
    #[must_use]
    pub fn planned(repo: impl Into<String>, diff: &LabelDiff, strict: bool) -> Self {
        let mut report = Self::new(repo);
        report.created.clone_from(&diff.added);
        report.updated.clone_from(&diff.changed);
        report.aliased.clone_from(&diff.aliased);
        if strict {
            report.removed.clone_from(&diff.removed);
        } else {
            report.unconfigured.clone_from(&diff.removed);
        }
        report
    }

    pub(crate) fn fail(&mut self, operation: Operation, label: &str, error: impl ToString) {
        self.failures.push(OperationFailure {
            operation,
            label: label.to_string(),
            error: error.to_string(),
        });
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Whether the sync had nothing to do.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.created.is_empty()
            && self.updated.is_empty()
            && self.aliased.is_empty()
            && self.removed.is_empty()
    }

    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = format!("### `{}`\n\n", self.repo);

        if self.is_noop() && self.unconfigured.is_empty() && self.failures.is_empty() {
            out.push_str("Labels are already in sync.\n");
            return out;
        }

        if !self.created.is_empty() {
            out.push_str("**Create**\n\n");
            for label in &self.created {
                let _ = writeln!(out, "- `{}` (#{})", label.name, label.color);
            }
            out.push('\n');
        }

        if !self.updated.is_empty() {
            out.push_str("**Update**\n\n");
            for change in &self.updated {
                if change.is_rename() {
                    let _ = writeln!(
                        out,
                        "- `{}` renamed to `{}` (#{})",
                        change.old_name, change.name, change.color
                    );
                } else {
                    let _ = writeln!(
                        out,
                        "- `{}` #{} -> #{}",
                        change.name, change.old_color, change.color
                    );
                }
            }
            out.push('\n');
        }

        if !self.aliased.is_empty() {
            out.push_str("**Merge**\n\n");
            for alias in &self.aliased {
                let _ = writeln!(out, "- issues labeled `{}` get `{}`", alias.old_name, alias.name);
            }
            out.push('\n');
        }

        if !self.removed.is_empty() {
            out.push_str("**Remove**\n\n");
            for label in &self.removed {
                let _ = writeln!(out, "- `{}`", label.name);
            }
            out.push('\n');
        }

        if !self.unconfigured.is_empty() {
            out.push_str("**Unconfigured** (kept, `removeUnconfiguredLabels` is off)\n\n");
            for label in &self.unconfigured {
                let _ = writeln!(out, "- `{}`", label.name);
            }
            out.push('\n');
        }

        if !self.failures.is_empty() {
            out.push_str("**Failed**\n\n");
            for failure in &self.failures {
                let _ = writeln!(
                    out,
                    "- {} `{}`: {}",
                    failure.operation, failure.label, failure.error
                );
            }
            out.push('\n');
        }

        out
    }
}
