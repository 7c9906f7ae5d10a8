//! # Task Wire Model
//!
//! Tasks travel through the queue as JSON:
//!
//! ```json
//! { "kind": "sync_repo", "ghInstallationId": 42, "org": "acme", "isPaidPlan": true, "repo": "api" }
//! ```
//!
//! The worker is the only decoder. A payload whose `kind` this build does not
//! know fails to decode, which the worker treats as a deployment mismatch.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Installation;

#[derive(Debug, Error)]
#[error("failed to decode task payload: {0}")]
pub struct TaskDecodeError(#[from] serde_json::Error);

/// One unit of work. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "ghInstallationId")]
    pub installation_id: u64,
    pub org: String,
    #[serde(rename = "isPaidPlan", default)]
    pub is_paid_plan: bool,
    /// Reserved. Decoded and carried, never used to order execution.
    #[serde(rename = "dependsOn", default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,
    #[serde(flatten)]
    pub kind: TaskKind,
}

/// What a task asks for, with the fields specific to that request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskKind {
    /// Validate access and fan out one `sync_repo` per target repository.
    SyncOrg,
    /// Reconcile one repository.
    SyncRepo { repo: String },
    /// Report what a configuration pull request would change.
    DryrunConfig { pr_number: u64 },
    /// Set up the configuration repository for a new installation.
    OnboardOrg,
    /// Co-apply the siblings of `label` to an issue.
    AddSiblings {
        repo: String,
        issue_number: u64,
        label: String,
    },
    /// React to a label created outside the configuration.
    CheckUnconfiguredLabels { repo: String, label: String },
}

impl TaskKind {
    /// The wire name of the kind.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::SyncOrg => "sync_org",
            Self::SyncRepo { .. } => "sync_repo",
            Self::DryrunConfig { .. } => "dryrun_config",
            Self::OnboardOrg => "onboard_org",
            Self::AddSiblings { .. } => "add_siblings",
            Self::CheckUnconfiguredLabels { .. } => "check_unconfigured_labels",
        }
    }
}

impl Task {
    #[must_use]
    pub fn new(installation: &Installation, kind: TaskKind) -> Self {
        Self {
            installation_id: installation.id,
            org: installation.org.clone(),
            is_paid_plan: installation.is_paid_plan,
            depends_on: None,
            kind,
        }
    }

    #[must_use]
    pub fn installation(&self) -> Installation {
        Installation {
            id: self.installation_id,
            org: self.org.clone(),
            is_paid_plan: self.is_paid_plan,
        }
    }

    pub fn decode(payload: &str) -> Result<Self, TaskDecodeError> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
