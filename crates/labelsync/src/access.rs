//! # Installation Access Guard
//!
//! Decides whether an installation can reach every repository a configuration
//! names before any mutating operation runs. Repository names compare
//! case-insensitively, as GitHub treats them.

use std::collections::HashSet;

use tracing::{debug, instrument, warn};

use crate::store::{LabelStore, StoreResult};

/// Outcome of an access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessReport {
    Sufficient {
        accessible: Vec<String>,
    },
    Insufficient {
        /// Required repositories the installation cannot reach, as written in the configuration.
        missing: Vec<String>,
        accessible: Vec<String>,
    },
}

impl AccessReport {
    #[must_use]
    pub fn accessible(&self) -> &[String] {
        match self {
            Self::Sufficient { accessible } | Self::Insufficient { accessible, .. } => accessible,
        }
    }

    #[must_use]
    pub fn is_sufficient(&self) -> bool {
        matches!(self, Self::Sufficient { .. })
    }
}

/// Compare `required` against `accessible`.
#[must_use]
pub fn evaluate_access(required: &[String], accessible: Vec<String>) -> AccessReport {
    let reachable: HashSet<String> = accessible.iter().map(|name| name.to_lowercase()).collect();
    let missing: Vec<String> = required
        .iter()
        .filter(|name| !reachable.contains(&name.to_lowercase()))
        .cloned()
        .collect();

    if missing.is_empty() {
        AccessReport::Sufficient { accessible }
    } else {
        AccessReport::Insufficient {
            missing,
            accessible,
        }
    }
}

/// Names of the repositories in `org` the installation can reach.
#[instrument(skip(store))]
pub async fn accessible_repositories(store: &dyn LabelStore, org: &str) -> StoreResult<Vec<String>> {
    let repos: Vec<String> = store
        .list_installation_repositories()
        .await?
        .into_iter()
        .filter(|repo| repo.owner.eq_ignore_ascii_case(org))
        .map(|repo| repo.name)
        .collect();
    debug!(count = repos.len(), "Listed accessible repositories");
    Ok(repos)
}

/// Check that the installation reaches every repository in `required`.
#[instrument(skip(store, required), fields(required = required.len()))]
pub async fn check_access(
    store: &dyn LabelStore,
    org: &str,
    required: &[String],
) -> StoreResult<AccessReport> {
    let accessible = accessible_repositories(store, org).await?;
    let report = evaluate_access(required, accessible);
    if let AccessReport::Insufficient { missing, .. } = &report {
        warn!(?missing, "Installation is missing access to configured repositories");
    }
    Ok(report)
}

/// Markdown body for the issue that asks an organization to grant access.
#[must_use]
pub fn missing_access_body(missing: &[String]) -> String {
    let mut body = String::from(
        "LabelSync cannot reach every repository listed in `labelsync.yml`, so no \
         repository was synced. Grant the app access to these repositories:\n\n",
    );
    for repo in missing {
        body.push_str(&format!("- `{repo}`\n"));
    }
    body
}
