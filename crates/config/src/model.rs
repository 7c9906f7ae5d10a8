use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, Result};

/// Repository key that applies to every accessible repository without its own entry.
pub const WILDCARD: &str = "*";

/// The whole `labelsync.yml` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub repos: BTreeMap<String, RepoConfig>,
}

/// Configuration of one repository (or of the wildcard entry).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    #[serde(default)]
    pub config: RepoSettings,
    #[serde(default)]
    pub labels: BTreeMap<String, LabelConfig>,
}

/// Per-repository switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoSettings {
    /// Authorizes deletion of labels the configuration does not mention.
    #[serde(default)]
    pub remove_unconfigured_labels: bool,
}

/// A desired label. The label name is the key it is stored under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelConfig {
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Legacy label names this label replaces, most preferred first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alias: Vec<String>,
    /// Labels co-applied to an issue whenever this one is applied.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub siblings: Vec<String>,
}

impl LabelConfig {
    #[must_use]
    pub fn new(color: impl Into<String>) -> Self {
        Self {
            color: color.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_alias<I, S>(mut self, alias: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.alias = alias.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_siblings<I, S>(mut self, siblings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.siblings = siblings.into_iter().map(Into::into).collect();
        self
    }
}

impl RepoConfig {
    /// Whether unconfigured labels may be deleted from this repository.
    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.config.remove_unconfigured_labels
    }

    #[must_use]
    pub fn label(&self, name: &str) -> Option<&LabelConfig> {
        self.labels.get(name)
    }
}

impl Configuration {
    /// Decode and validate a `labelsync.yml` document.
    pub fn from_yaml(source: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(source)?;
        config.validate()?;
        debug!(repos = config.repos.len(), "Loaded configuration");
        Ok(config)
    }

    /// Render the configuration back to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(ConfigError::from)
    }

    /// Configuration that applies to `repo`: its own entry, else the wildcard entry.
    ///
    /// GitHub repository names are case-insensitive, and so is the lookup.
    #[must_use]
    pub fn repo(&self, repo: &str) -> Option<&RepoConfig> {
        self.repos
            .get(repo)
            .or_else(|| {
                self.repos
                    .iter()
                    .find(|(name, _)| *name != WILDCARD && name.eq_ignore_ascii_case(repo))
                    .map(|(_, config)| config)
            })
            .or_else(|| self.repos.get(WILDCARD))
    }

    #[must_use]
    pub fn has_wildcard(&self) -> bool {
        self.repos.contains_key(WILDCARD)
    }

    /// Repositories named explicitly, wildcard excluded.
    pub fn explicit_repos(&self) -> impl Iterator<Item = &str> {
        self.repos
            .keys()
            .map(String::as_str)
            .filter(|name| *name != WILDCARD)
    }

    /// Repositories a sync should touch once `accessible` is known.
    ///
    /// Explicit entries are always targeted; with a wildcard entry every other
    /// accessible repository is targeted as well. An accessible repository
    /// matching an explicit entry up to case is targeted once, under the
    /// explicit spelling.
    #[must_use]
    pub fn target_repos(&self, accessible: &[String]) -> Vec<String> {
        let mut targets: BTreeSet<String> = self.explicit_repos().map(str::to_string).collect();
        if self.has_wildcard() {
            let explicit: BTreeSet<String> =
                targets.iter().map(|name| name.to_ascii_lowercase()).collect();
            targets.extend(
                accessible
                    .iter()
                    .filter(|name| !explicit.contains(&name.to_ascii_lowercase()))
                    .cloned(),
            );
        }
        targets.into_iter().collect()
    }
}
