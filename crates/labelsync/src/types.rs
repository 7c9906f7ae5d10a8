//! Shared value types passed between the store, the diff engine and the processors.

use std::fmt;

use labelsync_config::LabelConfig;
use serde::{Deserialize, Serialize};

/// A repository addressed by owner and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    #[must_use]
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A label as the remote store knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Label {
    #[must_use]
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
            description: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The label `config` describes under `name`.
    #[must_use]
    pub fn from_config(name: &str, config: &LabelConfig) -> Self {
        Self {
            name: name.to_string(),
            color: config.color.clone(),
            description: config.description.clone(),
        }
    }

    /// Whether color and description match, ignoring color case, a leading `#`
    /// and the difference between a missing and an empty description.
    #[must_use]
    pub fn same_appearance(&self, color: &str, description: Option<&str>) -> bool {
        normalize_color(&self.color) == normalize_color(color)
            && self.description.as_deref().unwrap_or("") == description.unwrap_or("")
    }
}

/// Lowercase hex without the leading `#`, the form GitHub stores.
#[must_use]
pub fn normalize_color(color: &str) -> String {
    color.trim_start_matches('#').to_ascii_lowercase()
}

/// An issue or pull request with the names of its labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub labels: Vec<String>,
}

impl Issue {
    #[must_use]
    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|label| label.eq_ignore_ascii_case(name))
    }
}

/// The identity a task runs under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installation {
    pub id: u64,
    pub org: String,
    pub is_paid_plan: bool,
}
