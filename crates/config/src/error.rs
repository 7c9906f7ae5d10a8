//! Error types for configuration decoding and validation.

use thiserror::Error;

/// Errors raised while reading a `labelsync.yml` document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document is not valid YAML or does not match the schema.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The document parsed but breaks one or more configuration rules.
    #[error("configuration has {} problem(s)", problems.len())]
    Invalid { problems: Vec<ValidationProblem> },
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// A single rule violation found by [`crate::Configuration::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationProblem {
    /// Two labels in the same repository claim the same legacy label.
    #[error("{repo}: `{alias}` is claimed as an alias by both `{first}` and `{second}`")]
    DuplicateAlias {
        repo: String,
        alias: String,
        first: String,
        second: String,
    },

    /// A label lists its own name as an alias.
    #[error("{repo}: `{label}` lists itself as an alias")]
    SelfAlias { repo: String, label: String },

    /// An alias names a label that is itself configured in the repository.
    #[error("{repo}: `{label}` aliases `{alias}`, which is configured as a label of its own")]
    AliasShadowsLabel {
        repo: String,
        label: String,
        alias: String,
    },

    /// A color is not a six digit hex value.
    #[error("{repo}: `{label}` has color `{color}`, expected six hex digits")]
    InvalidColor {
        repo: String,
        label: String,
        color: String,
    },

    /// A sibling refers to a label that is not configured in the repository.
    #[error("{repo}: `{label}` has sibling `{sibling}`, which is not a configured label")]
    UnknownSibling {
        repo: String,
        label: String,
        sibling: String,
    },

    /// A label key is empty or whitespace.
    #[error("{repo}: a label has an empty name")]
    EmptyLabelName { repo: String },
}
