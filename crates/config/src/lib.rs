//! Typed LabelSync configuration.
//!
//! A `labelsync.yml` document maps repository names (or the `*` wildcard) to the
//! labels that repository should carry:
//!
//! ```yaml
//! repos:
//!   api:
//!     config:
//!       removeUnconfiguredLabels: true
//!     labels:
//!       bug:
//!         color: "d73a4a"
//!         description: Something isn't working
//!         alias: ["kind/bug", "defect"]
//!         siblings: ["triage"]
//!       triage:
//!         color: "fbca04"
//! ```
//!
//! The reconciliation core consumes [`Configuration`] only after
//! [`Configuration::validate`] has accepted it.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
mod model;
mod validate;

pub use error::{ConfigError, Result, ValidationProblem};
pub use model::{Configuration, LabelConfig, RepoConfig, RepoSettings, WILDCARD};

/// Name of the configuration file inside the configuration repository.
pub const CONFIG_FILE: &str = "labelsync.yml";

/// Name of the repository holding an organization's configuration.
#[must_use]
pub fn config_repository(org: &str) -> String {
    format!("{}-labelsync", org.to_lowercase())
}
