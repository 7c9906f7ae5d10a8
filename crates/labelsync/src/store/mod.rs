//! # Label Store
//!
//! The remote capabilities the reconciliation core needs: label CRUD, issue
//! listing and tagging, repository discovery for an installation, and the few
//! repository/issue operations used for reporting.
//!
//! [`GitHubStore`] talks to the GitHub REST API; [`MemoryStore`] keeps everything
//! in process and records each mutation.

pub mod github;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Issue, Label, RepoRef};

pub use github::{GitHubStore, GitHubStoreFactory};
pub use memory::{MemoryStore, StoreCall};

/// Page size used by every paginated listing.
pub const PAGE_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitHub API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Rate limit exceeded, reset in {reset_in:?}")]
    RateLimited { reset_in: Duration },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Remote label store scoped to one installation credential.
#[async_trait]
pub trait LabelStore: Send + Sync {
    /// All labels of a repository.
    async fn list_labels(&self, repo: &RepoRef) -> StoreResult<Vec<Label>>;

    async fn create_label(&self, repo: &RepoRef, label: &Label) -> StoreResult<()>;

    /// Update the label currently named `current_name` to look like `label`,
    /// renaming it when the names differ. Issue associations are kept.
    async fn update_label(
        &self,
        repo: &RepoRef,
        current_name: &str,
        label: &Label,
    ) -> StoreResult<()>;

    async fn delete_label(&self, repo: &RepoRef, name: &str) -> StoreResult<()>;

    /// Every issue and pull request of a repository, open or closed.
    async fn list_issues(&self, repo: &RepoRef) -> StoreResult<Vec<Issue>>;

    async fn add_labels_to_issue(
        &self,
        repo: &RepoRef,
        issue_number: u64,
        labels: &[String],
    ) -> StoreResult<()>;

    /// Repositories the installation credential can reach.
    async fn list_installation_repositories(&self) -> StoreResult<Vec<RepoRef>>;

    /// Raw contents of a file, `None` when it does not exist.
    async fn fetch_file(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: Option<&str>,
    ) -> StoreResult<Option<String>>;

    /// Head commit of a pull request.
    async fn pull_request_head(&self, repo: &RepoRef, number: u64) -> StoreResult<String>;

    async fn repository_exists(&self, repo: &RepoRef) -> StoreResult<bool>;

    async fn create_repository(&self, repo: &RepoRef, description: &str) -> StoreResult<()>;

    async fn put_file(
        &self,
        repo: &RepoRef,
        path: &str,
        content: &str,
        message: &str,
    ) -> StoreResult<()>;

    /// Refresh the open issue titled `title`, or open one. Returns its number.
    async fn open_or_update_issue(
        &self,
        repo: &RepoRef,
        title: &str,
        body: &str,
    ) -> StoreResult<u64>;

    async fn comment_on_issue(&self, repo: &RepoRef, number: u64, body: &str)
        -> StoreResult<()>;
}

/// Builds a store bound to an installation token.
pub trait StoreFactory: Send + Sync {
    fn for_token(&self, token: &str) -> Arc<dyn LabelStore>;
}
