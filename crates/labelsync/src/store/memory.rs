//! In-process [`LabelStore`].
//!
//! Behaves like GitHub for everything the processors rely on (renames keep
//! issue associations, deletes strip the label from issues, adding a label an
//! issue already has is a no-op) and records every mutating call in order.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{LabelStore, StoreError, StoreResult};
use crate::types::{Issue, Label, RepoRef};

/// A mutating call made against a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    CreateLabel { repo: String, name: String },
    UpdateLabel { repo: String, from: String, to: String },
    DeleteLabel { repo: String, name: String },
    AddLabels { repo: String, issue: u64, labels: Vec<String> },
    CreateRepository { repo: String },
    PutFile { repo: String, path: String },
    OpenOrUpdateIssue { repo: String, title: String },
    Comment { repo: String, number: u64 },
}

#[derive(Debug, Default)]
struct RepoState {
    labels: Vec<Label>,
    issues: Vec<Issue>,
    files: HashMap<(String, Option<String>), String>,
    pulls: HashMap<u64, String>,
    /// Open issues by title, with their current body.
    open_issues: Vec<(u64, String, String)>,
    comments: Vec<(u64, String)>,
}

#[derive(Debug, Default)]
struct State {
    repos: BTreeMap<RepoRef, RepoState>,
    accessible: Vec<RepoRef>,
    calls: Vec<StoreCall>,
    failing_labels: HashSet<String>,
    next_issue: u64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a repository with `labels`, reachable by the installation.
    #[must_use]
    pub fn with_repo(self, repo: RepoRef, labels: Vec<Label>) -> Self {
        {
            let mut state = self.lock();
            state.accessible.push(repo.clone());
            state.repos.entry(repo).or_default().labels = labels;
        }
        self
    }

    /// Add a repository the installation cannot reach.
    #[must_use]
    pub fn with_hidden_repo(self, repo: RepoRef, labels: Vec<Label>) -> Self {
        self.lock().repos.entry(repo).or_default().labels = labels;
        self
    }

    #[must_use]
    pub fn with_issue(self, repo: &RepoRef, number: u64, labels: &[&str]) -> Self {
        self.lock()
            .repos
            .entry(repo.clone())
            .or_default()
            .issues
            .push(Issue {
                number,
                labels: labels.iter().map(|label| (*label).to_string()).collect(),
            });
        self
    }

    /// Store a file at the default branch (`git_ref = None`) or a given ref.
    #[must_use]
    pub fn with_file(self, repo: &RepoRef, path: &str, git_ref: Option<&str>, content: &str) -> Self {
        self.lock()
            .repos
            .entry(repo.clone())
            .or_default()
            .files
            .insert(
                (path.to_string(), git_ref.map(str::to_string)),
                content.to_string(),
            );
        self
    }

    #[must_use]
    pub fn with_pull_request(self, repo: &RepoRef, number: u64, head: &str) -> Self {
        self.lock()
            .repos
            .entry(repo.clone())
            .or_default()
            .pulls
            .insert(number, head.to_string());
        self
    }

    /// Make every label operation naming `label` fail.
    pub fn fail_label(&self, label: &str) {
        self.lock().failing_labels.insert(label.to_string());
    }

    #[must_use]
    pub fn labels(&self, repo: &RepoRef) -> Vec<Label> {
        self.lock()
            .repos
            .get(repo)
            .map(|state| state.labels.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn issue(&self, repo: &RepoRef, number: u64) -> Option<Issue> {
        self.lock()
            .repos
            .get(repo)
            .and_then(|state| state.issues.iter().find(|i| i.number == number).cloned())
    }

    #[must_use]
    pub fn file(&self, repo: &RepoRef, path: &str) -> Option<String> {
        self.lock()
            .repos
            .get(repo)
            .and_then(|state| state.files.get(&(path.to_string(), None)).cloned())
    }

    /// Open issues as `(number, title, body)`.
    #[must_use]
    pub fn open_issues(&self, repo: &RepoRef) -> Vec<(u64, String, String)> {
        self.lock()
            .repos
            .get(repo)
            .map(|state| state.open_issues.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn comments(&self, repo: &RepoRef) -> Vec<(u64, String)> {
        self.lock()
            .repos
            .get(repo)
            .map(|state| state.comments.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn check_label(state: &State, name: &str) -> StoreResult<()> {
        if state.failing_labels.contains(name) {
            Err(StoreError::Api {
                status: 422,
                message: format!("Validation failed for label {name}"),
            })
        } else {
            Ok(())
        }
    }

    fn repo_mut<'a>(state: &'a mut State, repo: &RepoRef) -> StoreResult<&'a mut RepoState> {
        state
            .repos
            .get_mut(repo)
            .ok_or_else(|| StoreError::NotFound(repo.to_string()))
    }
}

#[async_trait]
impl LabelStore for MemoryStore {
    async fn list_labels(&self, repo: &RepoRef) -> StoreResult<Vec<Label>> {
        let state = self.lock();
        state
            .repos
            .get(repo)
            .map(|state| state.labels.clone())
            .ok_or_else(|| StoreError::NotFound(repo.to_string()))
    }

    async fn create_label(&self, repo: &RepoRef, label: &Label) -> StoreResult<()> {
        let mut state = self.lock();
        Self::check_label(&state, &label.name)?;
        let repo_state = Self::repo_mut(&mut state, repo)?;
        if repo_state
            .labels
            .iter()
            .any(|l| l.name.eq_ignore_ascii_case(&label.name))
        {
            return Err(StoreError::Api {
                status: 422,
                message: "already_exists".to_string(),
            });
        }
        repo_state.labels.push(label.clone());
        state.calls.push(StoreCall::CreateLabel {
            repo: repo.to_string(),
            name: label.name.clone(),
        });
        Ok(())
    }

    async fn update_label(
        &self,
        repo: &RepoRef,
        current_name: &str,
        label: &Label,
    ) -> StoreResult<()> {
        let mut state = self.lock();
        Self::check_label(&state, current_name)?;
        Self::check_label(&state, &label.name)?;
        let repo_state = Self::repo_mut(&mut state, repo)?;
        let existing = repo_state
            .labels
            .iter_mut()
            .find(|l| l.name == current_name)
            .ok_or_else(|| StoreError::NotFound(current_name.to_string()))?;
        *existing = label.clone();
        for issue in &mut repo_state.issues {
            for name in &mut issue.labels {
                if *name == current_name {
                    name.clone_from(&label.name);
                }
            }
        }
        state.calls.push(StoreCall::UpdateLabel {
            repo: repo.to_string(),
            from: current_name.to_string(),
            to: label.name.clone(),
        });
        Ok(())
    }

    async fn delete_label(&self, repo: &RepoRef, name: &str) -> StoreResult<()> {
        let mut state = self.lock();
        Self::check_label(&state, name)?;
        let repo_state = Self::repo_mut(&mut state, repo)?;
        repo_state.labels.retain(|l| l.name != name);
        for issue in &mut repo_state.issues {
            issue.labels.retain(|l| l != name);
        }
        state.calls.push(StoreCall::DeleteLabel {
            repo: repo.to_string(),
            name: name.to_string(),
        });
        Ok(())
    }

    async fn list_issues(&self, repo: &RepoRef) -> StoreResult<Vec<Issue>> {
        let state = self.lock();
        state
            .repos
            .get(repo)
            .map(|state| state.issues.clone())
            .ok_or_else(|| StoreError::NotFound(repo.to_string()))
    }

    async fn add_labels_to_issue(
        &self,
        repo: &RepoRef,
        issue_number: u64,
        labels: &[String],
    ) -> StoreResult<()> {
        let mut state = self.lock();
        for label in labels {
            Self::check_label(&state, label)?;
        }
        let repo_state = Self::repo_mut(&mut state, repo)?;
        let issue = repo_state
            .issues
            .iter_mut()
            .find(|issue| issue.number == issue_number)
            .ok_or_else(|| StoreError::NotFound(format!("{repo}#{issue_number}")))?;
        for label in labels {
            if !issue.has_label(label) {
                issue.labels.push(label.clone());
            }
        }
        state.calls.push(StoreCall::AddLabels {
            repo: repo.to_string(),
            issue: issue_number,
            labels: labels.to_vec(),
        });
        Ok(())
    }

    async fn list_installation_repositories(&self) -> StoreResult<Vec<RepoRef>> {
        Ok(self.lock().accessible.clone())
    }

    async fn fetch_file(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: Option<&str>,
    ) -> StoreResult<Option<String>> {
        let state = self.lock();
        Ok(state.repos.get(repo).and_then(|state| {
            state
                .files
                .get(&(path.to_string(), git_ref.map(str::to_string)))
                .cloned()
        }))
    }

    async fn pull_request_head(&self, repo: &RepoRef, number: u64) -> StoreResult<String> {
        let state = self.lock();
        state
            .repos
            .get(repo)
            .and_then(|state| state.pulls.get(&number).cloned())
            .ok_or_else(|| StoreError::NotFound(format!("{repo}#{number}")))
    }

    async fn repository_exists(&self, repo: &RepoRef) -> StoreResult<bool> {
        Ok(self.lock().repos.contains_key(repo))
    }

    async fn create_repository(&self, repo: &RepoRef, _description: &str) -> StoreResult<()> {
        let mut state = self.lock();
        state.repos.entry(repo.clone()).or_default();
        state.accessible.push(repo.clone());
        state.calls.push(StoreCall::CreateRepository {
            repo: repo.to_string(),
        });
        Ok(())
    }

    async fn put_file(
        &self,
        repo: &RepoRef,
        path: &str,
        content: &str,
        _message: &str,
    ) -> StoreResult<()> {
        let mut state = self.lock();
        Self::repo_mut(&mut state, repo)?
            .files
            .insert((path.to_string(), None), content.to_string());
        state.calls.push(StoreCall::PutFile {
            repo: repo.to_string(),
            path: path.to_string(),
        });
        Ok(())
    }

    async fn open_or_update_issue(
        &self,
        repo: &RepoRef,
        title: &str,
        body: &str,
    ) -> StoreResult<u64> {
        let mut state = self.lock();
        state.next_issue += 1;
        let candidate = state.next_issue;
        let repo_state = Self::repo_mut(&mut state, repo)?;
        let number = if let Some(existing) = repo_state
            .open_issues
            .iter_mut()
            .find(|(_, existing_title, _)| existing_title == title)
        {
            existing.2 = body.to_string();
            existing.0
        } else {
            repo_state
                .open_issues
                .push((candidate, title.to_string(), body.to_string()));
            candidate
        };
        state.calls.push(StoreCall::OpenOrUpdateIssue {
            repo: repo.to_string(),
            title: title.to_string(),
        });
        Ok(number)
    }

    async fn comment_on_issue(&self, repo: &RepoRef, number: u64, body: &str) -> StoreResult<()> {
        let mut state = self.lock();
        Self::repo_mut(&mut state, repo)?
            .comments
            .push((number, body.to_string()));
        state.calls.push(StoreCall::Comment {
            repo: repo.to_string(),
            number,
        });
        Ok(())
    }
}
