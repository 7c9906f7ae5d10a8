//! # GitHub REST Label Store
//!
//! [`LabelStore`] over the GitHub REST API with installation-token auth,
//! `per_page=100` pagination and rate-limit error mapping.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{header, Client as HttpClient, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use super::{LabelStore, StoreError, StoreFactory, StoreResult, PAGE_SIZE};
use crate::types::{Issue, Label, RepoRef};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const USER_AGENT: &str = "labelsync-worker/0.3";
const API_VERSION: &str = "2022-11-28";
/// Remaining-call count below which every response logs a warning.
const RATE_LIMIT_WARNING_THRESHOLD: i64 = 100;

/// GitHub client for label operations bound to one installation token.
#[derive(Clone)]
pub struct GitHubStore {
    http_client: HttpClient,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct GitHubError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GitHubLabel {
    name: String,
    color: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubLabelRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GitHubIssue {
    number: u64,
    #[serde(default)]
    labels: Vec<GitHubLabelRef>,
}

#[derive(Debug, Deserialize)]
struct GitHubIssueSummary {
    number: u64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct GitHubOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GitHubRepository {
    name: String,
    owner: GitHubOwner,
}

#[derive(Debug, Deserialize)]
struct InstallationRepositories {
    repositories: Vec<GitHubRepository>,
}

#[derive(Debug, Deserialize)]
struct GitHubPullHead {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitHubPull {
    head: GitHubPullHead,
}

impl From<GitHubLabel> for Label {
    fn from(label: GitHubLabel) -> Self {
        Self {
            name: label.name,
            color: label.color,
            description: label.description,
        }
    }
}

impl GitHubStore {
    #[must_use]
    pub fn new(http_client: HttpClient, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn repo_url(&self, repo: &RepoRef, rest: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.base_url,
            urlencoding::encode(&repo.owner),
            urlencoding::encode(&repo.name),
            rest
        )
    }

    fn label_url(&self, repo: &RepoRef, name: &str) -> String {
        self.repo_url(repo, &format!("/labels/{}", urlencoding::encode(name)))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.request_accepting(method, url, "application/vnd.github+json")
    }

    fn request_accepting(&self, method: Method, url: &str, accept: &str) -> RequestBuilder {
        self.http_client
            .request(method, url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::ACCEPT, accept)
            .header(header::USER_AGENT, USER_AGENT)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send(&self, request: RequestBuilder) -> StoreResult<Response> {
        let response = request.send().await?;
        Self::warn_on_low_rate_limit(&response);
        Self::ensure_success(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> StoreResult<T> {
        let response = self.send(self.request(Method::GET, url)).await?;
        Ok(response.json().await?)
    }

    /// Walk `per_page=100` pages until a short page.
    async fn paginate<P, T>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        extract: impl Fn(P) -> Vec<T>,
    ) -> StoreResult<Vec<T>>
    where
        P: DeserializeOwned,
    {
        let mut items = Vec::new();
        let per_page = PAGE_SIZE.to_string();
        let mut page: u32 = 1;

        loop {
            let page_number = page.to_string();
            let request = self
                .request(Method::GET, url)
                .query(query)
                .query(&[("per_page", per_page.as_str()), ("page", page_number.as_str())]);
            let response = self.send(request).await?;
            let batch = extract(response.json::<P>().await?);
            let count = batch.len();
            items.extend(batch);

            if count < PAGE_SIZE {
                break;
            }
            page += 1;
        }

        debug!(url, pages = page, items = items.len(), "Paginated listing complete");
        Ok(items)
    }

    async fn ensure_success(response: Response) -> StoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if matches!(status, StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS) {
            if let Some(reset_in) = Self::get_rate_limit_reset(&response) {
                return Err(StoreError::RateLimited { reset_in });
            }
        }

        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(response.url().path().to_string()));
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<GitHubError>(&text)
            .map(|error| error.message)
            .unwrap_or(text);
        Err(StoreError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Time until the rate limit resets, when the response says it is exhausted.
    fn get_rate_limit_reset(response: &Response) -> Option<Duration> {
        let headers = response.headers();
        let remaining = headers
            .get("x-ratelimit-remaining")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse::<i64>().ok())?;
        if remaining > 0 {
            return None;
        }

        let reset_in = headers
            .get("x-ratelimit-reset")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse::<i64>().ok())
            .map_or(Duration::from_secs(60), |reset_timestamp| {
                let now = chrono::Utc::now().timestamp();
                Duration::from_secs(u64::try_from(reset_timestamp - now).unwrap_or(0))
            });
        Some(reset_in)
    }

    fn warn_on_low_rate_limit(response: &Response) {
        if let Some(remaining) = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse::<i64>().ok())
        {
            if remaining < RATE_LIMIT_WARNING_THRESHOLD {
                warn!(remaining, "GitHub API rate limit low");
            }
        }
    }
}

#[async_trait]
impl LabelStore for GitHubStore {
    #[instrument(skip(self, repo), fields(repo = %repo))]
    async fn list_labels(&self, repo: &RepoRef) -> StoreResult<Vec<Label>> {
        let url = self.repo_url(repo, "/labels");
        let labels = self
            .paginate(&url, &[], |page: Vec<GitHubLabel>| {
                page.into_iter().map(Label::from).collect()
            })
            .await?;
        debug!("Retrieved {} labels", labels.len());
        Ok(labels)
    }

    #[instrument(skip(self, repo, label), fields(repo = %repo, label = %label.name))]
    async fn create_label(&self, repo: &RepoRef, label: &Label) -> StoreResult<()> {
        let url = self.repo_url(repo, "/labels");
        let body = json!({
            "name": label.name,
            "color": crate::types::normalize_color(&label.color),
            "description": label.description.clone().unwrap_or_default(),
        });
        self.send(self.request(Method::POST, &url).json(&body))
            .await?;
        info!("Created label");
        Ok(())
    }

    #[instrument(skip(self, repo, label), fields(repo = %repo, label = %label.name))]
    async fn update_label(
        &self,
        repo: &RepoRef,
        current_name: &str,
        label: &Label,
    ) -> StoreResult<()> {
        let url = self.label_url(repo, current_name);
        let body = json!({
            "new_name": label.name,
            "color": crate::types::normalize_color(&label.color),
            "description": label.description.clone().unwrap_or_default(),
        });
        self.send(self.request(Method::PATCH, &url).json(&body))
            .await?;
        info!(from = current_name, "Updated label");
        Ok(())
    }

    #[instrument(skip(self, repo), fields(repo = %repo))]
    async fn delete_label(&self, repo: &RepoRef, name: &str) -> StoreResult<()> {
        let url = self.label_url(repo, name);
        match self.send(self.request(Method::DELETE, &url)).await {
            Ok(_) => {
                info!("Deleted label");
                Ok(())
            }
            Err(StoreError::NotFound(_)) => {
                debug!("Label already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, repo), fields(repo = %repo))]
    async fn list_issues(&self, repo: &RepoRef) -> StoreResult<Vec<Issue>> {
        let url = self.repo_url(repo, "/issues");
        self.paginate(&url, &[("state", "all")], |page: Vec<GitHubIssue>| {
            page.into_iter()
                .map(|issue| Issue {
                    number: issue.number,
                    labels: issue.labels.into_iter().map(|label| label.name).collect(),
                })
                .collect()
        })
        .await
    }

    #[instrument(skip(self, repo), fields(repo = %repo))]
    async fn add_labels_to_issue(
        &self,
        repo: &RepoRef,
        issue_number: u64,
        labels: &[String],
    ) -> StoreResult<()> {
        if labels.is_empty() {
            return Ok(());
        }
        let url = self.repo_url(repo, &format!("/issues/{issue_number}/labels"));
        self.send(
            self.request(Method::POST, &url)
                .json(&json!({ "labels": labels })),
        )
        .await?;
        debug!("Added {} labels to #{}", labels.len(), issue_number);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_installation_repositories(&self) -> StoreResult<Vec<RepoRef>> {
        let url = format!("{}/installation/repositories", self.base_url);
        self.paginate(&url, &[], |page: InstallationRepositories| {
            page.repositories
                .into_iter()
                .map(|repo| RepoRef::new(repo.owner.login, repo.name))
                .collect()
        })
        .await
    }

    #[instrument(skip(self, repo), fields(repo = %repo))]
    async fn fetch_file(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: Option<&str>,
    ) -> StoreResult<Option<String>> {
        let url = self.repo_url(repo, &format!("/contents/{path}"));
        let mut request = self.request_accepting(Method::GET, &url, "application/vnd.github.raw");
        if let Some(git_ref) = git_ref {
            request = request.query(&[("ref", git_ref)]);
        }

        match self.send(request).await {
            Ok(response) => Ok(Some(response.text().await?)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, repo), fields(repo = %repo))]
    async fn pull_request_head(&self, repo: &RepoRef, number: u64) -> StoreResult<String> {
        let url = self.repo_url(repo, &format!("/pulls/{number}"));
        let pull: GitHubPull = self.get_json(&url).await?;
        Ok(pull.head.sha)
    }

    #[instrument(skip(self, repo), fields(repo = %repo))]
    async fn repository_exists(&self, repo: &RepoRef) -> StoreResult<bool> {
        let url = self.repo_url(repo, "");
        match self.send(self.request(Method::GET, &url)).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, repo), fields(repo = %repo))]
    async fn create_repository(&self, repo: &RepoRef, description: &str) -> StoreResult<()> {
        let url = format!(
            "{}/orgs/{}/repos",
            self.base_url,
            urlencoding::encode(&repo.owner)
        );
        let body = json!({
            "name": repo.name,
            "description": description,
            "auto_init": true,
        });
        self.send(self.request(Method::POST, &url).json(&body))
            .await?;
        info!("Created repository");
        Ok(())
    }

    #[instrument(skip(self, repo, content), fields(repo = %repo))]
    async fn put_file(
        &self,
        repo: &RepoRef,
        path: &str,
        content: &str,
        message: &str,
    ) -> StoreResult<()> {
        let url = self.repo_url(repo, &format!("/contents/{path}"));
        let body = json!({
            "message": message,
            "content": base64::engine::general_purpose::STANDARD.encode(content),
        });
        self.send(self.request(Method::PUT, &url).json(&body))
            .await?;
        info!("Committed file");
        Ok(())
    }

    #[instrument(skip(self, repo, body), fields(repo = %repo))]
    async fn open_or_update_issue(
        &self,
        repo: &RepoRef,
        title: &str,
        body: &str,
    ) -> StoreResult<u64> {
        let url = self.repo_url(repo, "/issues");
        let open = self
            .paginate(&url, &[("state", "open")], |page: Vec<GitHubIssueSummary>| page)
            .await?;

        if let Some(existing) = open.into_iter().find(|issue| issue.title == title) {
            let issue_url = self.repo_url(repo, &format!("/issues/{}", existing.number));
            self.send(
                self.request(Method::PATCH, &issue_url)
                    .json(&json!({ "body": body })),
            )
            .await?;
            info!(issue = existing.number, "Refreshed issue");
            return Ok(existing.number);
        }

        let response = self
            .send(
                self.request(Method::POST, &url)
                    .json(&json!({ "title": title, "body": body })),
            )
            .await?;
        let created: GitHubIssueSummary = response.json().await?;
        info!(issue = created.number, "Opened issue");
        Ok(created.number)
    }

    #[instrument(skip(self, repo, body), fields(repo = %repo))]
    async fn comment_on_issue(
        &self,
        repo: &RepoRef,
        number: u64,
        body: &str,
    ) -> StoreResult<()> {
        let url = self.repo_url(repo, &format!("/issues/{number}/comments"));
        self.send(self.request(Method::POST, &url).json(&json!({ "body": body })))
            .await?;
        Ok(())
    }
}

/// Hands out [`GitHubStore`]s sharing one connection pool.
#[derive(Clone)]
pub struct GitHubStoreFactory {
    http_client: HttpClient,
    base_url: String,
}

impl GitHubStoreFactory {
    pub fn new(base_url: impl Into<String>) -> StoreResult<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http_client,
            base_url: base_url.into(),
        })
    }
}

impl StoreFactory for GitHubStoreFactory {
    fn for_token(&self, token: &str) -> Arc<dyn LabelStore> {
        Arc::new(GitHubStore::new(
            self.http_client.clone(),
            self.base_url.clone(),
            token,
        ))
    }
}
