//! # Installation Credentials
//!
//! Installation tokens are minted by a [`TokenSource`] and kept in a
//! [`CredentialCache`] keyed by installation id until they get close to
//! expiry. Both are injected so the cache can be replaced by a shared one
//! when several workers run side by side.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{header, Client as HttpClient};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitHub API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Failed to sign app token: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

pub type CredentialResult<T> = Result<T, CredentialError>;

/// An installation access token and the moment it stops working.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Whether the token expires within `margin` of `now`.
    #[must_use]
    pub fn expires_within(&self, margin: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at - margin <= now
    }
}

/// Mints fresh installation tokens.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn mint(&self, installation_id: u64) -> CredentialResult<Credential>;
}

/// Storage for minted tokens.
#[async_trait]
pub trait CredentialCache: Send + Sync {
    async fn get(&self, installation_id: u64) -> Option<Credential>;
    async fn put(&self, installation_id: u64, credential: Credential);
}

/// Process-local [`CredentialCache`].
#[derive(Debug, Default)]
pub struct MemoryCredentialCache {
    entries: RwLock<HashMap<u64, Credential>>,
}

#[async_trait]
impl CredentialCache for MemoryCredentialCache {
    async fn get(&self, installation_id: u64) -> Option<Credential> {
        self.entries.read().await.get(&installation_id).cloned()
    }

    async fn put(&self, installation_id: u64, credential: Credential) {
        self.entries.write().await.insert(installation_id, credential);
    }
}

/// Resolves the credential for an installation, refreshing it when it is about to expire.
#[derive(Clone)]
pub struct Credentials {
    source: Arc<dyn TokenSource>,
    cache: Arc<dyn CredentialCache>,
    refresh_margin: Duration,
}

impl Credentials {
    #[must_use]
    pub fn new(
        source: Arc<dyn TokenSource>,
        cache: Arc<dyn CredentialCache>,
        refresh_margin: Duration,
    ) -> Self {
        Self {
            source,
            cache,
            refresh_margin,
        }
    }

    #[instrument(skip(self))]
    pub async fn token_for(&self, installation_id: u64) -> CredentialResult<Credential> {
        if let Some(cached) = self.cache.get(installation_id).await {
            if !cached.expires_within(self.refresh_margin, Utc::now()) {
                debug!("Using cached installation token");
                return Ok(cached);
            }
            debug!(expires_at = %cached.expires_at, "Cached installation token expiring, refreshing");
        }

        let fresh = self.source.mint(installation_id).await?;
        self.cache.put(installation_id, fresh.clone()).await;
        Ok(fresh)
    }
}

#[derive(Debug, Serialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct GitHubError {
    message: String,
}

/// Mints installation tokens for a GitHub App.
pub struct GitHubAppTokenSource {
    http_client: HttpClient,
    base_url: String,
    app_id: u64,
    key: EncodingKey,
}

impl GitHubAppTokenSource {
    /// Build from the app's PEM-encoded RSA private key.
    pub fn new(
        http_client: HttpClient,
        base_url: impl Into<String>,
        app_id: u64,
        private_key_pem: &[u8],
    ) -> CredentialResult<Self> {
        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            app_id,
            key: EncodingKey::from_rsa_pem(private_key_pem)?,
        })
    }

    /// Short-lived JWT identifying the app itself.
    fn app_jwt(&self) -> CredentialResult<String> {
        let now = Utc::now();
        // backdated to tolerate clock drift against GitHub
        let claims = AppClaims {
            iat: (now - Duration::seconds(60)).timestamp(),
            exp: (now + Duration::minutes(9)).timestamp(),
            iss: self.app_id.to_string(),
        };
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &self.key,
        )?)
    }
}

#[async_trait]
impl TokenSource for GitHubAppTokenSource {
    #[instrument(skip(self))]
    async fn mint(&self, installation_id: u64) -> CredentialResult<Credential> {
        let url = format!(
            "{}/app/installations/{installation_id}/access_tokens",
            self.base_url
        );
        let response = self
            .http_client
            .post(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.app_jwt()?))
            .header(header::ACCEPT, "application/vnd.github+json")
            .header(header::USER_AGENT, "labelsync-worker/0.3")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GitHubError>(&text)
                .map(|error| error.message)
                .unwrap_or(text);
            return Err(CredentialError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: AccessTokenResponse = response.json().await?;
        info!(expires_at = %body.expires_at, "Minted installation token");
        Ok(Credential {
            token: body.token,
            expires_at: body.expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(token: &str, expires_in: Duration) -> Credential {
        Credential {
            token: token.to_string(),
            expires_at: Utc::now() + expires_in,
        }
    }

    #[tokio::test]
    async fn test_mints_once_while_token_is_fresh() {
        let mut source = MockTokenSource::new();
        source
            .expect_mint()
            .withf(|id| *id == 7)
            .times(1)
            .returning(|_| Ok(credential("first", Duration::hours(1))));

        let credentials = Credentials::new(
            Arc::new(source),
            Arc::new(MemoryCredentialCache::default()),
            Duration::minutes(5),
        );

        assert_eq!(credentials.token_for(7).await.unwrap().token, "first");
        assert_eq!(credentials.token_for(7).await.unwrap().token, "first");
    }

    #[tokio::test]
    async fn test_refreshes_token_inside_margin() {
        let cache = Arc::new(MemoryCredentialCache::default());
        cache.put(7, credential("stale", Duration::minutes(2))).await;

        let mut source = MockTokenSource::new();
        source
            .expect_mint()
            .times(1)
            .returning(|_| Ok(credential("fresh", Duration::hours(1))));

        let credentials = Credentials::new(Arc::new(source), cache.clone(), Duration::minutes(5));

        assert_eq!(credentials.token_for(7).await.unwrap().token, "fresh");
        assert_eq!(cache.get(7).await.unwrap().token, "fresh");
    }

    #[tokio::test]
    async fn test_tokens_are_cached_per_installation() {
        let mut source = MockTokenSource::new();
        source
            .expect_mint()
            .times(2)
            .returning(|id| Ok(credential(&format!("token-{id}"), Duration::hours(1))));

        let credentials = Credentials::new(
            Arc::new(source),
            Arc::new(MemoryCredentialCache::default()),
            Duration::minutes(5),
        );

        assert_eq!(credentials.token_for(1).await.unwrap().token, "token-1");
        assert_eq!(credentials.token_for(2).await.unwrap().token, "token-2");
        assert_eq!(credentials.token_for(1).await.unwrap().token, "token-1");
    }

    #[tokio::test]
    async fn test_mint_failure_is_not_cached() {
        let mut source = MockTokenSource::new();
        source.expect_mint().times(1).returning(|_| {
            Err(CredentialError::Api {
                status: 404,
                message: "Not Found".to_string(),
            })
        });
        let cache = Arc::new(MemoryCredentialCache::default());
        let credentials = Credentials::new(Arc::new(source), cache.clone(), Duration::minutes(5));

        assert!(credentials.token_for(9).await.is_err());
        assert!(cache.get(9).await.is_none());
    }

    #[test]
    fn test_expires_within_margin() {
        let now = Utc::now();
        let cred = Credential {
            token: "t".to_string(),
            expires_at: now + Duration::minutes(4),
        };

        assert!(cred.expires_within(Duration::minutes(5), now));
        assert!(!cred.expires_within(Duration::minutes(3), now));
    }
}
