use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{SocialError, SocialResult};
use crate::models::{AccountCredentials, Post};
use crate::{SessionFactory, SocialSession};

/// Cached login token, one file per account.
#[derive(Debug, Serialize, Deserialize)]
struct CachedSession {
    token: String,
    saved_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    auth_info_1: &'a str,
    auth_info_2: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

/// Logs accounts into the social API over HTTP and hands out sessions.
#[derive(Clone)]
pub struct HttpSessionFactory {
    client: Client,
    base_url: String,
    session_dir: Option<PathBuf>,
}

impl HttpSessionFactory {
    /// Every request made by sessions from this factory is bounded by `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> SocialResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SocialError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session_dir: None,
        })
    }

    /// Persist session tokens under `dir` so restarts skip the login round-trip.
    pub fn with_session_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.session_dir = Some(dir.into());
        self
    }

    fn session_path(&self, username: &str) -> Option<PathBuf> {
        self.session_dir
            .as_ref()
            .map(|dir| session_file(dir, username))
    }

    async fn load_cached(&self, username: &str) -> Option<CachedSession> {
        let path = self.session_path(username)?;
        let raw = tokio::fs::read_to_string(&path).await.ok()?;
        match serde_json::from_str::<CachedSession>(&raw) {
            Ok(cached) if !cached.token.is_empty() => Some(cached),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("Ignoring unreadable session cache {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn store_cached(&self, username: &str, token: &str) -> SocialResult<()> {
        let Some(path) = self.session_path(username) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SocialError::SessionCache(e.to_string()))?;
        }
        let cached = CachedSession {
            token: token.to_string(),
            saved_at: Utc::now(),
        };
        let json = serde_json::to_string(&cached)
            .map_err(|e| SocialError::SessionCache(e.to_string()))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| SocialError::SessionCache(e.to_string()))
    }

    fn session(&self, username: &str, token: String) -> HttpSession {
        HttpSession {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            username: username.to_string(),
            token,
        }
    }
}

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    async fn login(
        &self,
        credentials: &AccountCredentials,
    ) -> SocialResult<Box<dyn SocialSession>> {
        if let Some(cached) = self.load_cached(&credentials.username).await {
            tracing::debug!(
                "Reusing session for {} cached at {}",
                credentials.username,
                cached.saved_at
            );
            return Ok(Box::new(self.session(&credentials.username, cached.token)));
        }

        let url = format!("{}/auth/login", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&LoginRequest {
                auth_info_1: &credentials.username,
                auth_info_2: &credentials.email,
                password: &credentials.password,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match classify_status(status, body, &credentials.username) {
                SocialError::Api { status, body } => {
                    SocialError::Authentication(format!("HTTP {}: {}", status, body))
                }
                other => other,
            });
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| SocialError::InvalidResponse(e.to_string()))?;
        if login.token.is_empty() {
            return Err(SocialError::Authentication(format!(
                "empty session token for {}",
                credentials.username
            )));
        }

        if let Err(e) = self.store_cached(&credentials.username, &login.token).await {
            tracing::warn!("Could not cache session for {}: {}", credentials.username, e);
        }

        Ok(Box::new(self.session(&credentials.username, login.token)))
    }
}

/// One logged-in account.
pub struct HttpSession {
    client: Client,
    base_url: String,
    username: String,
    token: String,
}

#[async_trait]
impl SocialSession for HttpSession {
    async fn get_user_posts(&self, user_id: &str, count: usize) -> SocialResult<Vec<Post>> {
        let url = format!("{}/users/{}/posts", self.base_url, user_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("count", count)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body, &self.username));
        }

        response
            .json::<Vec<Post>>()
            .await
            .map_err(|e| SocialError::InvalidResponse(e.to_string()))
    }

    fn username(&self) -> &str {
        &self.username
    }
}

fn session_file(dir: &Path, username: &str) -> PathBuf {
    dir.join(format!("cookies_{}.json", username))
}

/// Map a non-success status onto the error taxonomy.
fn classify_status(status: StatusCode, body: String, username: &str) -> SocialError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => SocialError::RateLimited(username.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SocialError::Authentication(format!("{} rejected with HTTP {}", username, status.as_u16()))
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            SocialError::Timeout(format!("HTTP {} for {}", status.as_u16(), username))
        }
        _ => SocialError::Api {
            status: status.as_u16(),
            body,
        },
    }
}
