// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bearer credentials for the twin API.
//!
//! Both the snapshot client and the change streams obtain their token through
//! a shared [`TokenProvider`].
//!
//! # Providers
//!
//! - [`NoAuth`] -- no credentials, requests go out unauthenticated
//! - [`StaticTokenProvider`] -- fixed token, never expires
//! - [`ClientCredentialsProvider`] -- OAuth2 client-credentials grant, cached
//!   and refreshed inside the refresh window

use crate::config::AuthConfig;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Credential errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Token endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid token response: {0}")]
    Decode(String),

    #[error("Invalid auth configuration: {0}")]
    Config(String),
}

/// Access token with optional expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl BearerToken {
    /// Token without expiry.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: None,
        }
    }

    /// Token expiring at the given time.
    pub fn expiring(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: Some(expires_at),
        }
    }

    /// True iff an expiry is known and falls within `window` of `now`.
    pub fn is_within_refresh_interval(&self, window: Duration, now: DateTime<Utc>) -> bool {
        let window =
            ChronoDuration::from_std(window).unwrap_or_else(|_| ChronoDuration::weeks(5_200));
        match self.expires_at {
            Some(expires_at) => now.checked_add_signed(window).map_or(true, |t| t >= expires_at),
            None => false,
        }
    }
}

/// Source of bearer credentials.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current token, fetching or refreshing as needed.
    ///
    /// `Ok(None)` means requests are sent unauthenticated.
    async fn bearer_token(&self) -> Result<Option<BearerToken>, AuthError>;

    /// Whether the cached token is about to expire.
    fn needs_refresh(&self) -> bool {
        false
    }
}

/// Shared provider handle.
pub type SharedTokenProvider = Arc<dyn TokenProvider>;

/// Build the provider for an optional auth section.
pub fn from_config(
    auth: Option<&AuthConfig>,
    http: reqwest::Client,
) -> Result<SharedTokenProvider, AuthError> {
    let Some(auth) = auth else {
        return Ok(Arc::new(NoAuth));
    };
    if let Some(token) = &auth.token {
        return Ok(Arc::new(StaticTokenProvider::new(token.clone())));
    }
    match (&auth.token_url, &auth.client_id, &auth.client_secret) {
        (Some(url), Some(id), Some(secret)) => Ok(Arc::new(
            ClientCredentialsProvider::new(http, url.clone(), id.clone(), secret.clone())
                .with_scopes(auth.scopes.clone())
                .with_refresh_window(auth.refresh_window()),
        )),
        _ => Err(AuthError::Config(
            "either token or token_url, client_id and client_secret are required".into(),
        )),
    }
}

/// No credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

#[async_trait]
impl TokenProvider for NoAuth {
    async fn bearer_token(&self) -> Result<Option<BearerToken>, AuthError> {
        Ok(None)
    }
}

/// Fixed token.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: BearerToken,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: BearerToken::new(token),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn bearer_token(&self) -> Result<Option<BearerToken>, AuthError> {
        Ok(Some(self.token.clone()))
    }
}

/// Cap on `expires_in` (ten years).
const MAX_EXPIRES_IN_SECS: u64 = 315_360_000;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// OAuth2 client-credentials grant.
///
/// Concurrent callers share the cached token; at most one fetch runs at a time.
pub struct ClientCredentialsProvider {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scopes: Vec<String>,
    refresh_window: Duration,
    cached: Mutex<Option<BearerToken>>,
    fetch: tokio::sync::Mutex<()>,
}

impl ClientCredentialsProvider {
    pub fn new(
        http: reqwest::Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scopes: Vec::new(),
            refresh_window: Duration::from_secs(30),
            cached: Mutex::new(None),
            fetch: tokio::sync::Mutex::new(()),
        }
    }

    /// Set requested scopes (builder pattern).
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Set the refresh window (builder pattern).
    pub fn with_refresh_window(mut self, window: Duration) -> Self {
        self.refresh_window = window;
        self
    }

    fn fresh_cached(&self) -> Option<BearerToken> {
        self.cached
            .lock()
            .as_ref()
            .filter(|t| !t.is_within_refresh_interval(self.refresh_window, Utc::now()))
            .cloned()
    }

    async fn request_token(&self) -> Result<BearerToken, AuthError> {
        debug!("Requesting access token from {}", self.token_url);

        let mut form = vec![
            ("grant_type", "client_credentials".to_string()),
            ("client_id", self.client_id.clone()),
            ("client_secret", self.client_secret.clone()),
        ];
        if !self.scopes.is_empty() {
            form.push(("scope", self.scopes.join(" ")));
        }

        let response = self.http.post(&self.token_url).form(&form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Decode(e.to_string()))?;

        let expires_at = body
            .expires_in
            .map(|secs| secs.min(MAX_EXPIRES_IN_SECS))
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(|secs| Utc::now().checked_add_signed(ChronoDuration::seconds(secs)));

        Ok(BearerToken {
            access_token: body.access_token,
            expires_at,
        })
    }
}

#[async_trait]
impl TokenProvider for ClientCredentialsProvider {
    async fn bearer_token(&self) -> Result<Option<BearerToken>, AuthError> {
        if let Some(token) = self.fresh_cached() {
            return Ok(Some(token));
        }

        let _guard = self.fetch.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(token) = self.fresh_cached() {
            return Ok(Some(token));
        }

        let token = self.request_token().await?;
        *self.cached.lock() = Some(token.clone());
        Ok(Some(token))
    }

    fn needs_refresh(&self) -> bool {
        self.cached
            .lock()
            .as_ref()
            .map_or(false, |t| {
                t.is_within_refresh_interval(self.refresh_window, Utc::now())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("timestamp")
    }

    #[test]
    fn test_refresh_interval() {
        let token = BearerToken::expiring("t", at(1_000));
        let window = Duration::from_secs(30);
        assert!(!token.is_within_refresh_interval(window, at(900)));
        assert!(token.is_within_refresh_interval(window, at(970)));
        assert!(token.is_within_refresh_interval(window, at(2_000)));
        assert!(!BearerToken::new("t").is_within_refresh_interval(window, at(2_000)));
    }

    #[tokio::test]
    async fn test_static_and_no_auth() {
        let token = StaticTokenProvider::new("abc").bearer_token().await.expect("token");
        assert_eq!(token, Some(BearerToken::new("abc")));
        assert_eq!(NoAuth.bearer_token().await.expect("token"), None);
        assert!(!NoAuth.needs_refresh());
    }

    #[test]
    fn test_from_config() {
        let http = reqwest::Client::new();
        assert!(from_config(None, http.clone()).is_ok());
        assert!(from_config(Some(&AuthConfig::static_token("x")), http.clone()).is_ok());
        assert!(matches!(
            from_config(Some(&AuthConfig::default()), http),
            Err(AuthError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_client_credentials_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=bridge"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "abc",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = ClientCredentialsProvider::new(
            reqwest::Client::new(),
            format!("{}/token", server.uri()),
            "bridge",
            "secret",
        );

        let first = provider.bearer_token().await.expect("token").expect("some");
        let second = provider.bearer_token().await.expect("token").expect("some");
        assert_eq!(first.access_token, "abc");
        assert_eq!(first, second);
        assert!(first.expires_at.is_some());
        assert!(!provider.needs_refresh());
    }

    #[tokio::test]
    async fn test_client_credentials_refreshes_inside_window() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "short",
                "expires_in": 10
            })))
            .expect(2)
            .mount(&server)
            .await;

        let provider = ClientCredentialsProvider::new(
            reqwest::Client::new(),
            format!("{}/token", server.uri()),
            "bridge",
            "secret",
        )
        .with_refresh_window(Duration::from_secs(60));

        provider.bearer_token().await.expect("first");
        assert!(provider.needs_refresh());
        provider.bearer_token().await.expect("second");
    }

    #[tokio::test]
    async fn test_client_credentials_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("denied"))
            .mount(&server)
            .await;

        let provider = ClientCredentialsProvider::new(
            reqwest::Client::new(),
            format!("{}/token", server.uri()),
            "bridge",
            "wrong",
        );

        match provider.bearer_token().await {
            Err(AuthError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "denied");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
