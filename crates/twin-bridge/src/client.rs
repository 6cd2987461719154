// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Point reads of thing documents.
//!
//! `GET {api}/api/v1alpha1/things/{application}/things/{name}`:
//! 200 yields the document, 404 yields `None`, anything else is an error.

use crate::auth::{AuthError, SharedTokenProvider};
use crate::model::Thing;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use thiserror::Error;
use tracing::debug;

/// Snapshot client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid thing document: {0}")]
    Decode(String),

    #[error("Invalid URL: {0}")]
    Url(String),
}

/// Source of point-in-time thing documents.
#[async_trait]
pub trait ThingSource: Send + Sync {
    /// Fetch the current document of a thing, `None` if it does not exist.
    async fn get_thing(&self, name: &str) -> Result<Option<Thing>, ClientError>;
}

/// URL of a thing resource, with extra trailing path segments.
///
/// Every segment is percent-encoded, including `/` and `#`.
pub fn thing_url(
    api: &Url,
    application: &str,
    name: &str,
    suffix: &[&str],
) -> Result<Url, ClientError> {
    let mut url = api.clone();
    url.set_query(None);
    url.set_fragment(None);
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| ClientError::Url(format!("'{}' cannot be a base URL", api)))?;
        segments
            .pop_if_empty()
            .extend(["api", "v1alpha1", "things", application, "things", name])
            .extend(suffix);
    }
    Ok(url)
}

/// HTTP snapshot client.
#[derive(Clone)]
pub struct ThingClient {
    http: reqwest::Client,
    api: Url,
    application: String,
    tokens: SharedTokenProvider,
}

impl ThingClient {
    pub fn new(
        http: reqwest::Client,
        api: Url,
        application: impl Into<String>,
        tokens: SharedTokenProvider,
    ) -> Self {
        Self {
            http,
            api,
            application: application.into(),
            tokens,
        }
    }

    pub fn application(&self) -> &str {
        &self.application
    }
}

#[async_trait]
impl ThingSource for ThingClient {
    async fn get_thing(&self, name: &str) -> Result<Option<Thing>, ClientError> {
        let url = thing_url(&self.api, &self.application, name, &[])?;
        debug!("GET {}", url);

        let mut request = self.http.get(url);
        if let Some(token) = self.tokens.bearer_token().await? {
            request = request.bearer_auth(token.access_token);
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::OK => {
                let bytes = response.bytes().await?;
                let thing = serde_json::from_slice(&bytes)
                    .map_err(|e| ClientError::Decode(e.to_string()))?;
                Ok(Some(thing))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ClientError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}
