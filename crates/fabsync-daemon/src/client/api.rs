//! REST client for the equipment-management API.
//!
//! Uses reqwest to list resources (following `Link` pagination) and to send
//! bridge switch commands.

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, LINK};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use fabsync_core::config::DEFAULT_PAGE_LIMIT;
use fabsync_core::{Resource, ResourceId};

use super::link::next_link;
use super::{ResourceSource, SwitchAction};

/// API client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Pagination error: {0}")]
    Pagination(String),
}

/// Configuration for connecting to the API.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root (e.g., "<https://fabman.io/api/v1>").
    pub base_url: String,
    /// Bearer API token.
    pub token: String,
    /// Resources per page.
    pub page_limit: u32,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// Equipment-management REST client.
#[derive(Debug)]
pub struct FabmanClient {
    http: reqwest::Client,
    base_url: String,
    /// `base_url` with a trailing slash, for resolving relative links.
    link_base: Url,
    page_limit: u32,
}

impl FabmanClient {
    /// Create a new API client.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        if config.base_url.is_empty() {
            return Err(ClientError::Config("base_url is empty".into()));
        }
        if config.token.is_empty() {
            return Err(ClientError::Config("token is empty".into()));
        }

        let base_url = config.base_url.trim_end_matches('/').to_string();
        let link_base = Url::parse(&format!("{base_url}/"))?;
        if link_base.cannot_be_a_base() {
            return Err(ClientError::Config(format!("base_url {base_url} is not a base URL")));
        }

        let mut headers = HeaderMap::new();
        let token_val = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| ClientError::Config("Invalid token format".into()))?;
        headers.insert(AUTHORIZATION, token_val);

        // Ensure a TLS crypto provider is installed (reqwest uses rustls-no-provider).
        // The `Err` case just means it was already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url,
            link_base,
            page_limit: config.page_limit.max(1),
        })
    }

    /// URL of the first resources page.
    pub(crate) fn first_page_url(&self) -> String {
        format!(
            "{}/resources?limit={}&embed=bridge",
            self.base_url, self.page_limit
        )
    }

    /// URL of a bridge switch endpoint.
    pub(crate) fn switch_url(&self, id: ResourceId, action: SwitchAction) -> String {
        format!("{}/resources/{id}/bridge/{}", self.base_url, action.endpoint())
    }

    /// Resolve a `Link` target against the API root.
    pub(crate) fn resolve_link(&self, target: &str) -> Result<Url, ClientError> {
        Ok(self.link_base.join(target)?)
    }

    /// Turn a non-success response into an `Api` error carrying the body.
    async fn api_error(resp: reqwest::Response) -> ClientError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("Unknown").to_string()
        } else {
            body
        };
        ClientError::Api {
            status: status.as_u16(),
            message,
        }
    }

    /// Fetch one page; returns its resources and the next page URL.
    async fn fetch_page(&self, url: &str) -> Result<(Vec<Resource>, Option<Url>), ClientError> {
        debug!(url, "Fetching resources page");
        let resp = self.http.get(url).send().await?;
        if !resp.status().is_success() {
            let err = Self::api_error(resp).await;
            warn!(url, error = %err, "Resources page request failed");
            return Err(err);
        }

        let next = resp
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(next_link)
            .map(|target| self.resolve_link(target))
            .transpose()?;
        let page: Vec<Resource> = resp.json().await?;
        Ok((page, next))
    }
}

#[async_trait]
impl ResourceSource for FabmanClient {
    #[instrument(skip(self))]
    async fn fetch_all(&self) -> Result<Vec<Resource>, ClientError> {
        let mut resources = Vec::new();
        let mut visited = HashSet::new();
        let mut url = self.first_page_url();

        loop {
            visited.insert(url.clone());
            let (page, next) = self.fetch_page(&url).await?;
            resources.extend(page);

            let Some(next) = next else { break };
            let next = String::from(next);
            if visited.contains(&next) {
                return Err(ClientError::Pagination(format!(
                    "next link {next} was already fetched"
                )));
            }
            url = next;
        }

        debug!(count = resources.len(), pages = visited.len(), "Fetched all resources");
        Ok(resources)
    }

    #[instrument(skip(self), fields(resource_id = %id, action = %action))]
    async fn switch(&self, id: ResourceId, action: SwitchAction) -> Result<(), ClientError> {
        let url = self.switch_url(id, action);
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        if resp.status() != StatusCode::CREATED {
            return Err(Self::api_error(resp).await);
        }
        debug!("Bridge switch accepted");
        Ok(())
    }
}
