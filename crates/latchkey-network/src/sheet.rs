//! HTTP client for the spreadsheet-backed door service.
//!
//! The service exposes two endpoints under a common base URL:
//!
//! ```text
//! GET  {base}/badges  ->  { "badges": ["04a1b2c3", ...] }
//! POST {base}/log     <-  { "values": [["2025-01-01 08:00:00", "04a1b2c3", "Granted"]] }
//! ```
//!
//! An optional bearer token is sent with every request.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{RemoteError, Result};
use crate::traits::{AuthorizationSource, LogRow, LogSink};

/// Connection settings for [`HttpSheetClient`].
#[derive(Debug, Clone)]
pub struct SheetClientConfig {
    pub base_url: Url,
    pub api_token: Option<String>,
    /// Whole-request timeout enforced by the HTTP client.
    pub timeout: Duration,
}

impl SheetClientConfig {
    /// Create a config for `base_url` with a 10 second timeout.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::InvalidUrl` if `base_url` does not parse.
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            api_token: None,
            timeout: Duration::from_secs(10),
        })
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("latchkey/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(RemoteError::Transport)
    }
}

#[derive(Debug, Deserialize)]
struct BadgeListResponse {
    badges: Vec<String>,
}

#[derive(Debug, Serialize)]
struct AppendRequest<'a> {
    values: [[&'a str; 3]; 1],
}

/// Client for the remote authorization list and access log.
#[derive(Debug, Clone)]
pub struct HttpSheetClient {
    http: reqwest::Client,
    badges_url: Url,
    log_url: Url,
    api_token: Option<String>,
}

impl HttpSheetClient {
    /// Create a client from a [`SheetClientConfig`].
    pub fn new(config: &SheetClientConfig) -> Result<Self> {
        let http = config.build_client()?;
        let mut client = Self::with_client(http, &config.base_url)?;
        client.api_token = config.api_token.clone();
        Ok(client)
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self> {
        Self::with_client(http, &Url::parse(base_url)?)
    }

    fn with_client(http: reqwest::Client, base_url: &Url) -> Result<Self> {
        Ok(Self {
            http,
            badges_url: endpoint(base_url, "badges")?,
            log_url: endpoint(base_url, "log")?,
            api_token: None,
        })
    }

    pub fn badges_url(&self) -> &Url {
        &self.badges_url
    }

    pub fn log_url(&self) -> &Url {
        &self.log_url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(RemoteError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// Join `name` onto `base`, treating `base` as a directory.
fn endpoint(base: &Url, name: &str) -> Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base.join(name)?)
}

impl AuthorizationSource for HttpSheetClient {
    async fn fetch_authorized(&self) -> Result<Vec<String>> {
        debug!("GET {}", self.badges_url);

        let resp = self
            .authorize(self.http.get(self.badges_url.clone()))
            .send()
            .await
            .map_err(RemoteError::Transport)?;
        let resp = Self::check_status(resp).await?;

        let body = resp.text().await.map_err(RemoteError::Transport)?;
        let parsed: BadgeListResponse = serde_json::from_str(&body)
            .map_err(|e| RemoteError::malformed(format!("badge list: {e}")))?;

        Ok(parsed.badges)
    }
}

impl LogSink for HttpSheetClient {
    async fn append_row(&self, row: &LogRow) -> Result<()> {
        debug!("POST {}", self.log_url);

        let body = AppendRequest {
            values: [row.to_values()],
        };
        let resp = self
            .authorize(self.http.post(self.log_url.clone()))
            .json(&body)
            .send()
            .await
            .map_err(RemoteError::Transport)?;
        Self::check_status(resp).await?;
        Ok(())
    }
}
