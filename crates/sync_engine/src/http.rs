//! HTTP listing and download
//!
//! The device serves its artifact directory through a plain web server with
//! auto-index. The listing page is scraped for `href` targets.

use std::time::Duration;

use bytes::Bytes;
use regex::Regex;
use reqwest::Client;
use tracing::trace;

use crate::error::{Result, SyncError};
use crate::pool::ArtifactFetcher;
use crate::watcher::ArtifactIndex;

const HREF_PATTERN: &str = r#"(?i)href\s*=\s*"([^"]+)""#;

/// Build the HTTP client shared by index and fetcher
pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| SyncError::index("http", format!("failed to build client: {e}")))
}

/// Extracts file names from an auto-index page
#[derive(Debug, Clone)]
pub struct ListingParser {
    href: Regex,
}

impl ListingParser {
    pub fn new() -> Result<Self> {
        let href = Regex::new(HREF_PATTERN)
            .map_err(|e| SyncError::index("http", format!("bad href pattern: {e}")))?;
        Ok(Self { href })
    }

    /// File names linked from `html`; parent links, sort links and subdirectories are skipped
    pub fn parse(&self, html: &str) -> Vec<String> {
        self.href
            .captures_iter(html)
            .filter_map(|cap| cap.get(1))
            .map(|m| m.as_str())
            .filter(|href| {
                !href.starts_with('?') && !href.starts_with("../") && !href.ends_with('/')
            })
            .filter_map(|href| href.rsplit('/').next())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }
}

fn normalize_base(base_url: &str) -> String {
    if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{base_url}/")
    }
}

/// Directory listing over HTTP
#[derive(Clone)]
pub struct HttpIndex {
    client: Client,
    parser: ListingParser,
    url: String,
}

impl HttpIndex {
    pub fn new(client: Client, url: &str) -> Result<Self> {
        Ok(Self {
            client,
            parser: ListingParser::new()?,
            url: normalize_base(url),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ArtifactIndex for HttpIndex {
    fn name(&self) -> &str {
        "http"
    }

    async fn list(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SyncError::index(&self.url, e.to_string()))?;
        let body = response
            .text()
            .await
            .map_err(|e| SyncError::index(&self.url, e.to_string()))?;

        let names = self.parser.parse(&body);
        trace!(url = %self.url, entries = names.len(), "Fetched listing");
        Ok(names)
    }
}

/// Artifact download over HTTP
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    base_url: String,
}

impl HttpFetcher {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: normalize_base(base_url),
        }
    }
}

impl ArtifactFetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, name: &str) -> Result<Bytes> {
        let url = format!("{}{}", self.base_url, name);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SyncError::fetch(name, e.to_string()))?;
        response
            .bytes()
            .await
            .map_err(|e| SyncError::fetch(name, e.to_string()))
    }
}
