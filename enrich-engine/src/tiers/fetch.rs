//! Fetch Tier: plain HTTP GET for static content

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// Successful fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub body: String,
    pub status_code: u16,
    /// URL after redirects
    pub final_url: String,
}

/// Fetch failure, tagged retryable or terminal
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("DNS resolution failed for {0}")]
    DnsFailure(String),

    #[error("server error status {0}")]
    ServerStatus(u16),

    #[error("client error status {0}")]
    ClientStatus(u16),

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Timeout, connection reset/refused, 5xx, 408 and 429 are worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Connection(_) | Self::ServerStatus(_) => true,
            Self::ClientStatus(status) => matches!(status, 408 | 429),
            Self::DnsFailure(_) | Self::InvalidUrl(_) => false,
        }
    }

    /// The host does not exist (or the URL cannot be formed), so no tier can reach it
    pub fn is_unreachable_host(&self) -> bool {
        matches!(self, Self::DnsFailure(_) | Self::InvalidUrl(_))
    }
}

/// Single-attempt page fetcher
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError>;
}

/// reqwest-backed fetcher
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        debug!(url, "Fetching page");

        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml")
            .send()
            .await
            .map_err(|e| classify_error(url, &e))?;

        let status = response.status();
        let final_url = response.url().to_string();
        if status.is_server_error() {
            return Err(FetchError::ServerStatus(status.as_u16()));
        }
        if status.is_client_error() {
            return Err(FetchError::ClientStatus(status.as_u16()));
        }

        let body = response.text().await.map_err(|e| classify_error(url, &e))?;
        debug!(url, status = status.as_u16(), bytes = body.len(), "Fetch complete");

        Ok(FetchResponse {
            body,
            status_code: status.as_u16(),
            final_url,
        })
    }
}

fn classify_error(url: &str, err: &reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::Timeout;
    }
    if err.is_builder() {
        return FetchError::InvalidUrl(url.to_string());
    }
    if is_dns_error(err) {
        let host = err
            .url()
            .and_then(|u| u.host_str())
            .unwrap_or(url)
            .to_string();
        return FetchError::DnsFailure(host);
    }
    FetchError::Connection(err.to_string())
}

/// hyper reports resolver failures only through the error message chain
fn is_dns_error(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        let message = e.to_string().to_lowercase();
        if message.contains("dns error")
            || message.contains("failed to lookup address")
            || message.contains("name or service not known")
            || message.contains("no such host")
        {
            return true;
        }
        current = e.source();
    }
    false
}
