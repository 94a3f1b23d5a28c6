//! Render Tier: headless browser rendering for JavaScript-heavy pages
//!
//! Rendering is delegated to an external headless-browser service: the tier
//! POSTs `{"url": …}` to the configured endpoint and receives the rendered
//! HTML back. Without an endpoint the tier is [`DisabledRenderer`], which
//! always reports [`RenderError::Unavailable`].

use crate::extract::PageContent;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Rendered page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderOutput {
    pub extracted_text: String,
    pub extracted_links: Vec<String>,
    pub title: Option<String>,
    pub meta: BTreeMap<String, String>,
    pub structured_data: Vec<Value>,
    pub script_sources: Vec<String>,
}

impl From<PageContent> for RenderOutput {
    fn from(page: PageContent) -> Self {
        Self {
            extracted_text: page.text,
            extracted_links: page.links,
            title: page.title,
            meta: page.meta,
            structured_data: page.structured_data,
            script_sources: page.script_sources,
        }
    }
}

impl From<RenderOutput> for PageContent {
    fn from(output: RenderOutput) -> Self {
        Self {
            title: output.title,
            meta: output.meta,
            text: output.extracted_text,
            links: output.extracted_links,
            structured_data: output.structured_data,
            script_sources: output.script_sources,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("rendering is not configured")]
    Unavailable,

    #[error("render timed out")]
    Timeout,

    #[error("render failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<RenderOutput, RenderError>;

    /// False when every call would answer [`RenderError::Unavailable`]
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Render tier used when no rendering endpoint is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledRenderer;

#[async_trait]
impl Renderer for DisabledRenderer {
    async fn render(&self, _url: &str) -> Result<RenderOutput, RenderError> {
        Err(RenderError::Unavailable)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

#[derive(Serialize)]
struct RenderRequest<'a> {
    url: &'a str,
}

/// Client for a headless-browser rendering service
pub struct BrowserRenderer {
    client: reqwest::Client,
    endpoint: String,
}

impl BrowserRenderer {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Renderer for BrowserRenderer {
    async fn render(&self, url: &str) -> Result<RenderOutput, RenderError> {
        debug!(url, endpoint = %self.endpoint, "Rendering page");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&RenderRequest { url })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RenderError::Timeout
                } else {
                    RenderError::Failed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(RenderError::Failed(format!(
                "render service returned {}",
                response.status()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| RenderError::Failed(e.to_string()))?;
        debug!(url, bytes = html.len(), "Render complete");

        Ok(PageContent::from_html(&html).into())
    }
}
