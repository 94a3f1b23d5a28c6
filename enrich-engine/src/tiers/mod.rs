//! Scraping tiers
//!
//! - **Fetch**: plain HTTP GET, one attempt per call
//! - **Render**: headless browser rendering, only on escalation
//! - **Throttle**: per-host spacing shared by both tiers
//!
//! Retry, escalation and deadlines are orchestrator policy; the tiers only
//! report what happened.

pub mod fetch;
pub mod render;
pub mod throttle;

pub use fetch::{FetchError, FetchResponse, Fetcher, HttpFetcher};
pub use render::{BrowserRenderer, DisabledRenderer, RenderError, RenderOutput, Renderer};
pub use throttle::HostThrottle;

use crate::config::HttpConfig;
use std::time::Duration;

/// Build the shared reqwest client from configuration
pub fn build_http_client(config: &HttpConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .timeout(Duration::from_secs(config.timeout_secs))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
}
