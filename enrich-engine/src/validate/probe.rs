//! Network probes used to verify domains and email hosts
//!
//! [`ProbeMemo`] caches each answer for the lifetime of one resolution so
//! re-validation after a backup merge never repeats a DNS or HTTP call. Every
//! probe is bounded by the request deadline; one that cannot finish in time
//! counts as failed. HTTP checks contact the candidate host, so each one
//! waits for a [`HostThrottle`] slot like any fetch.

use crate::dns::DnsClient;
use crate::tiers::HostThrottle;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

#[async_trait]
pub trait DomainProbe: Send + Sync {
    /// Domain has at least one A/AAAA record
    async fn resolves(&self, domain: &str) -> bool;

    /// Domain publishes at least one MX record
    async fn has_mx(&self, domain: &str) -> bool;

    /// A HEAD of `url` got any HTTP response, whatever its status
    async fn http_answers(&self, url: &str) -> bool;
}

/// Probes backed by real DNS and HTTP
pub struct NetworkProbe {
    dns: Arc<dyn DnsClient>,
    client: reqwest::Client,
}

impl NetworkProbe {
    pub fn new(dns: Arc<dyn DnsClient>, client: reqwest::Client) -> Self {
        Self { dns, client }
    }
}

#[async_trait]
impl DomainProbe for NetworkProbe {
    async fn resolves(&self, domain: &str) -> bool {
        match self.dns.lookup_ip(domain).await {
            Ok(addresses) => !addresses.is_empty(),
            Err(e) => {
                debug!(domain, error = %e, "Domain does not resolve");
                false
            }
        }
    }

    async fn has_mx(&self, domain: &str) -> bool {
        match self.dns.lookup_mx(domain).await {
            Ok(exchanges) => !exchanges.is_empty(),
            Err(e) => {
                debug!(domain, error = %e, "No MX records");
                false
            }
        }
    }

    async fn http_answers(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(response) => {
                debug!(url, status = response.status().as_u16(), "HTTP check answered");
                true
            }
            Err(e) => {
                debug!(url, error = %e, "HTTP check failed");
                false
            }
        }
    }
}

/// Schemes tried, in order, when checking that a host answers HTTP
const HTTP_CHECK_SCHEMES: [&str; 2] = ["https", "http"];

/// Per-resolution probe answers
#[derive(Default)]
pub struct ProbeMemo {
    resolves: HashMap<String, bool>,
    has_mx: HashMap<String, bool>,
    http: HashMap<String, bool>,
    throttle: Option<HostThrottle>,
}

impl ProbeMemo {
    /// Memo whose HTTP checks run unthrottled
    pub fn new() -> Self {
        Self::default()
    }

    /// Memo whose HTTP checks share `throttle` with the scraping tiers
    pub fn with_throttle(throttle: HostThrottle) -> Self {
        Self {
            throttle: Some(throttle),
            ..Self::default()
        }
    }

    /// A page was fetched from `host`, so it both resolves and answers HTTP
    pub fn mark_reachable(&mut self, host: &str) {
        let host = host.to_lowercase();
        self.resolves.insert(host.clone(), true);
        self.http.insert(host, true);
    }

    /// A fetch failed DNS resolution for `host`
    pub fn mark_unresolvable(&mut self, host: &str) {
        let host = host.to_lowercase();
        self.resolves.insert(host.clone(), false);
        self.http.insert(host, false);
    }

    pub async fn resolves(&mut self, probe: &dyn DomainProbe, host: &str, deadline: Instant) -> bool {
        let host = host.to_lowercase();
        if let Some(answer) = self.resolves.get(&host) {
            return *answer;
        }
        let answer = timeout_at(deadline, probe.resolves(&host)).await.unwrap_or(false);
        self.resolves.insert(host, answer);
        answer
    }

    pub async fn has_mx(&mut self, probe: &dyn DomainProbe, host: &str, deadline: Instant) -> bool {
        let host = host.to_lowercase();
        if let Some(answer) = self.has_mx.get(&host) {
            return *answer;
        }
        let answer = timeout_at(deadline, probe.has_mx(&host)).await.unwrap_or(false);
        self.has_mx.insert(host, answer);
        answer
    }

    pub async fn http_reachable(&mut self, probe: &dyn DomainProbe, host: &str, deadline: Instant) -> bool {
        let host = host.to_lowercase();
        if let Some(answer) = self.http.get(&host) {
            return *answer;
        }
        let answer = self.check_http(probe, &host, deadline).await;
        self.http.insert(host, answer);
        answer
    }

    async fn check_http(&self, probe: &dyn DomainProbe, host: &str, deadline: Instant) -> bool {
        for scheme in HTTP_CHECK_SCHEMES {
            if let Some(throttle) = &self.throttle {
                if timeout_at(deadline, throttle.acquire(host)).await.is_err() {
                    return false;
                }
            }
            let url = format!("{}://{}/", scheme, host);
            match timeout_at(deadline, probe.http_answers(&url)).await {
                Ok(true) => return true,
                Ok(false) => continue,
                Err(_) => {
                    debug!(url, "HTTP check cut off by request deadline");
                    return false;
                }
            }
        }
        false
    }
}
