//! Engine configuration
//!
//! Resolution order for the config file: `--config` argument → `ENRICH_CONFIG`
//! environment variable → `<config_dir>/enrich/enrich-engine.toml` → defaults.
//! Individual knobs can then be overridden with `ENRICH_*` environment
//! variables. Thresholds and TTLs are business tuning decisions, so every one
//! of them is configurable; the configuration is validated once, when the
//! orchestrator is built, never per request.

use enrich_common::config::{config_file_path, load_toml_config, LoggingConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Module name used for config file lookup and root folder resolution
pub const MODULE_NAME: &str = "enrich-engine";

/// Environment variable pointing at an explicit config file
pub const CONFIG_PATH_ENV: &str = "ENRICH_CONFIG";

/// Longest accepted per-request deadline (one day)
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Longest accepted base backoff delay (one hour)
pub const MAX_BACKOFF_BASE_MS: u64 = 60 * 60 * 1000;

/// Longest accepted cache TTL, positive or negative (ten years)
pub const MAX_CACHE_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Invalid engine configuration (fails fast at construction)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("discard threshold {discard} must be between 1 and 100")]
    DiscardThreshold { discard: u8 },

    #[error("acceptance threshold {acceptance} must be between the discard threshold {discard} and 100")]
    AcceptanceThreshold { acceptance: u8, discard: u8 },

    #[error("concurrency must be at least 1")]
    Concurrency,

    #[error("{field} must be greater than zero")]
    NonPositive { field: &'static str },

    #[error("{field} = {value} exceeds the maximum of {max}")]
    TooLarge { field: &'static str, value: u64, max: u64 },

    #[error("invalid value for {var}: {value}")]
    InvalidOverride { var: String, value: String },
}

/// HTTP client settings shared by the fetch tier and backup sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!(
                "EnrichEngine/{} (+https://github.com/enrich/enrich-engine)",
                env!("CARGO_PKG_VERSION")
            ),
            connect_timeout_secs: 5,
            timeout_secs: 15,
        }
    }
}

/// Policy knobs for resolution, caching and batching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Overall confidence at which a result counts as resolved
    pub acceptance_threshold: u8,
    /// Fields scoring below this are nulled
    pub discard_threshold: u8,
    /// Fetch retries after the first attempt
    pub max_retries: u32,
    /// Positive cache TTL
    pub cache_ttl_seconds: u64,
    /// Negative (unresolved) cache TTL
    pub negative_cache_ttl_seconds: u64,
    /// Batch worker pool size
    pub concurrency: usize,
    /// Hard per-request deadline
    pub request_timeout_secs: u64,
    pub backoff_base_ms: u64,
    pub backoff_multiplier: u32,
    /// Visible characters below which a fetched page escalates to rendering
    pub min_content_length: usize,
    /// Minimum spacing between requests to the same host
    pub host_min_interval_ms: u64,
    /// Headless browser rendering endpoint; rendering is disabled when absent
    pub render_endpoint: Option<String>,
    pub http: HttpConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 70,
            discard_threshold: 40,
            max_retries: 3,
            cache_ttl_seconds: 7 * 24 * 60 * 60,
            negative_cache_ttl_seconds: 60 * 60,
            concurrency: 5,
            request_timeout_secs: 30,
            backoff_base_ms: 2000,
            backoff_multiplier: 2,
            min_content_length: 500,
            host_min_interval_ms: 1000,
            render_endpoint: None,
            http: HttpConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discard_threshold == 0 || self.discard_threshold > 100 {
            return Err(ConfigError::DiscardThreshold {
                discard: self.discard_threshold,
            });
        }
        if self.acceptance_threshold < self.discard_threshold || self.acceptance_threshold > 100 {
            return Err(ConfigError::AcceptanceThreshold {
                acceptance: self.acceptance_threshold,
                discard: self.discard_threshold,
            });
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Concurrency);
        }
        if self.cache_ttl_seconds == 0 {
            return Err(ConfigError::NonPositive { field: "cache_ttl_seconds" });
        }
        if self.negative_cache_ttl_seconds == 0 {
            return Err(ConfigError::NonPositive {
                field: "negative_cache_ttl_seconds",
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::NonPositive {
                field: "request_timeout_secs",
            });
        }
        if self.backoff_multiplier == 0 {
            return Err(ConfigError::NonPositive {
                field: "backoff_multiplier",
            });
        }
        let upper_bounds = [
            ("cache_ttl_seconds", self.cache_ttl_seconds, MAX_CACHE_TTL_SECS),
            (
                "negative_cache_ttl_seconds",
                self.negative_cache_ttl_seconds,
                MAX_CACHE_TTL_SECS,
            ),
            ("request_timeout_secs", self.request_timeout_secs, MAX_REQUEST_TIMEOUT_SECS),
            ("backoff_base_ms", self.backoff_base_ms, MAX_BACKOFF_BASE_MS),
        ];
        for (field, value, max) in upper_bounds {
            if value > max {
                return Err(ConfigError::TooLarge { field, value, max });
            }
        }
        Ok(())
    }

    pub fn positive_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn negative_ttl(&self) -> Duration {
        Duration::from_secs(self.negative_cache_ttl_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn host_min_interval(&self) -> Duration {
        Duration::from_millis(self.host_min_interval_ms)
    }

    /// Delay before retry number `retry` (0-based): `base * multiplier^retry`
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = u64::from(self.backoff_multiplier).saturating_pow(retry);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }

    /// Apply `ENRICH_*` environment overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        override_from_env("ENRICH_ACCEPTANCE_THRESHOLD", &mut self.acceptance_threshold)?;
        override_from_env("ENRICH_DISCARD_THRESHOLD", &mut self.discard_threshold)?;
        override_from_env("ENRICH_MAX_RETRIES", &mut self.max_retries)?;
        override_from_env("ENRICH_CACHE_TTL_SECONDS", &mut self.cache_ttl_seconds)?;
        override_from_env(
            "ENRICH_NEGATIVE_CACHE_TTL_SECONDS",
            &mut self.negative_cache_ttl_seconds,
        )?;
        override_from_env("ENRICH_CONCURRENCY", &mut self.concurrency)?;
        override_from_env("ENRICH_REQUEST_TIMEOUT_SECS", &mut self.request_timeout_secs)?;
        override_from_env("ENRICH_HOST_MIN_INTERVAL_MS", &mut self.host_min_interval_ms)?;
        if let Ok(endpoint) = std::env::var("ENRICH_RENDER_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.render_endpoint = Some(endpoint.trim().to_string());
            }
        }
        Ok(())
    }
}

fn override_from_env<T>(var: &str, target: &mut T) -> Result<(), ConfigError>
where
    T: std::str::FromStr,
{
    if let Ok(raw) = std::env::var(var) {
        let parsed = raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidOverride {
            var: var.to_string(),
            value: raw.clone(),
        })?;
        *target = parsed;
        info!(var, value = %raw.trim(), "Engine setting overridden from environment");
    }
    Ok(())
}

/// HTTP listener settings for `serve`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5790,
        }
    }
}

/// Contents of `enrich-engine.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub engine: EngineConfig,
}

/// Locate the config file following the documented priority
pub fn settings_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    config_file_path(MODULE_NAME)
}

/// Load settings, apply environment overrides and validate the engine section
pub fn load_settings(cli_arg: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings: Settings = match settings_path(cli_arg) {
        Some(path) => load_toml_config(&path)?,
        None => {
            warn!("Could not determine config directory, using defaults");
            Settings::default()
        }
    };
    settings.engine.apply_env_overrides()?;
    settings.engine.validate()?;
    Ok(settings)
}
