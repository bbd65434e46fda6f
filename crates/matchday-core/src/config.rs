//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the
//! push socket endpoint, the REST base URL, and per-resource cache TTLs.
//!
//! Configuration is stored at `~/.config/matchday/config.json`. Missing
//! fields fall back to defaults, and a few fields can be overridden from
//! the environment (see [`Config::apply_env_overrides`]).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::ResourceKind;

/// Application name used for config directory paths
const APP_NAME: &str = "matchday";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Close code the push server uses to reject a token.
pub const DEFAULT_AUTH_REJECT_CODE: u16 = 4001;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub transport: TransportConfig,
    pub api: ApiConfig,
    pub cache: CacheConfig,
}

/// Push socket settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub endpoint_url: String,
    /// When set, no socket is opened until a non-empty token is known.
    pub require_auth: bool,
    pub heartbeat_interval_ms: u64,
    /// Silence longer than this on an open socket marks it dead.
    pub stale_after_ms: u64,
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
    pub auth_reject_code: u16,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "ws://localhost:8080/ws".to_string(),
            require_auth: true,
            heartbeat_interval_ms: 25_000,
            stale_after_ms: 60_000,
            reconnect_base_ms: 1_000,
            reconnect_max_ms: 15_000,
            auth_reject_code: DEFAULT_AUTH_REJECT_CODE,
        }
    }
}

impl TransportConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }

    pub fn reconnect_base(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }
}

/// REST settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Origin of the embedding page, if any. Validators are only honored
    /// when this matches the API origin.
    pub page_origin: Option<String>,
    pub request_timeout_secs: u64,
    pub conditional_requests: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            page_origin: None,
            request_timeout_secs: 30,
            conditional_requests: true,
        }
    }
}

impl ApiConfig {
    /// Whether cached validators may be sent as conditional headers.
    pub fn validators_enabled(&self) -> bool {
        if !self.conditional_requests {
            return false;
        }
        let Some(ref page) = self.page_origin else {
            return true;
        };
        match (Url::parse(&self.base_url), Url::parse(page)) {
            (Ok(api), Ok(page)) => api.origin() == page.origin(),
            _ => false,
        }
    }
}

/// Per-resource time-to-live, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub news_ttl_ms: u64,
    pub standings_ttl_ms: u64,
    pub fixtures_ttl_ms: u64,
    pub results_ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            news_ttl_ms: 60_000,
            // Standings are also push-updated, so a long TTL is enough.
            standings_ttl_ms: 240_000,
            fixtures_ttl_ms: 5_000,
            results_ttl_ms: 5_000,
        }
    }
}

impl CacheConfig {
    pub fn ttl_for(&self, kind: ResourceKind) -> Duration {
        let ms = match kind {
            ResourceKind::News => self.news_ttl_ms,
            ResourceKind::Standings => self.standings_ttl_ms,
            ResourceKind::Fixtures => self.fixtures_ttl_ms,
            ResourceKind::Results => self.results_ttl_ms,
        };
        Duration::from_millis(ms)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `MATCHDAY_WS_URL`, `MATCHDAY_API_URL` and `MATCHDAY_PAGE_ORIGIN`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("MATCHDAY_WS_URL") {
            self.transport.endpoint_url = url;
        }
        if let Ok(url) = std::env::var("MATCHDAY_API_URL") {
            self.api.base_url = url;
        }
        if let Ok(origin) = std::env::var("MATCHDAY_PAGE_ORIGIN") {
            self.api.page_origin = Some(origin).filter(|o| !o.is_empty());
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}
