//! API client for the league data REST service.
//!
//! `ApiClient` issues GET requests against the configured base URL,
//! unwraps the `{ok, data, error}` envelope and surfaces the resource
//! validator so the cache can make conditional requests later.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ApiConfig;

use super::FetchError;

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of retries for rate-limited (429) requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Outcome of a single GET against the REST service.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResponse {
    /// The server confirmed the supplied validator is still current.
    NotModified,
    /// A fresh body, plus the validator the server attached to it, if any.
    Modified {
        data: Value,
        validator: Option<String>,
    },
}

/// The REST seam used by the cache store.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `path`, sending `validator` as a conditional header when present.
    async fn fetch(&self, path: &str, validator: Option<&str>) -> Result<FetchResponse, FetchError>;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    data: Option<Value>,
    error: Option<String>,
    #[serde(default)]
    meta: Option<EnvelopeMeta>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeMeta {
    version: Option<Value>,
    etag: Option<String>,
}

impl EnvelopeMeta {
    fn validator(&self) -> Option<String> {
        match self.version {
            Some(Value::String(ref s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(ref n)) => Some(n.to_string()),
            _ => self.etag.clone().filter(|e| !e.is_empty()),
        }
    }
}

/// API client for the league data service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling,
/// and clones share the bearer token.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: Arc::new(RwLock::new(None)),
        })
    }

    /// Set (or clear) the bearer token for authenticated requests
    pub fn set_token(&self, token: Option<&str>) {
        let mut guard = self.token.write().unwrap_or_else(PoisonError::into_inner);
        *guard = token.filter(|t| !t.is_empty()).map(str::to_string);
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn headers(&self, validator: Option<&str>) -> Result<header::HeaderMap, FetchError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let token = self.token.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(ref token) = *token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| FetchError::InvalidResponse(format!("Invalid token header: {}", e)))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        if let Some(validator) = validator {
            if let Ok(value) = header::HeaderValue::from_str(validator) {
                headers.insert(header::IF_NONE_MATCH, value);
            } else {
                debug!(validator, "Validator is not a valid header value, sending unconditional request");
            }
        }
        Ok(headers)
    }

    fn parse_envelope(body: &str, etag: Option<String>) -> Result<FetchResponse, FetchError> {
        let envelope: Envelope = serde_json::from_str(body)
            .map_err(|e| FetchError::InvalidResponse(format!("Malformed envelope: {}", e)))?;

        if !envelope.ok {
            return Err(FetchError::Rejected(
                envelope.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        let data = envelope
            .data
            .ok_or_else(|| FetchError::InvalidResponse("Envelope has no data".to_string()))?;
        let validator = etag.or_else(|| envelope.meta.as_ref().and_then(EnvelopeMeta::validator));

        Ok(FetchResponse::Modified { data, validator })
    }
}

#[async_trait]
impl Fetcher for ApiClient {
    async fn fetch(&self, path: &str, validator: Option<&str>) -> Result<FetchResponse, FetchError> {
        let url = self.url(path);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .get(&url)
                .headers(self.headers(validator)?)
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::NOT_MODIFIED {
                return Ok(FetchResponse::NotModified);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                retries += 1;
                if retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(FetchError::RateLimited);
                }
                warn!(url = %url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2; // Exponential backoff
                continue;
            }

            let etag = response
                .headers()
                .get(header::ETAG)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            let body = response.text().await?;

            if !status.is_success() {
                return Err(FetchError::from_status(status, &body));
            }

            return Self::parse_envelope(&body, etag);
        }
    }
}
