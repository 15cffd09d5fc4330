//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients (one per configured proxy, or a single direct one)
//! - Rotating the User-Agent header and attaching operator credentials
//! - Retry with exponential backoff for transient failures
//! - The politeness delay after every successful fetch
//!
//! Retries are invisible to callers: `fetch` returns either the final body or
//! a [`FetchError`] that the crawl loop treats as fatal for the page.

use crate::config::FetcherConfig;
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE, USER_AGENT};
use reqwest::{Client, Proxy, StatusCode};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Status codes retried with backoff
const RETRY_STATUSES: [StatusCode; 5] = [
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// A page that could not be fetched
#[derive(Debug, Error)]
pub enum FetchError {
    /// Non-success status outside the retry set
    #[error("HTTP {status} for {url}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// Every attempt ended in a retryable failure
    #[error("Gave up on {url} after {attempts} attempts: {last_error}")]
    Exhausted {
        url: String,
        attempts: u32,
        last_error: String,
        body: Option<String>,
    },

    #[error("Invalid header {name}: {message}")]
    InvalidHeader { name: String, message: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl FetchError {
    /// Body of the last response, when the server sent one
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Status { body, .. } => Some(body),
            Self::Exhausted { body, .. } => body.as_deref(),
            _ => None,
        }
    }
}

/// Uniformly sampled pause between `min_secs` and `max_secs`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Jitter {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl Jitter {
    pub fn new(min_secs: f64, max_secs: f64) -> Self {
        Self { min_secs, max_secs }
    }

    pub fn none() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn sample(&self) -> Duration {
        if self.max_secs <= self.min_secs {
            return Duration::from_secs_f64(self.min_secs.max(0.0));
        }
        let secs = rand::thread_rng().gen_range(self.min_secs..=self.max_secs);
        Duration::from_secs_f64(secs)
    }

    /// Sleeps for a sampled duration
    pub async fn pause(&self) {
        let duration = self.sample();
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Session credentials as cookie pairs
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pairs: Vec<(String, String)>,
}

impl Credentials {
    /// Parses a `k=v; k2=v2` cookie string
    ///
    /// Segments without `=` are skipped; `None` when no pair remains.
    pub fn parse(input: &str) -> Option<Self> {
        let pairs: Vec<(String, String)> = input
            .trim()
            .trim_matches(';')
            .split(';')
            .filter_map(|segment| {
                let (key, value) = segment.trim().split_once('=')?;
                let key = key.trim();
                (!key.is_empty()).then(|| (key.to_string(), value.trim().to_string()))
            })
            .collect();

        (!pairs.is_empty()).then_some(Self { pairs })
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Value of the `Cookie` request header
    pub fn header_value(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

// Cookie values are secrets; only the count is ever printed.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credentials({} pairs)", self.pairs.len())
    }
}

/// Builds an HTTP client, optionally routed through `proxy`
pub fn build_http_client(config: &FetcherConfig, proxy: Option<&str>) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = proxy {
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    builder.build()
}

enum Attempt {
    Success(String),
    Retryable { error: String, body: Option<String> },
    Fatal(FetchError),
}

/// Sequential HTTP session used by the crawl loop
pub struct Fetcher {
    direct: Client,
    proxied: Vec<(String, Client)>,
    user_agents: Vec<String>,
    headers: HeaderMap,
    credentials: Option<Credentials>,
    max_attempts: u32,
    backoff_base: Duration,
    politeness: Jitter,
}

impl Fetcher {
    /// Creates a fetcher from configuration
    ///
    /// `politeness` is the pause taken after every successful fetch.
    pub fn new(config: &FetcherConfig, politeness: Jitter) -> Result<Self, FetchError> {
        let direct = build_http_client(config, None)?;
        let proxied = config
            .proxies
            .iter()
            .map(|proxy| Ok((proxy.clone(), build_http_client(config, Some(proxy))?)))
            .collect::<Result<Vec<_>, FetchError>>()?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                FetchError::InvalidHeader {
                    name: name.clone(),
                    message: e.to_string(),
                }
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| FetchError::InvalidHeader {
                name: name.clone(),
                message: e.to_string(),
            })?;
            headers.insert(header_name, header_value);
        }

        let user_agents = config
            .user_agents
            .iter()
            .filter(|ua| !ua.trim().is_empty())
            .cloned()
            .collect();

        let credentials = match config.cookie.as_deref().map(str::trim) {
            Some("") | None => None,
            Some(cookie) => {
                let parsed = Credentials::parse(cookie);
                if parsed.is_none() {
                    tracing::warn!("Configured cookie has no k=v pairs, ignoring it");
                }
                parsed
            }
        };

        Ok(Self {
            direct,
            proxied,
            user_agents,
            headers,
            credentials,
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            politeness,
        })
    }

    /// Replaces the session credentials
    pub fn set_credentials(&mut self, credentials: Credentials) {
        tracing::info!("Session credentials updated ({} cookie pairs)", credentials.len());
        self.credentials = Some(credentials);
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Fetches a URL with retry logic
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | 200 | Return body, then politeness delay |
    /// | 429, 500, 502, 503, 504 | Retry with backoff |
    /// | Transport error (connect, timeout, body read) | Retry with backoff |
    /// | Any other status | `FetchError::Status` |
    /// | Attempts exhausted | `FetchError::Exhausted` |
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let mut last_error = String::new();
        let mut last_body = None;

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                let backoff = self.backoff(attempt - 1);
                tracing::debug!("Retrying {} in {:?} (attempt {})", url, backoff, attempt);
                tokio::time::sleep(backoff).await;
            }

            match self.attempt(url).await {
                Attempt::Success(body) => {
                    self.politeness.pause().await;
                    return Ok(body);
                }
                Attempt::Retryable { error, body } => {
                    tracing::warn!(
                        "Attempt {}/{} for {} failed: {}",
                        attempt,
                        self.max_attempts,
                        url,
                        error
                    );
                    last_error = error;
                    last_body = body;
                }
                Attempt::Fatal(e) => return Err(e),
            }
        }

        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts: self.max_attempts,
            last_error,
            body: last_body,
        })
    }

    /// Backoff before retry `n` (1-based): `base * 2^(n-1)`
    fn backoff(&self, retry: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(retry.saturating_sub(1))
    }

    async fn attempt(&self, url: &str) -> Attempt {
        let request = self.build_request(url);

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let error = if e.is_timeout() {
                    "request timeout".to_string()
                } else if e.is_connect() {
                    format!("connection failed: {}", e)
                } else {
                    e.to_string()
                };
                return Attempt::Retryable { error, body: None };
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Attempt::Retryable {
                    error: format!("failed to read body: {}", e),
                    body: None,
                }
            }
        };

        if status == StatusCode::OK {
            Attempt::Success(body)
        } else if RETRY_STATUSES.contains(&status) {
            Attempt::Retryable {
                error: format!("HTTP {}", status.as_u16()),
                body: Some(body),
            }
        } else {
            Attempt::Fatal(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            })
        }
    }

    /// Picks a client and identity headers for one request
    fn build_request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut rng = rand::thread_rng();

        let client = match self.proxied.choose(&mut rng) {
            Some((proxy, client)) => {
                tracing::trace!("Fetching {} via proxy {}", url, proxy);
                client
            }
            None => &self.direct,
        };

        let mut request = client.get(url).headers(self.headers.clone());
        if let Some(user_agent) = self.user_agents.choose(&mut rng) {
            request = request.header(USER_AGENT, user_agent.as_str());
        }
        if let Some(credentials) = &self.credentials {
            request = request.header(COOKIE, credentials.header_value());
        }
        request
    }
}
