//! HTTP client for page fetching with rate limiting and politeness delays
//!
//! Every request waits for the rate limiter, then sleeps a randomized delay,
//! then runs under an explicit timeout. Transient failures (connection
//! errors, 429, 5xx) are retried with backoff; timeouts are returned as-is so
//! the session supervisor sees them.
//!
//! Each client carries one [`SessionIdentity`] (user agent plus optional
//! proxy) drawn from the configured pools; a restarted session draws again.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, direct::NotKeyed},
};
use reqwest::{
    Client, Proxy, StatusCode,
    header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT},
};
use tracing::{debug, info, warn};

use crate::domain::PageError;
use crate::infrastructure::config::{NetworkConfig, SessionConfig};
use crate::infrastructure::retry_calculator::RetryCalculator;

/// HTTP client configuration for page fetching
#[derive(Debug, Clone, serde::Serialize)]
pub struct HttpClientConfig {
    pub user_agents: Vec<String>,
    pub proxies: Vec<String>,
    pub timeout_seconds: u64,
    pub max_requests_per_second: u32,
    pub request_delay_ms: u64,
    pub request_jitter_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl HttpClientConfig {
    pub fn from_settings(network: &NetworkConfig, session: &SessionConfig) -> Self {
        Self {
            user_agents: network
                .user_agents
                .iter()
                .filter(|ua| !ua.trim().is_empty())
                .cloned()
                .collect(),
            proxies: network.proxies.clone(),
            timeout_seconds: session.page_timeout_secs,
            max_requests_per_second: network.max_requests_per_second,
            request_delay_ms: network.request_delay_ms,
            request_jitter_ms: network.request_jitter_ms,
            max_retries: network.max_retries,
            retry_base_delay_ms: network.retry_base_delay_ms,
        }
    }

    /// Draw an identity from the pools, avoiding `previous` where the pool
    /// has an alternative.
    pub fn pick_identity(&self, previous: Option<&SessionIdentity>) -> SessionIdentity {
        let user_agent = pick_other(&self.user_agents, previous.map(|p| p.user_agent.as_str()))
            .unwrap_or(FALLBACK_USER_AGENT)
            .to_string();
        let proxy = pick_other(&self.proxies, previous.and_then(|p| p.proxy.as_deref())).map(str::to_string);
        SessionIdentity { user_agent, proxy }
    }
}

const FALLBACK_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

fn pick_other<'a>(pool: &'a [String], previous: Option<&str>) -> Option<&'a str> {
    let candidates: Vec<&str> = pool
        .iter()
        .map(String::as_str)
        .filter(|entry| pool.len() < 2 || Some(*entry) != previous)
        .collect();
    if candidates.is_empty() {
        return pool.first().map(String::as_str);
    }
    Some(candidates[fastrand::usize(..candidates.len())])
}

/// What a site sees of one session.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SessionIdentity {
    pub user_agent: String,
    pub proxy: Option<String>,
}

/// A fetched body with the URL it was finally served from.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub url: String,
    pub body: String,
}

/// Rate-limited HTTP client. One instance is one "session": it owns the
/// cookie jar, and a restart replaces the whole client.
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    retry: RetryCalculator,
    config: HttpClientConfig,
    identity: SessionIdentity,
}

impl HttpClient {
    /// Client with a freshly drawn identity.
    pub fn new(config: HttpClientConfig) -> Result<Self, PageError> {
        let identity = config.pick_identity(None);
        Self::with_identity(config, identity)
    }

    pub fn with_identity(config: HttpClientConfig, identity: SessionIdentity) -> Result<Self, PageError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&identity.user_agent)
                .map_err(|e| PageError::Unresponsive(format!("invalid user agent: {e}")))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("text/html,application/xhtml+xml"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-IN,en;q=0.9"));

        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(10));
        builder = match &identity.proxy {
            Some(proxy) => builder.proxy(
                Proxy::all(proxy.as_str())
                    .map_err(|e| PageError::Unresponsive(format!("invalid proxy '{proxy}': {e}")))?,
            ),
            None => builder.no_proxy(),
        };
        let client = builder
            .build()
            .map_err(|e| PageError::Unresponsive(format!("failed to create HTTP client: {e}")))?;
        info!(
            "🪪 New session identity: {} via {}",
            identity.user_agent,
            identity.proxy.as_deref().unwrap_or("direct connection")
        );

        let rps = NonZeroU32::new(config.max_requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rps));
        let retry = RetryCalculator::new(config.max_retries, config.retry_base_delay_ms, 30_000, 1.5, true);

        Ok(Self {
            client,
            rate_limiter,
            retry,
            config,
            identity,
        })
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    async fn polite_pause(&self) {
        self.rate_limiter.until_ready().await;
        let jitter = if self.config.request_jitter_ms > 0 {
            fastrand::u64(0..=self.config.request_jitter_ms)
        } else {
            0
        };
        let delay = self.config.request_delay_ms + jitter;
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<Fetched, PageError> {
        self.polite_pause().await;
        debug!("Fetching URL: {}", url);

        let timeout = Duration::from_secs(self.config.timeout_seconds);
        let request = async {
            let response = self.client.get(url).send().await?;
            let status = response.status();
            let final_url = response.url().to_string();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, final_url, body))
        };

        let (status, final_url, body) = match tokio::time::timeout(timeout, request).await {
            Err(_) => return Err(PageError::timeout(url, self.config.timeout_seconds)),
            Ok(Err(e)) if e.is_timeout() => return Err(PageError::timeout(url, self.config.timeout_seconds)),
            Ok(Err(e)) => return Err(PageError::navigation(url, e.to_string())),
            Ok(Ok(fetched)) => fetched,
        };

        if !status.is_success() {
            return Err(PageError::Http { status: status.as_u16(), url: url.to_string() });
        }

        if final_url != url {
            debug!("{} redirected to {}", url, final_url);
        }
        debug!("Fetched {} ({}, {} bytes)", final_url, status, body.len());
        Ok(Fetched { url: final_url, body })
    }

    /// Fetch a URL's body as text, retrying transient failures.
    pub async fn get_text(&self, url: &str) -> Result<Fetched, PageError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(fetched) => return Ok(fetched),
                Err(e) if is_transient(&e) && self.retry.should_retry(attempt) => {
                    attempt += 1;
                    let delay = self.retry.calculate_delay(attempt);
                    warn!("🔄 Retry {}/{} for {} in {:?}: {}", attempt, self.retry.max_retries(), url, delay, e);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_transient(error: &PageError) -> bool {
    match error {
        PageError::Navigation { .. } => true,
        PageError::Http { status, .. } => {
            *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || (500..600).contains(status)
        }
        _ => false,
    }
}
