//! HTTP client for crawling with pacing, identity rotation and typed failures
//!
//! Every request waits a randomized delay (longer before retries), passes a
//! token-bucket limiter and goes out with the next browser header set in the
//! rotation. Transient failures are retried with exponential backoff,
//! rate-limited answers wait longer, other 4xx answers are returned at once.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, direct::NotKeyed},
};
use reqwest::{
    Client, ClientBuilder, Response,
    header::{ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER, USER_AGENT},
};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::{FailureKind, FetchFailure, FetchedPage, PageFetcher};
use crate::infrastructure::config::FetchConfig;
use crate::infrastructure::retry_policy::{DelayRange, RetryCalculator};

/// Markers of the bot-check interstitial served with a 200 status
const CAPTCHA_MARKERS: [&str; 2] = ["/errors/validateCaptcha", "Type the characters you see in this image"];

/// Rate-limited, retrying HTTP client
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    config: FetchConfig,
    identities: Vec<HeaderMap>,
    cursor: AtomicUsize,
    retry: RetryCalculator,
}

impl HttpClient {
    /// Create a new HTTP client with the given configuration
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("Failed to create HTTP client")?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.max_requests_per_second).context("Rate limit must be greater than 0")?,
        );

        let identities = if config.user_agents.is_empty() {
            vec![browser_headers(crate::infrastructure::config::defaults::USER_AGENTS[0], &config.accept_language)?]
        } else {
            config
                .user_agents
                .iter()
                .map(|ua| browser_headers(ua, &config.accept_language))
                .collect::<Result<Vec<_>>>()?
        };

        Ok(Self {
            client,
            rate_limiter: RateLimiter::direct(quota),
            cursor: AtomicUsize::new(fastrand::usize(..identities.len())),
            identities,
            retry: RetryCalculator::from_fetch_config(&config),
            config,
        })
    }

    /// Get the configuration
    #[must_use]
    pub const fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn next_identity(&self) -> HeaderMap {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.identities.len();
        self.identities[index].clone()
    }

    fn pacing_delay(&self, attempt: u32) -> Duration {
        let range = if attempt <= 1 {
            DelayRange::new(self.config.min_delay_ms, self.config.max_delay_ms)
        } else {
            DelayRange::new(self.config.retry_min_delay_ms, self.config.retry_max_delay_ms)
        };
        range.sample()
    }

    fn rate_limited_wait(&self, response: &Response) -> Duration {
        let sampled = DelayRange::new(self.config.rate_limited_min_ms, self.config.rate_limited_max_ms).sample();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_default();
        sampled.max(retry_after)
    }

    /// Send a GET with pacing and the retry policy applied.
    /// Returns the response together with the attempt that produced it.
    async fn fetch_response_with_policy(&self, url: &str) -> Result<(Response, u32), FetchFailure> {
        let max_attempts = self.retry.max_attempts();
        let mut last_failure = None;

        for attempt in 1..=max_attempts {
            tokio::time::sleep(self.pacing_delay(attempt)).await;
            self.rate_limiter.until_ready().await;

            info!("🌐 HTTP GET (attempt {}/{}) : {}", attempt, max_attempts, url);
            match self.client.get(url).headers(self.next_identity()).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let Some(kind) = FailureKind::from_status(status) else {
                        return Ok((response, attempt));
                    };

                    let failure = if kind == FailureKind::RateLimited {
                        FetchFailure::RateLimited { url: url.to_string(), status, attempts: attempt }
                    } else {
                        FetchFailure::Status { url: url.to_string(), status, attempts: attempt }
                    };
                    warn!("❌ HTTP {} on attempt {}: {}", status, attempt, url);

                    if !self.retry.should_retry(kind, attempt) {
                        return Err(failure);
                    }
                    let wait = if kind == FailureKind::RateLimited {
                        self.rate_limited_wait(&response)
                    } else {
                        self.retry.calculate_delay(attempt)
                    };
                    debug!("🔄 Waiting {:?} before retrying {}", wait, url);
                    tokio::time::sleep(wait).await;
                    last_failure = Some(failure);
                }
                Err(e) => {
                    warn!("⚠️ Network error on attempt {}: {}", attempt, e);
                    let failure = FetchFailure::Unreachable {
                        url: url.to_string(),
                        reason: e.to_string(),
                        timed_out: e.is_timeout(),
                        attempts: attempt,
                    };
                    if !self.retry.should_retry(FailureKind::Transient, attempt) {
                        return Err(failure);
                    }
                    tokio::time::sleep(self.retry.calculate_delay(attempt)).await;
                    last_failure = Some(failure);
                }
            }
        }

        Err(last_failure.unwrap_or_else(|| FetchFailure::Unreachable {
            url: url.to_string(),
            reason: "no attempts configured".to_string(),
            timed_out: false,
            attempts: 0,
        }))
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchFailure> {
        let (response, attempts) = self.fetch_response_with_policy(url).await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        let body = response.text().await.map_err(|e| body_read_failure(url, &e, attempts))?;

        if is_captcha_page(&body) {
            warn!("🤖 Bot check served for {}", url);
            return Err(FetchFailure::RateLimited {
                url: url.to_string(),
                status,
                attempts,
            });
        }

        debug!("Successfully fetched: {} ({} chars)", url, body.len());
        Ok(FetchedPage {
            url: url.to_string(),
            final_url,
            status,
            body,
        })
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchFailure> {
        let (response, attempts) = self.fetch_response_with_policy(url).await?;
        let bytes = response.bytes().await.map_err(|e| body_read_failure(url, &e, attempts))?;
        Ok(bytes.to_vec())
    }
}

fn body_read_failure(url: &str, error: &reqwest::Error, attempts: u32) -> FetchFailure {
    FetchFailure::Unreachable {
        url: url.to_string(),
        reason: format!("failed to read body: {error}"),
        timed_out: error.is_timeout(),
        attempts,
    }
}

#[must_use]
pub fn is_captcha_page(body: &str) -> bool {
    CAPTCHA_MARKERS.iter().any(|marker| body.contains(marker))
}

/// Header set a real browser with this user agent would send
pub fn browser_headers(user_agent: &str, accept_language: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_str(user_agent).context("Invalid user agent")?);
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_str(accept_language).context("Invalid accept-language")?,
    );
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));

    let static_headers = [
        ("dnt", "1"),
        ("upgrade-insecure-requests", "1"),
        ("sec-fetch-dest", "document"),
        ("sec-fetch-mode", "navigate"),
        ("sec-fetch-site", "none"),
        ("sec-fetch-user", "?1"),
    ];
    for (name, value) in static_headers {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }

    // Client hints are only sent by Chromium-based browsers
    if user_agent.contains("Chrome/") {
        let platform = if user_agent.contains("Windows") {
            "\"Windows\""
        } else if user_agent.contains("Macintosh") {
            "\"macOS\""
        } else {
            "\"Linux\""
        };
        headers.insert(
            HeaderName::from_static("sec-ch-ua"),
            HeaderValue::from_static("\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\", \"Google Chrome\";v=\"120\""),
        );
        headers.insert(HeaderName::from_static("sec-ch-ua-mobile"), HeaderValue::from_static("?0"));
        headers.insert(HeaderName::from_static("sec-ch-ua-platform"), HeaderValue::from_static(platform));
    }

    Ok(headers)
}
