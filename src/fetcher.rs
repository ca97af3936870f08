//! Page fetching with exponential backoff.
//!
//! The fetcher is the only part of the pipeline that touches the network.
//!
//! # Architecture
//!
//! - [`FetchPage`]: one GET returning the page body
//! - [`HttpFetcher`]: `reqwest` implementation with a fixed User-Agent and a
//!   per-attempt timeout
//! - [`RetryFetch`]: decorator retrying transient failures of any
//!   [`FetchPage`] implementation
//!
//! # Retry Strategy
//!
//! Only failures where [`FetchError::is_transient`] holds are retried
//! (HTTP 429/500/502/503/504, connect errors, timeouts):
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..=max_jitter)
//! ```

use crate::error::FetchError;
use rand::{Rng, rng};
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

pub const USER_AGENT: &str = concat!(
    "newsroll/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/newsroll/newsroll)"
);

/// Knobs for [`build_fetcher`].
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub timeout: StdDuration,
    pub max_retries: usize,
    pub base_delay: StdDuration,
    pub max_delay: StdDuration,
    pub max_jitter: StdDuration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: StdDuration::from_secs(20),
            max_retries: 3,
            base_delay: StdDuration::from_secs(1),
            max_delay: StdDuration::from_secs(30),
            max_jitter: StdDuration::from_millis(250),
        }
    }
}

/// Something that can GET a page and return its body.
pub trait FetchPage {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Plain HTTP fetcher. One attempt per call.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: StdDuration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

impl FetchPage for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let t0 = Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        debug!(
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched page"
        );
        Ok(body)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`FetchPage`]
/// implementation.
///
/// Non-transient errors are returned immediately. After `max_retries`
/// failed retries the last error is returned.
pub struct RetryFetch<T> {
    /// The underlying fetcher.
    inner: T,
    /// Maximum number of retries after the first attempt.
    max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    base_delay: StdDuration,
    /// Maximum delay cap before jitter.
    max_delay: StdDuration,
    /// Upper bound of the random jitter added to every delay.
    max_jitter: StdDuration,
}

impl<T> RetryFetch<T>
where
    T: FetchPage,
{
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
            max_jitter: StdDuration::from_millis(250),
        }
    }

    pub fn with_max_delay(mut self, max_delay: StdDuration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_max_jitter(mut self, max_jitter: StdDuration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Delay before retry number `attempt` (1-based), without jitter.
    fn backoff(&self, attempt: usize) -> StdDuration {
        let factor = 1u32.checked_shl((attempt - 1) as u32).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("max_jitter", &self.max_jitter)
            .finish()
    }
}

impl<T> FetchPage for RetryFetch<T>
where
    T: FetchPage,
{
    #[instrument(level = "info", skip(self))]
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.fetch(url).await {
                Ok(body) => return Ok(body),
                Err(e) if !e.is_transient() => {
                    warn!(error = %e, "fetch failed with non-retryable error");
                    return Err(e);
                }
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "fetch exhausted retries"
                        );
                        return Err(e);
                    }

                    let jitter_ms = self.max_jitter.as_millis() as u64;
                    let jitter = if jitter_ms == 0 {
                        StdDuration::ZERO
                    } else {
                        StdDuration::from_millis(rng().random_range(0..=jitter_ms))
                    };
                    let delay = self.backoff(attempt) + jitter;

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Build the production fetcher: [`HttpFetcher`] wrapped in [`RetryFetch`].
pub fn build_fetcher(settings: &FetchSettings) -> Result<RetryFetch<HttpFetcher>, FetchError> {
    let http = HttpFetcher::new(settings.timeout)?;
    info!(
        timeout = ?settings.timeout,
        max_retries = settings.max_retries,
        user_agent = USER_AGENT,
        "HTTP fetcher ready"
    );
    Ok(RetryFetch::new(http, settings.max_retries, settings.base_delay)
        .with_max_delay(settings.max_delay)
        .with_max_jitter(settings.max_jitter))
}
