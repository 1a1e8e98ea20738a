//! Rate-limited HTTP client for the events API.
//!
//! Every outbound call passes through three gates before dispatch:
//! a token bucket (burst cap), a minimum-spacing check (no two dispatches
//! closer than the per-request interval), and a concurrency cap on
//! in-flight requests. Responses are classified into the retryable /
//! non-retryable taxonomy; `get_json` wraps the whole thing in
//! exponential-backoff retries.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, warn};
use url::Url;

use crate::config::ApiConfig;
use crate::error::{SyncError, SyncResult};

const BASE_RETRY_DELAY: Duration = Duration::from_millis(500);

pub struct RateLimitedClient {
    http: reqwest::Client,
    limiter: DefaultDirectRateLimiter,
    concurrency: Semaphore,
    min_spacing: Duration,
    last_dispatch: Mutex<Option<Instant>>,
    request_timeout: Duration,
    max_retries: u32,
    api_key: String,
}

impl RateLimitedClient {
    pub fn new(api: &ApiConfig) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| SyncError::Config(format!("Could not build HTTP client: {e}")))?;

        let rpm = NonZeroU32::new(api.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let limiter = RateLimiter::direct(Quota::per_minute(rpm));

        Ok(RateLimitedClient {
            http,
            limiter,
            concurrency: Semaphore::new(api.max_concurrency),
            min_spacing: Duration::from_millis(60_000 / u64::from(rpm.get())),
            last_dispatch: Mutex::new(None),
            request_timeout: Duration::from_secs(api.request_timeout_secs),
            max_retries: api.max_retries,
            api_key: api.api_key.clone(),
        })
    }

    /// Dispatch a single GET through the rate-limit gates and decode the
    /// JSON body, all inside one request-timeout window.
    ///
    /// Classification: 2xx ok, 4xx (and other non-5xx) fatal, 5xx and
    /// connection or body-read failures transient, timeout its own
    /// retryable error.
    pub async fn request<T: DeserializeOwned>(&self, url: Url) -> SyncResult<T> {
        let _permit = self
            .concurrency
            .acquire()
            .await
            .map_err(|_| SyncError::State("HTTP client concurrency gate closed".into()))?;

        self.limiter.until_ready().await;

        // Min-spacing gate: the lock is held across the sleep so concurrent
        // callers space out their dispatches rather than all firing at once
        // when the bucket refills.
        {
            let mut last = self.last_dispatch.lock().await;
            if let Some(prev) = *last {
                let elapsed = prev.elapsed();
                if elapsed < self.min_spacing {
                    sleep(self.min_spacing - elapsed).await;
                }
            }
            *last = Some(Instant::now());
        }

        debug!(%url, "dispatching request");

        let call = async {
            let response = self
                .http
                .get(url.clone())
                .bearer_auth(&self.api_key)
                .send()
                .await
                .map_err(|e| SyncError::TransientNetwork(e.to_string()))?;

            let status = response.status();
            if status.is_success() {
                // The body read counts against the same timeout as the
                // request; a stalled or garbled body is a transient fault
                // of this attempt, not a hard failure.
                response
                    .json::<T>()
                    .await
                    .map_err(|e| SyncError::TransientNetwork(format!("reading body from {url}: {e}")))
            } else if status.is_server_error() {
                Err(SyncError::TransientNetwork(format!(
                    "status {status} from {url}"
                )))
            } else {
                Err(SyncError::FatalRequest {
                    status: status.as_u16(),
                    url: url.to_string(),
                })
            }
        };

        match timeout(self.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(self.request_timeout.as_secs())),
        }
    }

    /// GET a JSON document, retrying transient failures with exponential
    /// backoff (`2^attempt * base_delay`). Fatal errors propagate on the
    /// first occurrence.
    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> SyncResult<T> {
        let mut attempt: u32 = 0;
        loop {
            match self.request::<T>(url.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = BASE_RETRY_DELAY * 2u32.pow(attempt);
                    warn!(%url, attempt, error = %e, "retrying after transient failure");
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_retryable() => {
                    return Err(SyncError::RetriesExhausted {
                        attempts: attempt + 1,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;

    fn api_config(rpm: u32) -> ApiConfig {
        ApiConfig {
            base_url: "https://api.example-events.com/v1".to_string(),
            api_key: "sk_test".to_string(),
            page_size: 50,
            requests_per_minute: rpm,
            max_concurrency: 4,
            request_timeout_secs: 10,
            max_retries: 3,
        }
    }

    #[test]
    fn min_spacing_derived_from_rate() {
        let client = RateLimitedClient::new(&api_config(60)).unwrap();
        assert_eq!(client.min_spacing, Duration::from_millis(1000));

        let client = RateLimitedClient::new(&api_config(300)).unwrap();
        assert_eq!(client.min_spacing, Duration::from_millis(200));
    }

    #[test]
    fn fatal_errors_are_not_retryable() {
        let fatal = SyncError::FatalRequest {
            status: 404,
            url: "https://api.example-events.com/v1/events".to_string(),
        };
        assert!(!fatal.is_retryable());
        assert!(SyncError::Timeout(10).is_retryable());
        assert!(SyncError::TransientNetwork("connection reset".into()).is_retryable());
    }

    /// Serve one canned HTTP response on a local socket, optionally holding
    /// the connection open afterwards to simulate a stalled body.
    async fn serve_once(response: String, hold_open: bool) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            if hold_open {
                sleep(Duration::from_secs(30)).await;
            }
        });
        format!("http://{addr}/events")
    }

    #[tokio::test]
    async fn stalled_body_hits_the_request_timeout() {
        // Headers promise 64 bytes; only a fragment ever arrives.
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 64\r\n\r\n{\"entries\":".to_string(),
            true,
        )
        .await;

        let mut config = api_config(600);
        config.request_timeout_secs = 1;
        config.max_retries = 0;
        let client = RateLimitedClient::new(&config).unwrap();

        let started = std::time::Instant::now();
        let err = client
            .get_json::<serde_json::Value>(Url::parse(&url).unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::RetriesExhausted { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn malformed_body_is_transient() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 8\r\nConnection: close\r\n\r\nnot json".to_string(),
            false,
        )
        .await;

        let mut config = api_config(600);
        config.max_retries = 0;
        let client = RateLimitedClient::new(&config).unwrap();

        let err = client
            .request::<serde_json::Value>(Url::parse(&url).unwrap())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
