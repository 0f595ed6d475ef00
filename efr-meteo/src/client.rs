//! Forecast API client: transport, retry policy and response cache.
//!
//! The three pieces are independent. [`Transport`] moves bytes,
//! [`RetryPolicy`] decides how often and how long to wait, and any
//! [`ResponseStore`] keeps successful bodies for [`CachePolicy::expire_after`].
//! [`MeteoClient::send`] composes them.

use crate::error::{MeteoError, Result};
use crate::request::ForecastRequest;
use crate::response::{parse_response, LocationSeries};
use async_trait::async_trait;
use chrono::Utc;
use efr_cache::ResponseStore;
use log::{debug, info, warn};
use std::time::Duration;

/// Sends one form-encoded POST and returns the response body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_form(&self, url: &str, params: &[(String, String)]) -> Result<String>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for &T {
    async fn post_form(&self, url: &str, params: &[(String, String)]) -> Result<String> {
        (**self).post_form(url, params).await
    }
}

/// Retry transient failures with exponential backoff.
///
/// The wait before retry `n` (1-based) is `backoff_factor * 2^(n-1)` seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16) as i32;
        Duration::from_secs_f64((self.backoff_factor * 2f64.powi(exponent)).max(0.0))
    }
}

/// How long a cached response body stays valid. `None` disables caching.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachePolicy {
    pub expire_after: Option<chrono::Duration>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            expire_after: Some(chrono::Duration::hours(1)),
        }
    }
}

impl CachePolicy {
    pub fn disabled() -> Self {
        Self { expire_after: None }
    }
}

pub struct MeteoClient<T, S> {
    transport: T,
    store: S,
    retry: RetryPolicy,
    cache: CachePolicy,
}

impl<T: Transport, S: ResponseStore> MeteoClient<T, S> {
    pub fn new(transport: T, store: S, retry: RetryPolicy, cache: CachePolicy) -> Self {
        Self {
            transport,
            store,
            retry,
            cache,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Send a request and decode one [`LocationSeries`] per coordinate,
    /// serving it from the cache when a fresh copy exists.
    ///
    /// Cache failures are logged and otherwise ignored. A body is cached
    /// only once it has decoded cleanly.
    pub async fn send(&self, request: &ForecastRequest) -> Result<Vec<LocationSeries>> {
        let key = request.fingerprint();
        let expected = request.coords.len();
        if let Some(max_age) = self.cache.expire_after {
            match self.store.get(&key, Utc::now(), max_age) {
                Ok(Some(body)) => match parse_response(&body, request.source, expected) {
                    Ok(locations) => {
                        debug!("Cache hit for {} request", request.source.name());
                        return Ok(locations);
                    }
                    Err(e) => warn!("Ignoring unreadable cached response: {}", e),
                },
                Ok(None) => {}
                Err(e) => warn!("Response cache lookup failed: {:#}", e),
            }
        }

        let body = self.send_with_retry(request).await?;
        let locations = parse_response(&body, request.source, expected)?;

        if self.cache.expire_after.is_some() {
            if let Err(e) = self.store.put(&key, &body, Utc::now()) {
                warn!("Failed to cache {} response: {:#}", request.source.name(), e);
            }
        }
        Ok(locations)
    }

    async fn send_with_retry(&self, request: &ForecastRequest) -> Result<String> {
        let params = request.params();
        let attempts = self.retry.max_retries + 1;
        let mut retry = 0;
        loop {
            match self.transport.post_form(request.url(), &params).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() && retry < self.retry.max_retries => {
                    retry += 1;
                    let delay = self.retry.delay(retry);
                    warn!(
                        "Attempt {}/{}: {} request failed: {}",
                        retry,
                        attempts,
                        request.source.name(),
                        e
                    );
                    info!(
                        "Sleeping for {} milliseconds before retry",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if retry > 0 {
                        warn!(
                            "All attempts failed for {} request",
                            request.source.name()
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}

/// Native HTTP transport.
#[cfg(feature = "api")]
pub struct HttpTransport {
    client: reqwest::Client,
}

#[cfg(feature = "api")]
impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MeteoError::Transport {
                message: e.to_string(),
                transient: false,
            })?;
        Ok(Self { client })
    }
}

#[cfg(feature = "api")]
#[async_trait]
impl Transport for HttpTransport {
    async fn post_form(&self, url: &str, params: &[(String, String)]) -> Result<String> {
        let transport_error = |e: reqwest::Error| MeteoError::Transport {
            transient: e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            message: e.to_string(),
        };

        let response = self
            .client
            .post(url)
            .form(params)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if status.is_success() {
            return Ok(body);
        }
        match crate::response::api_error_reason(&body) {
            Some(reason) => Err(MeteoError::Api {
                status: status.as_u16(),
                reason,
            }),
            None => Err(MeteoError::Status {
                status: status.as_u16(),
                body,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ForecastSource;
    use chrono::NaiveDate;
    use efr_cache::MemoryStore;
    use efr_data::Coordinate;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays a fixed script of results, then repeats the last one.
    struct Scripted {
        replies: Mutex<VecDeque<Result<String>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn post_form(&self, _url: &str, _params: &[(String, String)]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                replies.pop_front().unwrap()
            } else {
                replies.front().cloned().unwrap()
            }
        }
    }

    fn request() -> ForecastRequest {
        ForecastRequest::new(
            ForecastSource::RiverDischarge,
            vec![Coordinate::new(45.0, 5.0)],
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
        )
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 5,
            backoff_factor: 0.0,
        }
    }

    fn unavailable() -> Result<String> {
        Err(MeteoError::Status {
            status: 503,
            body: "busy".into(),
        })
    }

    fn client(transport: &Scripted, cache: CachePolicy) -> MeteoClient<&Scripted, MemoryStore> {
        MeteoClient::new(transport, MemoryStore::new(), fast_retry(), cache)
    }

    const BODY: &str = r#"{
        "latitude": 45.0,
        "longitude": 5.0,
        "daily": {"time": ["2025-01-01", "2025-01-02"], "river_discharge": [1.0, 2.0]}
    }"#;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
        assert_eq!(policy.delay(3), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let transport = Scripted::new(vec![unavailable(), unavailable(), Ok(BODY.into())]);
        let client = client(&transport, CachePolicy::disabled());

        let locations = client.send(&request()).await.unwrap();
        assert_eq!(transport.calls(), 3);
        assert_eq!(locations[0].series[0].samples, vec![Some(1.0), Some(2.0)]);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let transport = Scripted::new(vec![unavailable()]);
        let client = client(&transport, CachePolicy::disabled());

        assert!(client.send(&request()).await.is_err());
        assert_eq!(transport.calls(), 6);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let transport = Scripted::new(vec![Err(MeteoError::Api {
            status: 400,
            reason: "Cannot initialize WeatherVariable".into(),
        })]);
        let client = client(&transport, CachePolicy::disabled());

        let err = client.send(&request()).await.unwrap_err();
        assert!(matches!(err, MeteoError::Api { status: 400, .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_successful_responses_are_cached() {
        let transport = Scripted::new(vec![Ok(BODY.into())]);
        let client = client(&transport, CachePolicy::default());

        client.send(&request()).await.unwrap();
        let cached = client.send(&request()).await.unwrap();
        assert_eq!(transport.calls(), 1);
        assert_eq!(client.store().len(), 1);
        assert_eq!(cached[0].series[0].samples, vec![Some(1.0), Some(2.0)]);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let transport = Scripted::new(vec![Err(MeteoError::Status {
            status: 404,
            body: "not found".into(),
        })]);
        let client = client(&transport, CachePolicy::default());

        assert!(client.send(&request()).await.is_err());
        assert!(client.store().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_success_bodies_are_not_cached() {
        let transport = Scripted::new(vec![Ok(r#"{"latitude": 45.0"#.into()), Ok(BODY.into())]);
        let client = client(&transport, CachePolicy::default());

        let err = client.send(&request()).await.unwrap_err();
        assert!(matches!(err, MeteoError::ResponseParse(_)));
        assert!(client.store().is_empty());

        client.send(&request()).await.unwrap();
        assert_eq!(transport.calls(), 2);
        assert_eq!(client.store().len(), 1);
    }
}
