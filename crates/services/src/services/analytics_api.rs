//! Client for the external analytics API used to pull event volumes.

use std::{
    num::NonZeroU32,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::{Duration, Instant},
};

use backon::{ExponentialBuilder, Retryable};
use chrono::NaiveDate;
use db::models::{analytics_settings::AnalyticsSettings, event_volume::DailyCount};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use moka::future::Cache;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use super::http_log::{HttpLogStore, NewHttpLogEntry};

const CACHE_CAPACITY: u64 = 1_000;

#[derive(Debug, Clone, Error)]
pub enum AnalyticsApiError {
    #[error("analytics integration is not configured: {0}")]
    NotConfigured(String),
    #[error("analytics integration is disabled")]
    Disabled,
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rate limited by analytics api")]
    RateLimited,
    #[error("analytics api rejected the token")]
    Unauthorized,
    #[error("json error: {0}")]
    Serde(String),
}

impl AnalyticsApiError {
    /// Returns true if the error is transient and should be retried.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::RateLimited => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CountsResponse {
    counts: Vec<DailyCount>,
}

/// Rate-limited, retrying, caching HTTP client for one analytics backend
#[derive(Clone)]
pub struct AnalyticsApiClient {
    http: Client,
    base_url: Url,
    site_id: Option<String>,
    api_token: Option<String>,
    limiter: Arc<DefaultDirectRateLimiter>,
    cache: Cache<String, serde_json::Value>,
    max_retries: usize,
    retry_min_delay: Duration,
    http_log: HttpLogStore,
}

impl std::fmt::Debug for AnalyticsApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("site_id", &self.site_id)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl AnalyticsApiClient {
    pub fn from_settings(
        settings: &AnalyticsSettings,
        http_log: HttpLogStore,
    ) -> Result<Self, AnalyticsApiError> {
        let raw_url = settings
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AnalyticsApiError::NotConfigured("base_url is not set".to_string()))?;
        let base_url = parse_base_url(raw_url)?;

        let per_second = u32::try_from(settings.rate_limit_per_second)
            .ok()
            .and_then(NonZeroU32::new)
            .ok_or_else(|| {
                AnalyticsApiError::NotConfigured(format!(
                    "rate_limit_per_second must be positive, got {}",
                    settings.rate_limit_per_second
                ))
            })?;

        let http = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds.max(1) as u64))
            .user_agent(concat!("trackplan/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AnalyticsApiError::Transport(e.to_string()))?;

        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(Duration::from_secs(settings.cache_ttl_seconds.max(1) as u64))
            .build();

        Ok(Self {
            http,
            base_url,
            site_id: settings.site_id.clone().filter(|s| !s.is_empty()),
            api_token: settings.api_token.clone().filter(|t| !t.is_empty()),
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
            cache,
            max_retries: settings.max_retries.clamp(0, 10) as usize,
            retry_min_delay: Duration::from_millis(500),
            http_log,
        })
    }

    pub fn with_retry_min_delay(mut self, delay: Duration) -> Self {
        self.retry_min_delay = delay;
        self
    }

    /// GET /health, never cached
    pub async fn health_check(&self) -> Result<(), AnalyticsApiError> {
        let url = self.endpoint("health", &[])?;
        self.get_json(url, false).await.map(|_| ())
    }

    /// Daily counts for one event between `from` and `to` inclusive
    pub async fn fetch_daily_counts(
        &self,
        event_name: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyCount>, AnalyticsApiError> {
        let from = from.format("%Y-%m-%d").to_string();
        let to = to.format("%Y-%m-%d").to_string();
        let mut query = vec![("event", event_name), ("from", from.as_str()), ("to", to.as_str())];
        if let Some(site_id) = self.site_id.as_deref() {
            query.insert(0, ("site_id", site_id));
        }

        let url = self.endpoint("events/counts", &query)?;
        let body = self.get_json(url, true).await?;
        let parsed: CountsResponse =
            serde_json::from_value(body).map_err(|e| AnalyticsApiError::Serde(e.to_string()))?;
        Ok(parsed.counts)
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, AnalyticsApiError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| AnalyticsApiError::NotConfigured(format!("invalid url: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn get_json(&self, url: Url, use_cache: bool) -> Result<serde_json::Value, AnalyticsApiError> {
        let key = url.to_string();

        if use_cache {
            if let Some(hit) = self.cache.get(&key).await {
                debug!(url = %key, "Analytics API cache hit");
                self.http_log.record(NewHttpLogEntry {
                    method: "GET".to_string(),
                    url: key,
                    status: Some(200),
                    cached: true,
                    ..Default::default()
                });
                return Ok(hit);
            }
        }

        let attempt = AtomicU32::new(0);
        let body = (|| async {
            let n = attempt.fetch_add(1, Ordering::Relaxed) + 1;
            self.send_once(&url, n).await
        })
        .retry(
            ExponentialBuilder::default()
                .with_min_delay(self.retry_min_delay)
                .with_max_delay(Duration::from_secs(30))
                .with_max_times(self.max_retries)
                .with_jitter(),
        )
        .when(|e: &AnalyticsApiError| e.should_retry())
        .notify(|e, dur| {
            warn!(
                "Analytics API call failed, retrying after {:.2}s: {}",
                dur.as_secs_f64(),
                e
            )
        })
        .await?;

        if use_cache {
            self.cache.insert(key, body.clone()).await;
        }
        Ok(body)
    }

    async fn send_once(&self, url: &Url, attempt: u32) -> Result<serde_json::Value, AnalyticsApiError> {
        self.limiter.until_ready().await;

        let started = Instant::now();
        let mut request = self.http.get(url.clone()).header("accept", "application/json");
        if let Some(token) = self.api_token.as_deref() {
            request = request.bearer_auth(token);
        }

        let result = match request.send().await {
            Err(e) => Err(map_reqwest_error(e)),
            Ok(res) => match res.status() {
                s if s.is_success() => res
                    .json::<serde_json::Value>()
                    .await
                    .map_err(|e| AnalyticsApiError::Serde(e.to_string())),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AnalyticsApiError::Unauthorized),
                StatusCode::TOO_MANY_REQUESTS => Err(AnalyticsApiError::RateLimited),
                s => {
                    let status = s.as_u16();
                    let body = res.text().await.unwrap_or_default();
                    Err(AnalyticsApiError::Http { status, body })
                }
            },
        };

        self.http_log.record(NewHttpLogEntry {
            method: "GET".to_string(),
            url: url.to_string(),
            status: status_of(&result),
            duration_ms: started.elapsed().as_millis() as u64,
            attempt,
            cached: false,
            error: result.as_ref().err().map(|e| e.to_string()),
        });

        result
    }
}

fn status_of(result: &Result<serde_json::Value, AnalyticsApiError>) -> Option<u16> {
    match result {
        Ok(_) => Some(200),
        Err(AnalyticsApiError::Unauthorized) => Some(401),
        Err(AnalyticsApiError::RateLimited) => Some(429),
        Err(AnalyticsApiError::Http { status, .. }) => Some(*status),
        Err(_) => None,
    }
}

/// Accept only http(s) and make sure relative joins keep the full base path
pub fn parse_base_url(raw: &str) -> Result<Url, AnalyticsApiError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| AnalyticsApiError::NotConfigured(format!("invalid base_url: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AnalyticsApiError::NotConfigured(format!(
            "base_url must use http or https, got {}",
            url.scheme()
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn map_reqwest_error(e: reqwest::Error) -> AnalyticsApiError {
    if e.is_timeout() {
        AnalyticsApiError::Timeout
    } else {
        AnalyticsApiError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use axum::{
        Json, Router,
        extract::State,
        http::{HeaderMap, StatusCode as AxumStatus},
        routing::get,
    };
    use chrono::Utc;

    use super::*;

    #[derive(Clone, Default)]
    struct StubState {
        counts_calls: Arc<AtomicUsize>,
        fail_first: usize,
        /// Status returned for the first `fail_first` calls; 503 when unset
        fail_with: Option<AxumStatus>,
    }

    async fn counts(
        State(state): State<StubState>,
        headers: HeaderMap,
    ) -> Result<Json<serde_json::Value>, AxumStatus> {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer test-token") {
            return Err(AxumStatus::UNAUTHORIZED);
        }
        let call = state.counts_calls.fetch_add(1, Ordering::SeqCst);
        if call < state.fail_first {
            return Err(state.fail_with.unwrap_or(AxumStatus::SERVICE_UNAVAILABLE));
        }
        Ok(Json(serde_json::json!({
            "counts": [
                {"day": "2025-06-01", "count": 1200},
                {"day": "2025-06-02", "count": 400}
            ]
        })))
    }

    async fn spawn_stub(state: StubState) -> String {
        let app = Router::new()
            .route("/api/health", get(|| async { Json(serde_json::json!({"ok": true})) }))
            .route("/api/events/counts", get(counts))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/api")
    }

    fn settings(base_url: &str, token: Option<&str>, max_retries: i64) -> AnalyticsSettings {
        AnalyticsSettings {
            enabled: true,
            provider: "generic".to_string(),
            base_url: Some(base_url.to_string()),
            site_id: Some("3".to_string()),
            api_token: token.map(str::to_string),
            cache_ttl_seconds: 60,
            rate_limit_per_second: 50,
            max_retries,
            timeout_seconds: 5,
            updated_at: Utc::now(),
        }
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_parse_base_url() {
        assert_eq!(
            parse_base_url("https://stats.example.com/api").unwrap().as_str(),
            "https://stats.example.com/api/"
        );
        assert!(parse_base_url("ftp://stats.example.com").is_err());
        assert!(parse_base_url("not a url").is_err());
    }

    #[test]
    fn test_from_settings_requires_base_url() {
        let mut s = settings("https://stats.example.com", None, 0);
        s.base_url = None;
        assert!(matches!(
            AnalyticsApiClient::from_settings(&s, HttpLogStore::new(10)),
            Err(AnalyticsApiError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_counts_caches_successful_responses() {
        let state = StubState::default();
        let base = spawn_stub(state.clone()).await;
        let log = HttpLogStore::new(50);
        let client =
            AnalyticsApiClient::from_settings(&settings(&base, Some("test-token"), 0), log.clone()).unwrap();

        let first = client
            .fetch_daily_counts("checkout_completed", day("2025-06-01"), day("2025-06-02"))
            .await
            .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].count, 1200);

        let second = client
            .fetch_daily_counts("checkout_completed", day("2025-06-01"), day("2025-06-02"))
            .await
            .unwrap();
        assert_eq!(second, first);
        assert_eq!(state.counts_calls.load(Ordering::SeqCst), 1);

        let entries = log.list(10, false);
        assert_eq!(entries.len(), 2);
        assert!(entries[0].cached);
        assert!(!entries[1].cached);
        assert!(entries[1].url.contains("event=checkout_completed"));
        assert!(entries[1].url.contains("site_id=3"));
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_succeeds() {
        let state = StubState {
            fail_first: 2,
            ..Default::default()
        };
        let base = spawn_stub(state.clone()).await;
        let log = HttpLogStore::new(50);
        let client = AnalyticsApiClient::from_settings(&settings(&base, Some("test-token"), 3), log.clone())
            .unwrap()
            .with_retry_min_delay(Duration::from_millis(5));

        let counts = client
            .fetch_daily_counts("screen_viewed", day("2025-06-01"), day("2025-06-02"))
            .await
            .unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(state.counts_calls.load(Ordering::SeqCst), 3);

        let attempts: Vec<_> = log.list(10, false).iter().map(|e| (e.attempt, e.status)).collect();
        assert_eq!(attempts, vec![(3, Some(200)), (2, Some(503)), (1, Some(503))]);
    }

    #[tokio::test]
    async fn test_failed_responses_are_not_cached() {
        let state = StubState {
            fail_first: 1,
            ..Default::default()
        };
        let base = spawn_stub(state.clone()).await;
        let client = AnalyticsApiClient::from_settings(
            &settings(&base, Some("test-token"), 0),
            HttpLogStore::new(50),
        )
        .unwrap();

        let err = client
            .fetch_daily_counts("screen_viewed", day("2025-06-01"), day("2025-06-02"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyticsApiError::Http { status: 503, .. }));

        let counts = client
            .fetch_daily_counts("screen_viewed", day("2025-06-01"), day("2025-06-02"))
            .await
            .unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(state.counts_calls.load(Ordering::SeqCst), 2);

        client
            .fetch_daily_counts("screen_viewed", day("2025-06-01"), day("2025-06-02"))
            .await
            .unwrap();
        assert_eq!(state.counts_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rate_limited_responses_are_retried() {
        let state = StubState {
            fail_first: 1,
            fail_with: Some(AxumStatus::TOO_MANY_REQUESTS),
            ..Default::default()
        };
        let base = spawn_stub(state.clone()).await;
        let log = HttpLogStore::new(50);
        let client = AnalyticsApiClient::from_settings(&settings(&base, Some("test-token"), 2), log.clone())
            .unwrap()
            .with_retry_min_delay(Duration::from_millis(5));

        let counts = client
            .fetch_daily_counts("screen_viewed", day("2025-06-01"), day("2025-06-02"))
            .await
            .unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(state.counts_calls.load(Ordering::SeqCst), 2);
        assert_eq!(log.stats().rate_limited, 1);

        let statuses: Vec<_> = log.list(10, false).iter().map(|e| e.status).collect();
        assert_eq!(statuses, vec![Some(200), Some(429)]);
    }

    #[tokio::test]
    async fn test_limiter_spaces_out_requests() {
        let base = spawn_stub(StubState::default()).await;
        let mut slow = settings(&base, None, 0);
        slow.rate_limit_per_second = 1;
        let client = AnalyticsApiClient::from_settings(&slow, HttpLogStore::new(10)).unwrap();

        let started = Instant::now();
        client.health_check().await.unwrap();
        client.health_check().await.unwrap();
        assert!(
            started.elapsed() >= Duration::from_millis(950),
            "two calls at 1/s finished in {:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let state = StubState::default();
        let base = spawn_stub(state.clone()).await;
        let log = HttpLogStore::new(50);
        let client = AnalyticsApiClient::from_settings(&settings(&base, Some("wrong"), 3), log.clone())
            .unwrap()
            .with_retry_min_delay(Duration::from_millis(5));

        let err = client
            .fetch_daily_counts("screen_viewed", day("2025-06-01"), day("2025-06-02"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyticsApiError::Unauthorized));
        assert_eq!(log.stats().total, 1);
        assert_eq!(log.stats().errors, 1);
    }

    #[tokio::test]
    async fn test_health_check() {
        let base = spawn_stub(StubState::default()).await;
        let client =
            AnalyticsApiClient::from_settings(&settings(&base, None, 0), HttpLogStore::new(10)).unwrap();
        client.health_check().await.unwrap();
    }
}
