//! HTTP client shared by the remote source adapters.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited), 5xx, and network errors: retry the same
//!   request after an exponential backoff (`base * 2^(attempt-1)`,
//!   capped at `backoff_max_ms`), up to `max_retries` times. Exhaustion
//!   is [`SourceError::Transient`].
//! - HTTP 401/403: [`SourceError::Auth`], never retried.
//! - HTTP 404: [`SourceError::NotFound`], never retried.
//! - Other 4xx: [`SourceError::Status`].
//!
//! Cancellation is checked before every attempt and interrupts a
//! backoff sleep.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Method, Response, StatusCode, Url};

use crate::config::RemoteConfig;
use crate::error::{ConfigError, SourceError};
use crate::traits::CancelToken;

/// Bounded exponential backoff settings.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RemoteConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base: Duration::from_millis(config.backoff_base_ms),
            max: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << (attempt.saturating_sub(1)).min(16);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// A `reqwest` client with per-source default headers and retry policy.
#[derive(Clone)]
pub struct RemoteClient {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl RemoteClient {
    /// Build a client that sends `Authorization: Bearer <token>` and the
    /// given extra headers on every request.
    pub fn new(
        config: &RemoteConfig,
        bearer: &str,
        extra_headers: &[(&'static str, &str)],
    ) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {bearer}"))
            .map_err(|_| ConfigError::Invalid("token contains invalid header characters".into()))?;
        headers.insert(AUTHORIZATION, auth);
        for (name, value) in extra_headers {
            let value = HeaderValue::from_str(value)
                .map_err(|_| ConfigError::Invalid(format!("invalid value for header {name}")))?;
            headers.insert(HeaderName::from_static(name), value);
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("sift/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            policy: RetryPolicy::from_config(config),
        })
    }

    pub async fn get(&self, url: &Url, cancel: &CancelToken) -> Result<Response, SourceError> {
        self.send(Method::GET, url, None, cancel).await
    }

    pub async fn get_json(
        &self,
        url: &Url,
        cancel: &CancelToken,
    ) -> Result<serde_json::Value, SourceError> {
        let response = self.get(url, cancel).await?;
        read_json(url, response).await
    }

    pub async fn post_json(
        &self,
        url: &Url,
        body: &serde_json::Value,
        cancel: &CancelToken,
    ) -> Result<serde_json::Value, SourceError> {
        let response = self.send(Method::POST, url, Some(body), cancel).await?;
        read_json(url, response).await
    }

    async fn send(
        &self,
        method: Method,
        url: &Url,
        body: Option<&serde_json::Value>,
        cancel: &CancelToken,
    ) -> Result<Response, SourceError> {
        let mut last_err = None;

        for attempt in 0..=self.policy.max_retries {
            if attempt > 0 {
                let delay = self.policy.delay(attempt);
                tracing::debug!(%url, attempt, ?delay, "retrying after backoff");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(SourceError::Cancelled),
                }
            }
            cancel.check()?;

            let mut request = self.client.request(method.clone(), url.clone());
            if let Some(b) = body {
                request = request.json(b);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        last_err = Some(format!("HTTP {status}"));
                        continue;
                    }
                    return Err(classify(url, status));
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(SourceError::Transient {
            url: url.to_string(),
            detail: last_err.unwrap_or_else(|| "request failed".into()),
        })
    }
}

fn classify(url: &Url, status: StatusCode) -> SourceError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SourceError::Auth {
            url: url.to_string(),
            detail: format!("HTTP {status}"),
        },
        StatusCode::NOT_FOUND => SourceError::NotFound {
            url: url.to_string(),
        },
        other => SourceError::Status {
            url: url.to_string(),
            status: other.as_u16(),
        },
    }
}

async fn read_json(url: &Url, response: Response) -> Result<serde_json::Value, SourceError> {
    response
        .json::<serde_json::Value>()
        .await
        .map_err(|e| SourceError::Protocol {
            url: url.to_string(),
            detail: e.to_string(),
        })
}

/// Append path segments (percent-encoded) to a base URL.
///
/// `join_url("https://api.github.com", &["repos", "me", "a b"])` yields
/// `https://api.github.com/repos/me/a%20b`. Segments containing `/` are
/// split so repository-relative paths can be passed whole.
pub fn join_url(base: &str, segments: &[&str]) -> Result<Url, SourceError> {
    let mut url = Url::parse(base).map_err(|e| SourceError::Config(format!("bad URL {base}: {e}")))?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| SourceError::Config(format!("URL cannot be a base: {base}")))?;
        path.pop_if_empty();
        for seg in segments {
            path.extend(seg.split('/').filter(|s| !s.is_empty()));
        }
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode as AxumStatus, routing::get, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_config(max_retries: u32) -> RemoteConfig {
        RemoteConfig {
            max_retries,
            backoff_base_ms: 1,
            backoff_max_ms: 5,
            timeout_secs: 5,
        }
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn backoff_grows_and_caps() {
        let p = RetryPolicy {
            max_retries: 5,
            base: Duration::from_millis(100),
            max: Duration::from_millis(350),
        };
        assert_eq!(p.delay(1), Duration::from_millis(100));
        assert_eq!(p.delay(2), Duration::from_millis(200));
        assert_eq!(p.delay(3), Duration::from_millis(350));
        assert_eq!(p.delay(40), Duration::from_millis(350));
    }

    #[test]
    fn join_url_encodes_and_splits() {
        let u = join_url("https://example.com/api/", &["repos", "me", "docs/a b.md"]).unwrap();
        assert_eq!(u.as_str(), "https://example.com/api/repos/me/docs/a%20b.md");
    }

    #[tokio::test]
    async fn rate_limit_is_retried_once_then_succeeds() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/flaky",
            get(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        (AxumStatus::TOO_MANY_REQUESTS, "slow down")
                    } else {
                        (AxumStatus::OK, "ok")
                    }
                }
            }),
        );
        let base = serve(app).await;
        let client = RemoteClient::new(&fast_config(1), "t", &[]).unwrap();
        let url = join_url(&base, &["flaky"]).unwrap();

        let resp = client.get(&url, &CancelToken::new()).await.unwrap();
        assert_eq!(resp.text().await.unwrap(), "ok");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn repeated_server_errors_become_transient() {
        let app = Router::new().route("/down", get(|| async { AxumStatus::BAD_GATEWAY }));
        let base = serve(app).await;
        let client = RemoteClient::new(&fast_config(2), "t", &[]).unwrap();
        let url = join_url(&base, &["down"]).unwrap();

        let err = client.get(&url, &CancelToken::new()).await.unwrap_err();
        assert!(matches!(err, SourceError::Transient { .. }));
    }

    #[tokio::test]
    async fn auth_and_not_found_are_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new()
            .route(
                "/private",
                get(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { AxumStatus::UNAUTHORIZED }
                }),
            )
            .route("/gone", get(|| async { AxumStatus::NOT_FOUND }));
        let base = serve(app).await;
        let client = RemoteClient::new(&fast_config(3), "t", &[]).unwrap();

        let err = client
            .get(&join_url(&base, &["private"]).unwrap(), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(err.is_auth());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let err = client
            .get(&join_url(&base, &["gone"]).unwrap(), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_request() {
        let client = RemoteClient::new(&fast_config(1), "t", &[]).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let url = Url::parse("http://127.0.0.1:9/never").unwrap();
        assert!(matches!(
            client.get(&url, &cancel).await,
            Err(SourceError::Cancelled)
        ));
    }
}
