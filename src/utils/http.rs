//! HTTP client utilities.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use http::header::RETRY_AFTER;
use http::{HeaderMap, StatusCode};
use nonzero_ext::nonzero;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use super::retry::{with_rate_limit_retry, RetryConfig};
use crate::models::SourceKind;
use crate::sources::SourceError;

/// Pooled, rate-limited HTTP client owned by one adapter
///
/// Cloning shares the connection pool and the rate limiter.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    limiter: Arc<DefaultDirectRateLimiter>,
    retry: RetryConfig,
    source: SourceKind,
}

impl HttpClient {
    /// Create a new HTTP client for `source` with the given per-request timeout
    pub fn new(source: SourceKind, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| SourceError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(nonzero!(5u32)))),
            retry: RetryConfig::default(),
            source,
        })
    }

    /// Set the outbound request rate (requests per second, minimum 1)
    pub fn with_rate_limit(mut self, requests_per_second: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(nonzero!(1u32));
        self.limiter = Arc::new(RateLimiter::direct(Quota::per_second(rate)));
        self
    }

    /// Set the rate-limit retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Get the underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Issue one GET and classify the response status (no retry)
    pub async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Response, SourceError> {
        self.limiter.until_ready().await;
        tracing::debug!(source = %self.source, url, "GET");

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SourceError::Unavailable(format!("{} request timed out", self.source))
                } else {
                    SourceError::Unavailable(format!("Failed to reach {}: {}", self.source, e))
                }
            })?;

        classify_status(self.source, response.status(), response.headers())?;
        Ok(response)
    }

    /// GET a text body, retrying once on rate limiting
    pub async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String, SourceError> {
        with_rate_limit_retry(self.retry, move || self.fetch_text(url, query)).await
    }

    /// GET and deserialize a JSON body, retrying once on rate limiting
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let body = self.get_text(url, query).await?;
        serde_json::from_str(&body).map_err(|e| {
            SourceError::Malformed(format!("Failed to parse {} JSON: {}", self.source, e))
        })
    }

    async fn fetch_text(&self, url: &str, query: &[(&str, String)]) -> Result<String, SourceError> {
        let response = self.get(url, query).await?;
        response.text().await.map_err(|e| {
            SourceError::Unavailable(format!("Failed to read {} response: {}", self.source, e))
        })
    }
}

/// Map a non-success HTTP status to the matching [`SourceError`]
fn classify_status(
    source: SourceKind,
    status: StatusCode,
    headers: &HeaderMap,
) -> Result<(), SourceError> {
    if status.is_success() {
        return Ok(());
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => Err(SourceError::rate_limited(
            format!("{} returned {}", source, status),
            parse_retry_after(headers),
        )),
        StatusCode::NOT_FOUND => Err(SourceError::NotFound(format!(
            "{} has no matching record",
            source
        ))),
        s if s.is_server_error() => Err(SourceError::Unavailable(format!(
            "{} returned {}",
            source, status
        ))),
        _ => Err(SourceError::InvalidRequest(format!(
            "{} rejected the request with {}",
            source, status
        ))),
    }
}

/// Parse a Retry-After header given as delta-seconds or an HTTP date
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_parse_retry_after_past_date() {
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_retry_after_missing_or_garbage() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_classify_status() {
        let headers = HeaderMap::new();
        let source = SourceKind::PubMed;

        assert!(classify_status(source, StatusCode::OK, &headers).is_ok());
        assert!(matches!(
            classify_status(source, StatusCode::TOO_MANY_REQUESTS, &headers),
            Err(SourceError::RateLimited { retry_after: None, .. })
        ));
        assert!(matches!(
            classify_status(source, StatusCode::NOT_FOUND, &headers),
            Err(SourceError::NotFound(_))
        ));
        assert!(matches!(
            classify_status(source, StatusCode::BAD_GATEWAY, &headers),
            Err(SourceError::Unavailable(_))
        ));
        assert!(matches!(
            classify_status(source, StatusCode::BAD_REQUEST, &headers),
            Err(SourceError::InvalidRequest(_))
        ));
    }
}
