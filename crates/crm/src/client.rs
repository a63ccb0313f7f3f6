//! HTTP client for the CRM record store.
//!
//! Rate-limit handling lives entirely in this module: HTTP 429 responses are
//! retried with exponential backoff up to a bounded attempt budget, after
//! which [`CrmError::RateLimitExceeded`] is surfaced. All other non-2xx
//! responses are treated as non-transient business errors and fail
//! immediately.
//!
//! The client is constructed once at process start and injected into every
//! component that needs it; there is no global instance.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::chunk::CRM_BATCH_LIMIT;
use crate::errors::CrmError;
use crate::models::{
    BatchInputId, BatchReadRequest, BatchResponse, BatchUpdateInput, BatchUpdateRequest, CrmRecord,
    SearchRequest, SearchResponse,
};
use crate::traits::CrmApi;

/// Default base URL for the CRM object API.
pub const DEFAULT_BASE_URL: &str = "https://api.hubapi.com/crm/v3";

/// Default HTTP request timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default number of attempts before giving up on a rate-limited call.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default first backoff delay; doubles on each subsequent attempt.
const DEFAULT_BASE_DELAY_MS: u64 = 1_000;

/// Remaining-quota level below which a warning is logged.
const RATE_LIMIT_WARN_THRESHOLD: i64 = 10;

/// Rate-limit telemetry parsed from CRM response headers.
///
/// Logged for observability only; the client never changes behavior based
/// on remaining quota, except to warn when it drops below the threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Calls remaining in the current rolling window.
    pub remaining: Option<i64>,
    /// Calls remaining in the daily quota.
    pub daily_remaining: Option<i64>,
}

/// Configuration for [`CrmApiClient`].
#[derive(Debug, Clone)]
pub struct CrmClientConfig {
    pub base_url: String,
    pub access_token: String,
    /// Attempt budget for rate-limited calls.
    pub max_retries: u32,
    /// First backoff delay; attempt `n` waits `base_delay * 2^(n-1)`.
    pub base_delay: Duration,
    pub timeout: Duration,
}

impl CrmClientConfig {
    pub fn new(base_url: &str, access_token: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Build the configuration from environment variables.
    ///
    /// `EXAMSYNC_CRM_ACCESS_TOKEN` is required; `EXAMSYNC_CRM_BASE_URL`
    /// falls back to [`DEFAULT_BASE_URL`].
    pub fn from_env() -> Result<Self, CrmError> {
        let access_token = std::env::var("EXAMSYNC_CRM_ACCESS_TOKEN")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                CrmError::Config("EXAMSYNC_CRM_ACCESS_TOKEN is not set".to_string())
            })?;
        let base_url = std::env::var("EXAMSYNC_CRM_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        Ok(Self::new(&base_url, &access_token))
    }
}

/// HTTP client for the CRM record store API.
///
/// # Example
///
/// ```ignore
/// let config = CrmClientConfig::from_env()?;
/// let client = CrmApiClient::new(config)?;
/// let response = client.search_records("exams", request).await?;
/// ```
pub struct CrmApiClient {
    client: reqwest::Client,
    config: CrmClientConfig,
    last_rate_limit: Mutex<RateLimitStatus>,
}

impl CrmApiClient {
    /// Create a new CRM API client.
    ///
    /// # Errors
    ///
    /// Returns [`CrmError::Config`] if the access token is malformed or the
    /// underlying HTTP client cannot be initialized.
    pub fn new(config: CrmClientConfig) -> Result<Self, CrmError> {
        if config.access_token.trim().is_empty() {
            return Err(CrmError::Config("access token is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CrmError::Config(format!("failed to initialize HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            last_rate_limit: Mutex::new(RateLimitStatus::default()),
        })
    }

    /// Most recently observed rate-limit telemetry.
    pub fn last_rate_limit(&self) -> RateLimitStatus {
        *self.last_rate_limit.lock().unwrap()
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.config.access_token)) {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }

    /// Issue a single call with bounded retry on 429 and transport errors.
    ///
    /// Implemented as an explicit loop with an attempt counter rather than
    /// a recursive self-call, so the retry depth is bounded by construction.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, CrmError> {
        let url = format!("{}{}", self.config.base_url, path);
        let max_retries = self.config.max_retries.max(1);

        let mut attempt: u32 = 1;
        loop {
            debug!("[CrmApi] {} {} (attempt {})", method, url, attempt);

            let mut request = self
                .client
                .request(method.clone(), &url)
                .headers(self.headers());
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(err) if attempt < max_retries => {
                    warn!(
                        "[CrmApi] transient error on {} {} (attempt {}): {}",
                        method, url, attempt, err
                    );
                    self.backoff(attempt).await;
                    attempt += 1;
                    continue;
                }
                Err(err) => return Err(CrmError::Transient(err)),
            };

            self.record_rate_limit(response.headers());

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt >= max_retries {
                    warn!(
                        "[CrmApi] rate limit budget exhausted after {} attempts on {} {}",
                        attempt, method, url
                    );
                    return Err(CrmError::RateLimitExceeded { attempts: attempt });
                }
                debug!(
                    "[CrmApi] 429 on {} {} (attempt {}), backing off",
                    method, url, attempt
                );
                self.backoff(attempt).await;
                attempt += 1;
                continue;
            }

            let body_text = response.text().await.map_err(CrmError::Transient)?;

            if !status.is_success() {
                return Err(CrmError::Api {
                    status: status.as_u16(),
                    message: extract_error_message(&body_text, status.as_u16()),
                });
            }

            if body_text.is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&body_text).map_err(|e| {
                CrmError::Decode(format!(
                    "{} - {}",
                    e,
                    body_text.chars().take(200).collect::<String>()
                ))
            });
        }
    }

    async fn backoff(&self, attempt: u32) {
        let delay = self.config.base_delay * 2u32.saturating_pow(attempt - 1);
        tokio::time::sleep(delay).await;
    }

    fn record_rate_limit(&self, headers: &HeaderMap) {
        let status = RateLimitStatus {
            remaining: header_i64(headers, "X-HubSpot-RateLimit-Remaining"),
            daily_remaining: header_i64(headers, "X-HubSpot-RateLimit-Daily-Remaining"),
        };

        if let Some(remaining) = status.remaining {
            if remaining < RATE_LIMIT_WARN_THRESHOLD {
                warn!(
                    "[CrmApi] rate-limit quota low: {} calls remaining in window",
                    remaining
                );
            }
        }

        *self.last_rate_limit.lock().unwrap() = status;
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, CrmError> {
        let value = self.call(Method::POST, path, Some(body)).await?;
        serde_json::from_value(value).map_err(|e| CrmError::Decode(e.to_string()))
    }
}

fn header_i64(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Pull a human-readable message out of a CRM error body.
fn extract_error_message(body: &str, status: u16) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        error: Option<String>,
    }

    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = parsed.message.or(parsed.error) {
            return message;
        }
    }
    if body.is_empty() {
        return format!("HTTP {}", status);
    }
    body.chars().take(200).collect()
}

#[async_trait]
impl CrmApi for CrmApiClient {
    async fn search_records(
        &self,
        object_type: &str,
        request: SearchRequest,
    ) -> Result<SearchResponse, CrmError> {
        let path = format!("/objects/{}/search", object_type);
        let body = serde_json::to_value(&request).map_err(|e| CrmError::Decode(e.to_string()))?;
        self.post(&path, &body).await
    }

    async fn batch_read(
        &self,
        object_type: &str,
        ids: &[String],
        properties: &[String],
    ) -> Result<Vec<CrmRecord>, CrmError> {
        if ids.len() > CRM_BATCH_LIMIT {
            return Err(CrmError::BatchTooLarge(ids.len()));
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let path = format!("/objects/{}/batch/read", object_type);
        let request = BatchReadRequest {
            properties: properties.to_vec(),
            inputs: ids
                .iter()
                .map(|id| BatchInputId { id: id.clone() })
                .collect(),
        };
        let body = serde_json::to_value(&request).map_err(|e| CrmError::Decode(e.to_string()))?;
        let response: BatchResponse = self.post(&path, &body).await?;
        Ok(response.results)
    }

    async fn batch_update(
        &self,
        object_type: &str,
        inputs: Vec<BatchUpdateInput>,
    ) -> Result<Vec<CrmRecord>, CrmError> {
        if inputs.len() > CRM_BATCH_LIMIT {
            return Err(CrmError::BatchTooLarge(inputs.len()));
        }
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let path = format!("/objects/{}/batch/update", object_type);
        let request = BatchUpdateRequest { inputs };
        let body = serde_json::to_value(&request).map_err(|e| CrmError::Decode(e.to_string()))?;
        let response: BatchResponse = self.post(&path, &body).await?;
        Ok(response.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const RATE_LIMITED: &str =
        "HTTP/1.1 429 Too Many Requests\r\nconnection: close\r\ncontent-length: 0\r\n\r\n";
    const OK_EMPTY_JSON: &str =
        "HTTP/1.1 200 OK\r\nconnection: close\r\ncontent-type: application/json\r\ncontent-length: 2\r\n\r\n{}";

    /// Serve one scripted response per incoming connection, counting
    /// connections. An empty script entry accepts the connection and drops
    /// it without replying.
    async fn scripted_server(responses: Vec<&'static str>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                counter.fetch_add(1, Ordering::SeqCst);
                if response.is_empty() {
                    continue;
                }
                let mut buf = [0u8; 1024];
                let mut request = Vec::new();
                loop {
                    let n = socket.read(&mut buf).await.unwrap();
                    request.extend_from_slice(&buf[..n]);
                    if n == 0 || request.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                socket.write_all(response.as_bytes()).await.unwrap();
            }
        });

        (format!("http://{}", addr), hits)
    }

    fn fast_config(base_url: &str) -> CrmClientConfig {
        let mut config = CrmClientConfig::new(base_url, "token");
        config.base_delay = Duration::from_millis(1);
        config
    }

    #[tokio::test]
    async fn test_persistent_429_exhausts_the_attempt_budget() {
        let (base_url, hits) = scripted_server(vec![RATE_LIMITED; 3]).await;
        let client = CrmApiClient::new(fast_config(&base_url)).unwrap();

        let result = client.call(Method::GET, "/objects/exams", None).await;

        assert!(matches!(
            result,
            Err(CrmError::RateLimitExceeded { attempts: 3 })
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_429_then_success_recovers_within_the_budget() {
        let (base_url, hits) = scripted_server(vec![RATE_LIMITED, OK_EMPTY_JSON]).await;
        let client = CrmApiClient::new(fast_config(&base_url)).unwrap();

        let value = client
            .call(Method::GET, "/objects/exams", None)
            .await
            .unwrap();

        assert!(value.is_object());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dropped_connection_is_retried_as_transient() {
        let (base_url, hits) = scripted_server(vec!["", OK_EMPTY_JSON]).await;
        let client = CrmApiClient::new(fast_config(&base_url)).unwrap();

        let value = client
            .call(Method::GET, "/objects/exams", None)
            .await
            .unwrap();

        assert!(value.is_object());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_client_creation() {
        let config = CrmClientConfig::new(DEFAULT_BASE_URL, "test-token");
        assert!(CrmApiClient::new(config).is_ok());
    }

    #[test]
    fn test_client_rejects_empty_token() {
        let config = CrmClientConfig::new(DEFAULT_BASE_URL, "  ");
        assert!(matches!(
            CrmApiClient::new(config),
            Err(CrmError::Config(_))
        ));
    }

    #[test]
    fn test_config_url_normalization() {
        let config = CrmClientConfig::new("https://api.hubapi.com/crm/v3/", "token");
        assert_eq!(config.base_url, "https://api.hubapi.com/crm/v3");
    }

    #[test]
    fn test_extract_error_message_prefers_message_field() {
        let body = r#"{"message": "Invalid filter property", "correlationId": "x"}"#;
        assert_eq!(extract_error_message(body, 400), "Invalid filter property");
    }

    #[test]
    fn test_extract_error_message_falls_back_to_status() {
        assert_eq!(extract_error_message("", 502), "HTTP 502");
    }

    #[tokio::test]
    async fn test_batch_read_rejects_oversized_input() {
        let config = CrmClientConfig::new(DEFAULT_BASE_URL, "token");
        let client = CrmApiClient::new(config).unwrap();
        let ids: Vec<String> = (0..CRM_BATCH_LIMIT + 1).map(|i| i.to_string()).collect();

        let result = client.batch_read("contacts", &ids, &[]).await;
        assert!(matches!(result, Err(CrmError::BatchTooLarge(n)) if n == CRM_BATCH_LIMIT + 1));
    }

    #[tokio::test]
    async fn test_batch_update_empty_input_is_noop() {
        let config = CrmClientConfig::new(DEFAULT_BASE_URL, "token");
        let client = CrmApiClient::new(config).unwrap();

        let updated = client.batch_update("bookings", Vec::new()).await.unwrap();
        assert!(updated.is_empty());
    }
}
