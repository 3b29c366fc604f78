//! Request executor
//!
//! Serializes outbound REST calls through the rate limiter, absorbs back-off
//! signals, retries transient failures with exponential backoff, and feeds
//! server-reported bucket state back into the limiter.

use crate::ratelimit::{Acquire, RateLimiter};
use crate::route::{Method, Route};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tern_common::{RestConfig, RestError};
use tokio_util::sync::CancellationToken;

const HEADER_LIMIT: &str = "X-RateLimit-Limit";
const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
const HEADER_RESET_AFTER: &str = "X-RateLimit-Reset-After";

/// Cap on server-supplied wait durations; anything larger (or unrepresentable)
/// is clamped rather than trusted
const MAX_SERVER_WAIT: Duration = Duration::from_secs(300);

/// An outbound command request
#[derive(Debug, Clone)]
pub struct ApiRequest {
    route: Route,
    body: Option<Value>,
}

impl ApiRequest {
    /// Create a request with no body
    #[must_use]
    pub fn new(route: Route) -> Self {
        Self { route, body: None }
    }

    /// Attach a JSON body
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// The request's route
    #[must_use]
    pub fn route(&self) -> &Route {
        &self.route
    }
}

/// A completed command response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: u16,
    body: Value,
}

impl ApiResponse {
    /// HTTP status code
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Decoded JSON body (`Value::Null` for empty responses)
    #[must_use]
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Deserialize the body into a concrete type
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, RestError> {
        serde_json::from_value(self.body.clone()).map_err(|e| RestError::Api {
            status: self.status,
            message: format!("response body did not match expected shape: {e}"),
        })
    }
}

/// Back-off signal body
#[derive(Debug, Deserialize)]
struct BackoffBody {
    retry_after: f64,
    #[serde(default, rename = "global")]
    is_global: bool,
}

/// Gateway endpoint discovery response
#[derive(Debug, Deserialize)]
struct GatewayEndpoint {
    url: String,
}

/// Executes REST calls under the rate limiter
pub struct RequestExecutor {
    http: reqwest::Client,
    limiter: Arc<RateLimiter>,
    config: RestConfig,
    token: String,
    cancel: CancellationToken,
}

impl RequestExecutor {
    /// Create an executor
    ///
    /// The cancellation token is checked at every suspension point, so a
    /// shutdown is observed promptly even mid-wait.
    pub fn new(
        config: RestConfig,
        token: impl Into<String>,
        cancel: CancellationToken,
    ) -> Result<Self, RestError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            http,
            limiter: Arc::new(RateLimiter::new(config.global_limit, config.bucket_idle_period)),
            config,
            token: token.into(),
            cancel,
        })
    }

    /// The shared rate limiter
    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Fetch the gateway socket endpoint
    pub async fn get_gateway(&self) -> Result<String, RestError> {
        let response = self.execute(&ApiRequest::new(Route::new(Method::GET, "/gateway"))).await?;
        let endpoint: GatewayEndpoint = response.json()?;
        Ok(endpoint.url)
    }

    /// Execute a request to completion or terminal failure
    ///
    /// Back-off signals and transient transport failures are absorbed and
    /// retried up to the configured bound; everything else surfaces as a
    /// typed error.
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, RestError> {
        let key = request.route().bucket_key();
        let url = format!("{}{}", self.config.base_url, request.route().path());
        let mut last_retry_after: Option<Duration> = None;

        for attempt in 0..self.config.max_retries {
            self.gate(&key).await?;

            let mut builder = self
                .http
                .request(request.route().method().clone(), &url)
                .header(reqwest::header::AUTHORIZATION, &self.token);
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let sent = tokio::select! {
                () = self.cancel.cancelled() => return Err(RestError::Cancelled),
                result = builder.send() => result,
            };

            let response = match sent {
                Ok(response) => response,
                Err(e) => {
                    let err = if e.is_timeout() {
                        RestError::Timeout
                    } else {
                        RestError::Transport(e)
                    };
                    if !err.is_transient() {
                        return Err(err);
                    }
                    let backoff = Self::backoff_delay(attempt);
                    tracing::warn!(
                        route = %key,
                        error = %err,
                        backoff_secs = backoff.as_secs(),
                        attempt,
                        "Transient request failure, backing off"
                    );
                    self.sleep(backoff).await?;
                    continue;
                }
            };

            let status = response.status();
            let headers = response.headers().clone();
            let body = Self::read_body(response).await;

            // 429 state is applied via note_backoff instead
            if status != StatusCode::TOO_MANY_REQUESTS {
                self.apply_headers(&key, &headers);
            }

            if status.is_success() {
                tracing::debug!(route = %key, status = status.as_u16(), "Request completed");
                return Ok(ApiResponse {
                    status: status.as_u16(),
                    body,
                });
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let backoff: BackoffBody =
                    serde_json::from_value(body).unwrap_or(BackoffBody {
                        retry_after: 1.0,
                        is_global: false,
                    });
                let retry_after = Self::server_wait(backoff.retry_after);
                last_retry_after = Some(retry_after);
                tracing::warn!(
                    route = %key,
                    retry_after_ms = retry_after.as_millis() as u64,
                    global = backoff.is_global,
                    "Back-off signal received, retrying after the window"
                );
                // the exhausted bucket makes the next gate() wait it out
                self.limiter.note_backoff(&key, retry_after, backoff.is_global);
                continue;
            }

            if status.is_server_error() {
                let backoff = Self::backoff_delay(attempt);
                tracing::warn!(
                    route = %key,
                    status = status.as_u16(),
                    backoff_secs = backoff.as_secs(),
                    "Server error, backing off"
                );
                self.sleep(backoff).await?;
                continue;
            }

            let message = Self::error_message(&body, status);
            return Err(match status.as_u16() {
                403 => RestError::Forbidden(message),
                404 => RestError::NotFound(message),
                s => RestError::Api { status: s, message },
            });
        }

        Err(match last_retry_after {
            Some(retry_after) => RestError::RateLimitExhausted { retry_after },
            None => RestError::RetriesExhausted {
                attempts: self.config.max_retries,
            },
        })
    }

    /// Block until the rate limiter grants a permit
    async fn gate(&self, key: &str) -> Result<(), RestError> {
        loop {
            match self.limiter.acquire(key) {
                Acquire::Permit => return Ok(()),
                Acquire::Wait(wait) => {
                    tracing::debug!(
                        route = %key,
                        wait_ms = wait.as_millis() as u64,
                        "Bucket exhausted, waiting for reset"
                    );
                    self.sleep(wait).await?;
                }
            }
        }
    }

    async fn sleep(&self, duration: Duration) -> Result<(), RestError> {
        tokio::select! {
            () = self.cancel.cancelled() => Err(RestError::Cancelled),
            () = tokio::time::sleep(duration) => Ok(()),
        }
    }

    fn backoff_delay(attempt: u32) -> Duration {
        Duration::from_secs(1 + u64::from(attempt) * 2)
    }

    /// Decode a server-supplied seconds value into a bounded wait
    ///
    /// The value comes off the wire (429 body, reset-after header), so NaN,
    /// negative, and absurdly large inputs must not panic the executor.
    fn server_wait(seconds: f64) -> Duration {
        if seconds.is_nan() || seconds <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(seconds)
            .map_or(MAX_SERVER_WAIT, |wait| wait.min(MAX_SERVER_WAIT))
    }

    fn apply_headers(&self, key: &str, headers: &HeaderMap) {
        let Some(remaining) = parse_header(headers, HEADER_REMAINING) else {
            return;
        };
        let Some(limit) = parse_header(headers, HEADER_LIMIT) else {
            return;
        };
        let Some(reset_after) = parse_header::<f64>(headers, HEADER_RESET_AFTER) else {
            return;
        };
        self.limiter
            .update(key, remaining, limit, Self::server_wait(reset_after));
    }

    async fn read_body(response: reqwest::Response) -> Value {
        match response.text().await {
            Ok(text) if !text.is_empty() => {
                serde_json::from_str(&text).unwrap_or(Value::String(text))
            }
            _ => Value::Null,
        }
    }

    fn error_message(body: &Value, status: StatusCode) -> String {
        body.get("message")
            .and_then(Value::as_str)
            .map_or_else(|| status.to_string(), ToString::to_string)
    }
}

fn parse_header<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers.get(name)?.to_str().ok()?.parse().ok()
}
