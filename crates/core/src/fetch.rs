//! Retrying Fetch Client
//!
//! Every outbound call to a remote generation service goes through
//! [`RetryingClient`]. It retries transport failures, rate limiting (429) and
//! server errors (5xx) with a doubling backoff, and reports every other outcome
//! as a value so callers can degrade instead of failing the session.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use std::{fmt, sync::Arc, time::Duration};
use tracing::{debug, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors produced while calling a remote service.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Credential not configured: {0}")]
    MissingCredential(String),
    #[error("{service} returned non-retryable status {status}")]
    Status { service: String, status: u16 },
    #[error("{service} failed after {attempts} attempts: {last_failure}")]
    Exhausted {
        service: String,
        attempts: u32,
        last_failure: String,
    },
    #[error("{service} returned a malformed response: {reason}")]
    Malformed { service: String, reason: String },
    #[error("Failed to encode request body: {0}")]
    Encode(String),
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// A transport-level failure (connection refused, reset, TLS, body read).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// The backoff budget applied to a single outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait before the zero-based `attempt`.
    ///
    /// The first attempt is never delayed; attempt `k` waits
    /// `initial_delay * multiplier^(k-1)`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.saturating_pow(attempt - 1);
        self.initial_delay.saturating_mul(factor)
    }

    /// Whether a response status is worth another attempt.
    pub fn is_retryable(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }
}

/// Describes one outbound call: where it goes, how, and with what body.
#[derive(Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub endpoint: String,
    headers: Vec<(String, String)>,
    pub payload: serde_json::Value,
}

impl RequestDescriptor {
    /// A POST carrying `body` serialized as JSON.
    pub fn post_json<Req: Serialize>(
        endpoint: impl Into<String>,
        body: &Req,
    ) -> Result<Self, FetchError> {
        let payload =
            serde_json::to_value(body).map_err(|e| FetchError::Encode(e.to_string()))?;
        Ok(Self {
            method: Method::POST,
            endpoint: endpoint.into(),
            headers: Vec::new(),
            payload,
        })
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

// Header values may carry the API key, so only their names are printed.
impl fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header_names: Vec<&str> = self.headers.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("RequestDescriptor")
            .field("method", &self.method)
            .field("endpoint", &self.endpoint)
            .field("headers", &header_names)
            .finish_non_exhaustive()
    }
}

/// The status and raw body of a completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Performs a single HTTP exchange with no retry logic of its own.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportError>;
}

/// `Transport` backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.endpoint)
            .json(&request.payload);
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }

        // `without_url` keeps query strings out of error messages and logs.
        let response = builder
            .send()
            .await
            .map_err(|e| TransportError(e.without_url().to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError(e.without_url().to_string()))?;
        Ok(RawResponse { status, body })
    }
}

/// Executes requests under a [`RetryPolicy`].
#[derive(Clone)]
pub struct RetryingClient {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl RetryingClient {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// A client using `HttpTransport` and the default policy.
    pub fn http() -> Result<Self, FetchError> {
        Ok(Self::new(
            Arc::new(HttpTransport::new()?),
            RetryPolicy::default(),
        ))
    }

    /// Sends `request` until it succeeds, hits a terminal status, or the budget runs out.
    pub async fn execute(
        &self,
        service: &str,
        request: &RequestDescriptor,
    ) -> Result<RawResponse, FetchError> {
        let mut last_failure = String::from("no attempt was made");

        for attempt in 0..self.policy.max_attempts {
            let delay = self.policy.delay_before(attempt);
            if !delay.is_zero() {
                debug!(
                    service,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Backing off before retry"
                );
                tokio::time::sleep(delay).await;
            }

            debug!(service, attempt = attempt + 1, endpoint = %request.endpoint, "Sending request");
            match self.transport.send(request).await {
                Ok(response) if response.status.is_success() => return Ok(response),
                Ok(response) if RetryPolicy::is_retryable(response.status) => {
                    warn!(
                        service,
                        attempt = attempt + 1,
                        status = response.status.as_u16(),
                        "Retryable status from remote service"
                    );
                    last_failure = format!("status {}", response.status.as_u16());
                }
                Ok(response) => {
                    warn!(
                        service,
                        status = response.status.as_u16(),
                        "Non-retryable status from remote service"
                    );
                    return Err(FetchError::Status {
                        service: service.to_string(),
                        status: response.status.as_u16(),
                    });
                }
                Err(e) => {
                    warn!(service, attempt = attempt + 1, error = %e, "Transport failure");
                    last_failure = e.to_string();
                }
            }
        }

        Err(FetchError::Exhausted {
            service: service.to_string(),
            attempts: self.policy.max_attempts,
            last_failure,
        })
    }

    /// Like [`execute`](Self::execute), then decodes the body as `Resp`.
    pub async fn call<Resp: DeserializeOwned>(
        &self,
        service: &str,
        request: &RequestDescriptor,
    ) -> Result<Resp, FetchError> {
        let response = self.execute(service, request).await?;
        serde_json::from_slice(&response.body).map_err(|e| FetchError::Malformed {
            service: service.to_string(),
            reason: e.to_string(),
        })
    }
}
