//! HTTP fetch with bounded retry, capped exponential backoff and a politeness delay.
//!
//! The network itself sits behind [`Transport`] so the retry policy can be
//! driven by test doubles. [`HttpTransport`] is the reqwest-backed production
//! implementation.

use std::future::Future;
use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::{FailureKind, TransportError};
use crate::retry::{backoff_duration, sleep_or_cancel};

/// Stall detection: no body bytes for this long = transport timeout
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const ACCEPT_LISTING: &str = "application/json,application/xml,text/xml,text/html";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One logical request; re-sent verbatim on every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    pub body: Option<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Post,
            body: Some(body.into()),
        }
    }
}

/// Status and fully-read body of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Issues a single request attempt. No retry logic lives here.
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> + Send;
}

/// How a received status code is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Retryable,
    Fatal,
}

pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        500..=599 => StatusClass::Retryable,
        _ => StatusClass::Fatal,
    }
}

/// Terminal result of [`FetchExecutor::fetch`].
///
/// `attempts_used` is the index of the attempt that settled the fetch
/// (0-based), or the number of attempts made when retries ran out.
/// It never exceeds `max_attempts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success { body: Vec<u8>, attempts_used: u32 },
    Failure { kind: FailureKind, attempts_used: u32 },
}

impl FetchOutcome {
    fn cancelled(attempts_used: u32) -> Self {
        Self::Failure {
            kind: FailureKind::Cancelled,
            attempts_used,
        }
    }

    pub fn attempts_used(&self) -> u32 {
        match self {
            Self::Success { attempts_used, .. } | Self::Failure { attempts_used, .. } => {
                *attempts_used
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Retry policy for one executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Politeness pause applied after every successful response
    pub per_request_delay: Duration,
    /// Per-attempt deadline covering connect, headers and body
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            per_request_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Applies [`FetchConfig`] around a [`Transport`].
#[derive(Debug)]
pub struct FetchExecutor<T> {
    transport: T,
    config: FetchConfig,
}

impl<T: Transport> FetchExecutor<T> {
    pub fn new(transport: T, config: FetchConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        backoff_duration(self.config.base_delay, self.config.max_delay, attempt)
    }

    /// Fetch `request`, retrying 5xx and transport failures with backoff.
    ///
    /// Any other status fails immediately. Both the in-flight request and
    /// every sleep race `cancel`; losing that race yields `Cancelled`.
    pub async fn fetch(&self, request: &FetchRequest, cancel: &CancellationToken) -> FetchOutcome {
        let max_attempts = self.config.max_attempts;
        let mut attempt = 0u32;
        loop {
            if attempt >= max_attempts {
                log::error!("{}: no attempts left ({max_attempts} allowed)", request.url);
                return FetchOutcome::Failure {
                    kind: FailureKind::RetryExhausted,
                    attempts_used: attempt,
                };
            }

            let sent = tokio::select! {
                biased;
                () = cancel.cancelled() => return FetchOutcome::cancelled(attempt),
                result = tokio::time::timeout(self.config.timeout, self.transport.send(request)) => result,
            };

            let failure = match sent {
                Ok(Ok(response)) => match classify_status(response.status) {
                    StatusClass::Success => {
                        if !sleep_or_cancel(self.config.per_request_delay, cancel).await {
                            return FetchOutcome::cancelled(attempt);
                        }
                        return FetchOutcome::Success {
                            body: response.body,
                            attempts_used: attempt,
                        };
                    }
                    StatusClass::Retryable => format!("HTTP {}", response.status),
                    StatusClass::Fatal => {
                        log::error!("{}: HTTP {}, not retrying", request.url, response.status);
                        return FetchOutcome::Failure {
                            kind: FailureKind::ClientRejected(response.status),
                            attempts_used: attempt,
                        };
                    }
                },
                Ok(Err(e)) => e.to_string(),
                Err(_) => TransportError::Timeout.to_string(),
            };

            // The last allowed attempt failed: sleeping again would only delay the verdict.
            if attempt + 1 >= max_attempts {
                log::error!(
                    "{}: failed permanently after {max_attempts} attempts: {failure}",
                    request.url
                );
                return FetchOutcome::Failure {
                    kind: FailureKind::RetryExhausted,
                    attempts_used: attempt + 1,
                };
            }

            let delay = self.backoff(attempt);
            log::warn!(
                "{}: attempt {}/{max_attempts} failed: {failure}, retrying in {delay:?}",
                request.url,
                attempt + 1
            );
            if !sleep_or_cancel(delay, cancel).await {
                return FetchOutcome::cancelled(attempt);
            }
            attempt += 1;
        }
    }
}

/// reqwest-backed transport with a shared connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str, pool_size: usize) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(pool_size)
            .user_agent(user_agent)
            .build()
            .map_err(|e| TransportError::from_reqwest(&e))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: &FetchRequest) -> Result<RawResponse, TransportError> {
        use reqwest::header::{ACCEPT, ACCEPT_CHARSET, CONTENT_TYPE};

        let builder = match request.method {
            Method::Get => self
                .client
                .get(&request.url)
                .header(ACCEPT, ACCEPT_LISTING)
                .header(ACCEPT_CHARSET, "UTF-8"),
            Method::Post => self
                .client
                .post(&request.url)
                .header(CONTENT_TYPE, "application/json")
                .header(ACCEPT, "application/json"),
        };
        let builder = match &request.body {
            Some(body) if !body.is_empty() => builder.body(body.clone()),
            _ => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&e))?;
        let status = response.status().as_u16();

        // Read the body chunk by chunk so a stalled server surfaces as a timeout
        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        loop {
            match tokio::time::timeout(READ_TIMEOUT, stream.next()).await {
                Ok(Some(chunk)) => {
                    body.extend_from_slice(&chunk.map_err(|e| TransportError::from_reqwest(&e))?)
                }
                Ok(None) => break,
                Err(_) => return Err(TransportError::Timeout),
            }
        }

        Ok(RawResponse { status, body })
    }
}
