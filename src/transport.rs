//! Transport layer — executes one logical HTTP call reliably.
//!
//! ARCHITECTURE
//! ============
//! A logical call is an attempt loop wrapped in an overall deadline.
//! Single attempts go through the [`HttpSend`] trait so tests can script
//! failures; the production implementation is a `reqwest` client built
//! once with loose socket timeouts (the deadline is the real bound).
//!
//! RETRY POLICY
//! ============
//! I/O failures retry up to `max_attempts` total with `2^attempt * base`
//! back-off between attempts. Connection-establishment failures and
//! cancellations are re-raised on first occurrence: neither can be fixed
//! by another attempt inside the same deadline.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::AuthConfig;

/// Failure of a whole logical call, after retry policy has been applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The overall deadline elapsed before any attempt finished.
    #[error("deadline exceeded")]
    Timeout,

    /// DNS resolution or connection establishment failed.
    #[error("connection unavailable: {0}")]
    ConnectionUnavailable(String),

    /// The in-flight attempt was cancelled by its caller.
    #[error("request cancelled: {0}")]
    Cancelled(String),

    /// Generic I/O failure that survived all retry attempts.
    #[error("i/o failure: {0}")]
    Io(String),
}

impl TransportError {
    /// Whether the retry loop may re-attempt after this failure.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// Classified failure of a single attempt, reported by [`HttpSend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendFailure {
    /// Host unresolvable or connection refused.
    Connect(String),
    /// The attempt was cancelled mid-flight.
    Cancelled(String),
    /// Anything else: resets, socket errors, read timeouts.
    Io(String),
}

/// Raw HTTP outcome of a logical call. Non-2xx statuses are data here,
/// not errors; HTTP-level classification belongs to the auth client.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    /// Attempts performed for this call, the successful one included.
    pub attempts: u32,
}

/// One HTTP attempt. Object-safe so tests can script sequences.
#[async_trait::async_trait]
pub trait HttpSend: Send + Sync {
    async fn send(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<(u16, String), SendFailure>;
}

// =============================================================================
// REQWEST SENDER
// =============================================================================

/// Production sender backed by a shared `reqwest` client.
pub struct ReqwestSender {
    http: reqwest::Client,
}

impl ReqwestSender {
    /// Build the sender with the configured socket timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`SendFailure::Io`] if the HTTP client cannot be built.
    pub fn new(connect_timeout: Duration, socket_timeout: Duration) -> Result<Self, SendFailure> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(socket_timeout)
            .build()
            .map_err(|e| SendFailure::Io(e.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait::async_trait]
impl HttpSend for ReqwestSender {
    async fn send(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<(u16, String), SendFailure> {
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(classify_reqwest_error)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(classify_reqwest_error)?;
        Ok((status, text))
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> SendFailure {
    let message = source_chain(&e);
    if e.is_connect() || message.to_ascii_lowercase().contains("dns") {
        return SendFailure::Connect(message);
    }
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("canceled") || lowered.contains("cancelled") {
        return SendFailure::Cancelled(message);
    }
    SendFailure::Io(message)
}

fn source_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut current = e.source();
    while let Some(cause) = current {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        current = cause.source();
    }
    message
}

// =============================================================================
// TRANSPORT
// =============================================================================

/// Executes logical HTTP calls with deadline, retry, and logging.
pub struct Transport {
    sender: Arc<dyn HttpSend>,
    max_attempts: u32,
    backoff_base: Duration,
}

impl Transport {
    /// Build the production transport from config.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the HTTP client cannot be built.
    pub fn new(config: &AuthConfig) -> Result<Self, TransportError> {
        let sender = ReqwestSender::new(config.connect_timeout, config.socket_timeout)
            .map_err(|f| TransportError::Io(format!("http client build failed: {f:?}")))?;
        Ok(Self::with_sender(Arc::new(sender), config.max_attempts, config.backoff_base))
    }

    /// Build a transport over an arbitrary sender. Used by tests.
    #[must_use]
    pub fn with_sender(sender: Arc<dyn HttpSend>, max_attempts: u32, backoff_base: Duration) -> Self {
        Self { sender, max_attempts: max_attempts.max(1), backoff_base }
    }

    /// Execute one logical call under `deadline`.
    ///
    /// # Errors
    ///
    /// [`TransportError::Timeout`] when the deadline elapses, the
    /// classified single-attempt failure for non-retryable classes, or
    /// the last I/O failure after retries are exhausted.
    pub async fn execute(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&serde_json::Value>,
        deadline: Duration,
    ) -> Result<RawResponse, TransportError> {
        let request_id = Uuid::new_v4();
        match tokio::time::timeout(deadline, self.attempt_loop(request_id, method, url, body)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(%request_id, %url, deadline_ms = deadline.as_millis() as u64, "call deadline exceeded");
                Err(TransportError::Timeout)
            }
        }
    }

    async fn attempt_loop(
        &self,
        request_id: Uuid,
        method: reqwest::Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<RawResponse, TransportError> {
        let started = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            debug!(%request_id, %method, %url, attempt, "sending request");
            match self.sender.send(method.clone(), url, body).await {
                Ok((status, text)) => {
                    info!(
                        %request_id,
                        %method,
                        %url,
                        status,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        bytes = text.len(),
                        attempt,
                        "response received"
                    );
                    return Ok(RawResponse { status, body: text, attempts: attempt });
                }
                Err(SendFailure::Connect(message)) => {
                    error!(%request_id, %url, error = %message, "host unreachable; not retrying");
                    return Err(TransportError::ConnectionUnavailable(message));
                }
                Err(SendFailure::Cancelled(message)) => {
                    error!(%request_id, %url, error = %message, "attempt cancelled; not retrying");
                    return Err(TransportError::Cancelled(message));
                }
                Err(SendFailure::Io(message)) => {
                    if attempt >= self.max_attempts {
                        error!(
                            %request_id,
                            %url,
                            error = %message,
                            attempts = attempt,
                            "call failed after final attempt"
                        );
                        return Err(TransportError::Io(message));
                    }
                    let backoff = self.backoff_base * (1u32 << attempt);
                    warn!(
                        %request_id,
                        %url,
                        error = %message,
                        attempt,
                        max_attempts = self.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        "attempt failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
