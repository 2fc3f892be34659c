//! Domain error taxonomy and server error-message extraction.
//!
//! DESIGN
//! ======
//! Every operation returns one of these kinds, computed exactly once at
//! the auth-client boundary. The transport layer raises only the
//! network-shaped kinds; `ServerRejected`, `MalformedResponse` and
//! `InvalidInput` are produced here; the state machine never
//! re-interprets an error, it only displays the message.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

/// Classified failure of an auth operation. `Display` is the
/// human-readable message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The overall per-call deadline was exceeded.
    #[error("The server is taking too long to respond. Please try again in a moment.")]
    Timeout,

    /// DNS resolution or connection establishment failed.
    #[error("Could not reach the server. Check your internet connection and try again.")]
    ConnectionUnavailable,

    /// The in-flight request was cancelled by its caller.
    #[error("The request was cancelled before it completed.")]
    Cancelled,

    /// The server answered with a 4xx/5xx status.
    #[error("{message}")]
    ServerRejected { status: u16, message: String },

    /// A non-2xx response body could not be interpreted at all.
    #[error("Failed to parse the server response: {0}")]
    MalformedResponse(String),

    /// Local validation failed before any network call.
    #[error("{0}")]
    InvalidInput(String),

    /// Catch-all wrapping the underlying failure for diagnostics.
    #[error("{0}")]
    Unknown(String),
}

impl AuthError {
    /// Stable code for structured logging.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout => "E_TIMEOUT",
            Self::ConnectionUnavailable => "E_CONNECTION_UNAVAILABLE",
            Self::Cancelled => "E_CANCELLED",
            Self::ServerRejected { .. } => "E_SERVER_REJECTED",
            Self::MalformedResponse(_) => "E_MALFORMED_RESPONSE",
            Self::InvalidInput(_) => "E_INVALID_INPUT",
            Self::Unknown(_) => "E_UNKNOWN",
        }
    }
}

/// Error body shape most backends use; both keys are optional.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

static MESSAGE_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""message"\s*:\s*"([^"]+)""#).expect("static regex"));

/// Extract a human-readable message from an HTTP error response.
///
/// Precedence: parsed `message`/`error` field, then a best-effort regex
/// scan of the raw body, then the raw body itself when it is prose
/// rather than JSON structure, then a status-specific default.
#[must_use]
pub fn server_message(status: u16, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = parsed.message.or(parsed.error) {
            if !message.trim().is_empty() {
                return message;
            }
        }
        // Well-formed JSON without a usable message is structure, not
        // prose; showing it to a user helps nobody.
        return default_status_message(status).to_owned();
    }
    if let Some(captures) = MESSAGE_FIELD.captures(body) {
        let found = captures[1].trim();
        if !found.is_empty() {
            return found.to_owned();
        }
    }
    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.to_owned();
    }
    default_status_message(status).to_owned()
}

/// Fixed fallback message per status code.
#[must_use]
pub fn default_status_message(status: u16) -> &'static str {
    match status {
        400 => "Invalid request. Please check your input.",
        401 => "Authentication failed. Please check your credentials.",
        403 => "Access denied. You don't have permission to perform this action.",
        404 => "Resource not found.",
        409 => "This email is already registered. Please use a different email or try logging in.",
        500 => "Server error. Please try again later.",
        _ => "An error occurred. Please try again.",
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
