//! Client configuration parsed from the environment or built in code.
//!
//! DESIGN
//! ======
//! Deadlines are per logical call and bound the whole attempt loop,
//! retries included. Socket timeouts on the HTTP client are deliberately
//! loose: cold-start backends can sit silent for tens of seconds before
//! the first byte, so the per-call deadline is the real bound.

use std::time::Duration;

pub const DEFAULT_LOGIN_DEADLINE_SECS: u64 = 90;
pub const DEFAULT_RESEND_DEADLINE_SECS: u64 = 60;
pub const DEFAULT_REQUEST_DEADLINE_SECS: u64 = 60;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SOCKET_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The required base URL environment variable is not set.
    #[error("missing base URL: env var {var} not set")]
    MissingBaseUrl { var: String },

    /// The base URL is not an http(s) URL.
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

/// Auth API client configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Base URL of the remote auth API, without a trailing slash.
    pub base_url: String,
    /// Overall deadline for login and register calls.
    pub login_deadline: Duration,
    /// Overall deadline for resend-verification calls.
    pub resend_deadline: Duration,
    /// Overall deadline for every other call.
    pub request_deadline: Duration,
    /// TCP connection establishment timeout.
    pub connect_timeout: Duration,
    /// Per-attempt socket timeout on the HTTP client.
    pub socket_timeout: Duration,
    /// Total attempts per logical call, first try included.
    pub max_attempts: u32,
    /// Base delay for exponential retry back-off.
    pub backoff_base: Duration,
}

impl AuthConfig {
    /// Build a config with default timeouts for the given base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] if the URL has no http(s)
    /// scheme.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let base_url = normalize_base_url(base_url)?;
        Ok(Self {
            base_url,
            login_deadline: Duration::from_secs(DEFAULT_LOGIN_DEADLINE_SECS),
            resend_deadline: Duration::from_secs(DEFAULT_RESEND_DEADLINE_SECS),
            request_deadline: Duration::from_secs(DEFAULT_REQUEST_DEADLINE_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            socket_timeout: Duration::from_secs(DEFAULT_SOCKET_TIMEOUT_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
        })
    }

    /// Build typed config from environment variables.
    ///
    /// Required:
    /// - `AUTH_BASE_URL`
    ///
    /// Optional (defaults in parentheses):
    /// - `AUTH_LOGIN_DEADLINE_SECS` (90)
    /// - `AUTH_RESEND_DEADLINE_SECS` (60)
    /// - `AUTH_REQUEST_DEADLINE_SECS` (60)
    /// - `AUTH_CONNECT_TIMEOUT_SECS` (30)
    /// - `AUTH_SOCKET_TIMEOUT_SECS` (300)
    /// - `AUTH_MAX_ATTEMPTS` (3)
    /// - `AUTH_BACKOFF_BASE_MS` (1000)
    ///
    /// # Errors
    ///
    /// Returns an error if `AUTH_BASE_URL` is absent or malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = std::env::var("AUTH_BASE_URL")
            .map_err(|_| ConfigError::MissingBaseUrl { var: "AUTH_BASE_URL".into() })?;
        let mut config = Self::new(&base_url)?;
        config.login_deadline =
            Duration::from_secs(env_parse("AUTH_LOGIN_DEADLINE_SECS", DEFAULT_LOGIN_DEADLINE_SECS));
        config.resend_deadline =
            Duration::from_secs(env_parse("AUTH_RESEND_DEADLINE_SECS", DEFAULT_RESEND_DEADLINE_SECS));
        config.request_deadline =
            Duration::from_secs(env_parse("AUTH_REQUEST_DEADLINE_SECS", DEFAULT_REQUEST_DEADLINE_SECS));
        config.connect_timeout =
            Duration::from_secs(env_parse("AUTH_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS));
        config.socket_timeout =
            Duration::from_secs(env_parse("AUTH_SOCKET_TIMEOUT_SECS", DEFAULT_SOCKET_TIMEOUT_SECS));
        config.max_attempts = env_parse("AUTH_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS);
        config.backoff_base = Duration::from_millis(env_parse("AUTH_BACKOFF_BASE_MS", DEFAULT_BACKOFF_BASE_MS));
        Ok(config)
    }

    /// Absolute URL for an API path like `auth/login`.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(ConfigError::InvalidBaseUrl(raw.to_owned()));
    }
    Ok(trimmed.to_owned())
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_trims_trailing_slash() {
        let config = AuthConfig::new("https://api.example.com/v1/").unwrap();
        assert_eq!(config.base_url, "https://api.example.com/v1");
        assert_eq!(config.endpoint("auth/login"), "https://api.example.com/v1/auth/login");
        assert_eq!(config.endpoint("/auth/login"), "https://api.example.com/v1/auth/login");
    }

    #[test]
    fn new_rejects_missing_scheme() {
        assert!(matches!(
            AuthConfig::new("api.example.com"),
            Err(ConfigError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn defaults_match_contract() {
        let config = AuthConfig::new("https://api.example.com").unwrap();
        assert_eq!(config.login_deadline, Duration::from_secs(90));
        assert_eq!(config.resend_deadline, Duration::from_secs(60));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.backoff_base, Duration::from_millis(1000));
    }

    #[test]
    fn env_parse_falls_back_on_garbage() {
        assert_eq!(env_parse("AUTHGATE_TEST_UNSET_KEY", 7u32), 7);
    }
}
