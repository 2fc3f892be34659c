//! Auth client — domain operations over the transport layer.
//!
//! ARCHITECTURE
//! ============
//! Each operation issues one logical call (plus, for login, a
//! best-effort profile refresh), then normalizes both the response body
//! and any failure exactly once. Callers never see a raw wire shape or
//! an unclassified error. Local validation failures short-circuit
//! before any network activity.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::AuthConfig;
use crate::error::{AuthError, server_message};
use crate::response::{
    AuthOutcome, AuthResponse, EmailRequest, LoginRequest, RegisterRequest, ResetPasswordRequest, UserProfile,
    VerifyCodeRequest, normalize,
};
use crate::store::{ForgotPasswordContext, SessionStore, StoreError};
use crate::transport::{RawResponse, Transport, TransportError};

/// Message synthesized when registration succeeds without a parseable
/// body or without a token.
pub const VERIFICATION_PROMPT: &str =
    "Account created successfully. Please check your email for the verification link.";

/// Registration form data, validated locally before the network call.
#[derive(Debug, Clone)]
pub struct RegisterData {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub birth_date: String,
    pub role: String,
    pub password: String,
}

/// What a successful registration means for the session.
#[derive(Debug, Clone)]
pub enum RegistrationOutcome {
    /// The server returned a token; the account is live immediately.
    Authenticated(AuthOutcome),
    /// Account created, email confirmation still required.
    VerificationRequired {
        email: String,
        message: String,
        profile: Option<UserProfile>,
    },
}

pub struct AuthClient {
    transport: Transport,
    store: SessionStore,
    config: AuthConfig,
}

impl AuthClient {
    /// Build the production client.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unknown`] if the HTTP client cannot be built.
    pub fn new(config: AuthConfig, store: SessionStore) -> Result<Self, AuthError> {
        let transport = Transport::new(&config).map_err(map_transport)?;
        Ok(Self::with_transport(config, store, transport))
    }

    /// Build a client over an arbitrary transport. Used by tests.
    #[must_use]
    pub fn with_transport(config: AuthConfig, store: SessionStore, transport: Transport) -> Self {
        Self { transport, store, config }
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    // =========================================================================
    // LOGIN
    // =========================================================================

    /// Authenticate with email and password.
    ///
    /// A 2xx response without any token is still a success: the server
    /// may be running cookie-based sessions. The follow-up profile fetch
    /// is best-effort and can never fail the login.
    ///
    /// # Errors
    ///
    /// Any [`AuthError`] kind except `InvalidInput`.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthOutcome, AuthError> {
        info!(email, "login requested");
        let body = serde_json::to_value(LoginRequest { email, password }).map_err(encoding_error)?;
        let response = self
            .post("auth/login", &body, self.config.login_deadline)
            .await?;
        let raw = parse_checked(response)?;
        let mut outcome = normalize(&raw);

        match &outcome.token {
            Some(token) => {
                if let Err(e) = self.store.save_token(token).await {
                    error!(error = %e, "failed to persist session token");
                }
            }
            None => {
                warn!(email, "no token in login response; server may be using cookie-based auth");
            }
        }

        // Best-effort refresh: a stale login payload is better than a
        // failed login.
        if let Some(id) = outcome.profile.as_ref().and_then(|p| p.id.clone()) {
            match self.fetch_user(&id).await {
                Ok(profile) => outcome.profile = Some(profile),
                Err(e) => {
                    warn!(code = e.code(), error = %e, "profile refresh failed; keeping login response profile");
                }
            }
        }

        info!(email, authenticated = true, "login succeeded");
        Ok(outcome)
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    /// Create an account.
    ///
    /// An HTTP 2xx whose body cannot be parsed is a success with a
    /// synthesized verification message: the account exists server-side
    /// even when the response shape surprises us.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for incomplete or malformed form data before any
    /// network call, otherwise any transport or server kind.
    pub async fn register(&self, data: &RegisterData) -> Result<RegistrationOutcome, AuthError> {
        if [
            &data.first_name,
            &data.last_name,
            &data.email,
            &data.phone,
            &data.birth_date,
            &data.password,
        ]
        .iter()
        .any(|field| field.trim().is_empty())
        {
            return Err(AuthError::InvalidInput("All fields are required.".into()));
        }
        let Some(email) = validate_email(&data.email) else {
            return Err(AuthError::InvalidInput(
                "Invalid email address format. Please check your email and try again.".into(),
            ));
        };

        info!(%email, "registration requested");
        let body = serde_json::to_value(RegisterRequest {
            first_name: &data.first_name,
            last_name: &data.last_name,
            email: &email,
            phone: &data.phone,
            birth_date: &data.birth_date,
            role: &data.role,
            password: &data.password,
        })
        .map_err(encoding_error)?;
        let response = self
            .post("auth/register", &body, self.config.login_deadline)
            .await?;
        let response = check_status(response)?;

        let raw: AuthResponse = match serde_json::from_str(&response.body) {
            Ok(raw) => raw,
            Err(e) => {
                // EDGE: 2xx with an alien body. The account was created;
                // surfacing a parse error here would be a lie.
                warn!(status = response.status, error = %e, "registration response unparseable; treating as success");
                return Ok(RegistrationOutcome::VerificationRequired {
                    email,
                    message: VERIFICATION_PROMPT.to_owned(),
                    profile: None,
                });
            }
        };

        let outcome = normalize(&raw);
        match &outcome.token {
            Some(token) => {
                if let Err(e) = self.store.save_token(token).await {
                    error!(error = %e, "failed to persist session token");
                }
                info!(%email, "registration succeeded with immediate session");
                Ok(RegistrationOutcome::Authenticated(outcome))
            }
            None => {
                let email = outcome.email.clone().unwrap_or(email);
                info!(%email, "registration succeeded; email verification pending");
                Ok(RegistrationOutcome::VerificationRequired {
                    email,
                    message: VERIFICATION_PROMPT.to_owned(),
                    profile: outcome.profile,
                })
            }
        }
    }

    /// Ask the server to send a fresh verification email.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for an implausible address (no network call),
    /// otherwise any transport or server kind.
    pub async fn resend_verification(&self, email: &str) -> Result<AuthOutcome, AuthError> {
        let Some(email) = validate_email(email) else {
            return Err(AuthError::InvalidInput(
                "Invalid email address format. Please check your email and try again.".into(),
            ));
        };
        info!(%email, "resend verification requested");
        let body = serde_json::to_value(EmailRequest { email: &email }).map_err(encoding_error)?;
        let response = self
            .post("auth/resend-verification", &body, self.config.resend_deadline)
            .await?;
        let raw = parse_checked(response)?;
        Ok(normalize(&raw))
    }

    /// Confirm an email with the one-time code.
    ///
    /// The target email resolves from the caller's hint (in-memory
    /// pending email or current UI state) and falls back to the
    /// persisted pending record.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when no email can be resolved (no network call),
    /// otherwise any transport or server kind.
    pub async fn verify_email(&self, code: &str, email_hint: Option<&str>) -> Result<AuthOutcome, AuthError> {
        let email = self
            .resolve_email(email_hint)
            .await?
            .ok_or_else(|| AuthError::InvalidInput("Email address not found. Please register again.".into()))?;

        info!(%email, "email verification requested");
        let body = serde_json::to_value(VerifyCodeRequest { code, email: &email }).map_err(encoding_error)?;
        let response = self
            .post("auth/verify-email", &body, self.config.request_deadline)
            .await?;
        let raw = parse_checked(response)?;
        let outcome = normalize(&raw);

        if let Some(token) = &outcome.token {
            if let Err(e) = self.store.save_token(token).await {
                error!(error = %e, "failed to persist session token");
            }
        }
        Ok(outcome)
    }

    // =========================================================================
    // FORGOT-PASSWORD FLOW
    // =========================================================================

    /// Step 1: request a reset code for the address.
    ///
    /// # Errors
    ///
    /// Any transport or server kind.
    pub async fn forgot_password(&self, email: &str) -> Result<AuthOutcome, AuthError> {
        info!(email, "password reset code requested");
        let body = serde_json::to_value(EmailRequest { email }).map_err(encoding_error)?;
        let response = self
            .post("auth/forgot-password", &body, self.config.request_deadline)
            .await?;
        let raw = parse_checked(response)?;
        Ok(normalize(&raw))
    }

    /// Step 2: verify the emailed reset code. On success the
    /// (email, code) context is persisted so step 3 survives a restart.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when no email can be resolved (no network call),
    /// otherwise any transport or server kind.
    pub async fn verify_reset_code(
        &self,
        code: &str,
        email_hint: Option<&str>,
    ) -> Result<(AuthOutcome, ForgotPasswordContext), AuthError> {
        let email = self.resolve_email(email_hint).await?.ok_or_else(|| {
            AuthError::InvalidInput("Email address not found. Please restart the forgot password flow.".into())
        })?;

        info!(%email, "reset code verification requested");
        let body = serde_json::to_value(VerifyCodeRequest { code, email: &email }).map_err(encoding_error)?;
        let response = self
            .post("auth/verify-reset-code", &body, self.config.request_deadline)
            .await?;
        let raw = parse_checked(response)?;

        let context = ForgotPasswordContext { email, code: code.to_owned() };
        if let Err(e) = self.store.save_forgot_password_context(&context).await {
            error!(error = %e, "failed to persist forgot-password context");
        }
        Ok((normalize(&raw), context))
    }

    /// Step 3: set the new password using the verified context.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when the confirmation mismatches or no context
    /// exists in memory or storage (no network call in either case),
    /// otherwise any transport or server kind.
    pub async fn reset_password(
        &self,
        context_hint: Option<&ForgotPasswordContext>,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<AuthOutcome, AuthError> {
        if new_password != confirm_password {
            return Err(AuthError::InvalidInput("Passwords do not match.".into()));
        }
        let context = match context_hint {
            Some(context) => context.clone(),
            None => self
                .store
                .forgot_password_context()
                .await
                .map_err(map_store)?
                .ok_or_else(|| AuthError::InvalidInput("Reset context missing. Please request a new code.".into()))?,
        };

        info!(email = %context.email, "password reset requested");
        let body = serde_json::to_value(ResetPasswordRequest {
            email: &context.email,
            code: &context.code,
            new_password,
            confirm_password,
        })
        .map_err(encoding_error)?;
        let response = self
            .post("auth/reset-password", &body, self.config.request_deadline)
            .await?;
        let raw = parse_checked(response)?;

        // The flow is consumed: both resumable records go away.
        if let Err(e) = self.store.clear_forgot_password_context().await {
            error!(error = %e, "failed to clear forgot-password context");
        }
        if let Err(e) = self.store.clear_pending_verification_email().await {
            error!(error = %e, "failed to clear pending verification email");
        }
        Ok(normalize(&raw))
    }

    // =========================================================================
    // USER LOOKUP
    // =========================================================================

    /// Fetch the canonical profile for a user id.
    ///
    /// # Errors
    ///
    /// `MalformedResponse` when the body contains no user fields in any
    /// accepted shape, otherwise any transport or server kind.
    pub async fn fetch_user(&self, id: &str) -> Result<UserProfile, AuthError> {
        let url = self.config.endpoint(&format!("users/{id}"));
        let response = self
            .transport
            .execute(reqwest::Method::GET, &url, None, self.config.request_deadline)
            .await
            .map_err(map_transport)?;
        let raw = parse_checked(response)?;
        raw.canonical_profile()
            .ok_or_else(|| AuthError::MalformedResponse("no user fields in response".into()))
    }

    // =========================================================================
    // SHARED PLUMBING
    // =========================================================================

    async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
        deadline: Duration,
    ) -> Result<RawResponse, AuthError> {
        let url = self.config.endpoint(path);
        self.transport
            .execute(reqwest::Method::POST, &url, Some(body), deadline)
            .await
            .map_err(map_transport)
    }

    async fn resolve_email(&self, hint: Option<&str>) -> Result<Option<String>, AuthError> {
        if let Some(hint) = hint {
            if !hint.trim().is_empty() {
                return Ok(Some(hint.trim().to_owned()));
            }
        }
        self.store.pending_verification_email().await.map_err(map_store)
    }
}

fn check_status(response: RawResponse) -> Result<RawResponse, AuthError> {
    if (200..300).contains(&response.status) {
        return Ok(response);
    }
    let message = server_message(response.status, &response.body);
    error!(status = response.status, %message, "server rejected request");
    Err(AuthError::ServerRejected { status: response.status, message })
}

fn parse_checked(response: RawResponse) -> Result<AuthResponse, AuthError> {
    let response = check_status(response)?;
    serde_json::from_str(&response.body).map_err(|e| AuthError::MalformedResponse(e.to_string()))
}

/// Syntactic email plausibility check: one `@`, non-empty local part and
/// domain, lowercased. Returns the normalized address.
#[must_use]
pub fn validate_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    if normalized.is_empty() || !normalized.contains('@') {
        return None;
    }
    let parts = normalized.split('@').collect::<Vec<_>>();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return None;
    }
    Some(normalized)
}

fn map_transport(e: TransportError) -> AuthError {
    match e {
        TransportError::Timeout => AuthError::Timeout,
        TransportError::ConnectionUnavailable(_) => AuthError::ConnectionUnavailable,
        TransportError::Cancelled(_) => AuthError::Cancelled,
        TransportError::Io(message) => AuthError::Unknown(format!("Network error: {message}")),
    }
}

fn map_store(e: StoreError) -> AuthError {
    AuthError::Unknown(format!("Storage error: {e}"))
}

fn encoding_error(e: serde_json::Error) -> AuthError {
    AuthError::Unknown(format!("Request encoding failed: {e}"))
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
