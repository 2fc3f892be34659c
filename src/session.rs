//! Auth state machine — the one owner of UI-observable session state.
//!
//! ARCHITECTURE
//! ============
//! All transitions are driven by auth-client results; nothing here
//! re-interprets errors or retries on its own. Observers subscribe to a
//! watch channel instead of reading globals. A per-operation in-flight
//! set rejects duplicate invocations so rapid UI interaction can never
//! stack identical network calls.
//!
//! RESUMABILITY
//! ============
//! `restore` re-derives state from the session store on cold start,
//! before any network activity: a remembered token restores
//! `Authenticated`; a persisted forgot-password context or pending
//! verification email restores the matching flow state.

use std::collections::HashSet;

use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use crate::client::{AuthClient, RegisterData, RegistrationOutcome};
use crate::error::AuthError;
use crate::response::UserProfile;
use crate::store::{ForgotPasswordContext, SessionStore, StoreError};

/// UI-observable session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    AwaitingVerification { email: String },
    AwaitingResetCode { email: String },
    AwaitingPasswordReset { email: String, code: String },
}

/// Snapshot the UI renders from. Rebuilt on every transition, never
/// persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthUiState {
    pub is_loading: bool,
    pub is_authenticated: bool,
    /// Latest user-facing message: failures and flow confirmations both
    /// land here.
    pub error_message: Option<String>,
    pub user: Option<UserProfile>,
}

/// Logical operations guarded against duplicate in-flight invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Operation {
    Login,
    Register,
    ResendVerification,
    VerifyEmail,
    ForgotPassword,
    VerifyResetCode,
    ResetPassword,
}

struct SessionInner {
    state: AuthState,
    ui: AuthUiState,
    in_flight: HashSet<Operation>,
}

/// The session container the UI talks to.
pub struct AuthSession {
    client: AuthClient,
    store: SessionStore,
    inner: Mutex<SessionInner>,
    tx: watch::Sender<AuthUiState>,
}

impl AuthSession {
    #[must_use]
    pub fn new(client: AuthClient) -> Self {
        let store = client.store().clone();
        let ui = AuthUiState::default();
        let (tx, _) = watch::channel(ui.clone());
        Self {
            client,
            store,
            inner: Mutex::new(SessionInner {
                state: AuthState::Unauthenticated,
                ui,
                in_flight: HashSet::new(),
            }),
            tx,
        }
    }

    /// Subscribe to UI-state snapshots. The current value is observable
    /// immediately.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthUiState> {
        self.tx.subscribe()
    }

    pub async fn state(&self) -> AuthState {
        self.inner.lock().await.state.clone()
    }

    pub async fn ui(&self) -> AuthUiState {
        self.inner.lock().await.ui.clone()
    }

    /// Email currently pending verification, from flow state first, then
    /// the persisted record.
    pub async fn pending_verification_email(&self) -> Option<String> {
        {
            let inner = self.inner.lock().await;
            if let AuthState::AwaitingVerification { email } = &inner.state {
                return Some(email.clone());
            }
        }
        self.store.pending_verification_email().await.unwrap_or_default()
    }

    /// Verified forgot-password context, from flow state first, then the
    /// persisted record.
    pub async fn forgot_password_context(&self) -> Option<ForgotPasswordContext> {
        {
            let inner = self.inner.lock().await;
            if let AuthState::AwaitingPasswordReset { email, code } = &inner.state {
                return Some(ForgotPasswordContext { email: email.clone(), code: code.clone() });
            }
        }
        self.store.forgot_password_context().await.unwrap_or_default()
    }

    // =========================================================================
    // STARTUP
    // =========================================================================

    /// Re-derive state from the session store on cold start. Never
    /// touches the network; store failures degrade to a clean
    /// unauthenticated state.
    pub async fn restore(&self) {
        let token = read_or_none(self.store.token().await).flatten();
        let remember = read_or_none(self.store.remember_me().await).unwrap_or(false);
        let forgot = read_or_none(self.store.forgot_password_context().await).flatten();
        let pending = read_or_none(self.store.pending_verification_email().await).flatten();

        let mut inner = self.inner.lock().await;
        if remember && token.is_some() {
            info!("remembered session restored");
            inner.state = AuthState::Authenticated;
            inner.ui.is_authenticated = true;
        } else {
            if remember {
                // EDGE: remember-me without a token is inconsistent;
                // repair it so the next start is clean.
                warn!("remember-me set without token; clearing stale flag");
                log_store(self.store.clear_remember_me().await);
            }
            inner.state = match (forgot, pending) {
                (Some(context), _) => {
                    info!(email = %context.email, "resuming password-reset flow");
                    AuthState::AwaitingPasswordReset { email: context.email, code: context.code }
                }
                (None, Some(email)) => {
                    info!(%email, "resuming pending email verification");
                    AuthState::AwaitingVerification { email }
                }
                (None, None) => AuthState::Unauthenticated,
            };
            inner.ui.is_authenticated = false;
        }
        self.publish(&inner);
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    /// Log in. A duplicate call while one is in flight is a no-op.
    ///
    /// # Errors
    ///
    /// The classified failure, also mirrored into the observable message.
    pub async fn login(&self, email: &str, password: &str, remember_me: bool) -> Result<(), AuthError> {
        let Some(prior) = self.begin(Operation::Login, true).await else {
            return Ok(());
        };
        match self.client.login(email, password).await {
            Ok(outcome) => {
                if remember_me {
                    log_store(self.store.save_remember_me(true).await);
                } else {
                    log_store(self.store.clear_remember_me().await);
                }
                self.complete(Operation::Login, |inner| {
                    inner.state = AuthState::Authenticated;
                    inner.ui.is_authenticated = true;
                    inner.ui.user = outcome.profile;
                    inner.ui.error_message = None;
                })
                .await;
                Ok(())
            }
            Err(e) => self.fail(Operation::Login, prior, e).await,
        }
    }

    /// Register. Lands in `Authenticated` or `AwaitingVerification`
    /// depending on whether the server issued a token.
    ///
    /// # Errors
    ///
    /// The classified failure, also mirrored into the observable message.
    pub async fn register(&self, data: &RegisterData) -> Result<(), AuthError> {
        let Some(prior) = self.begin(Operation::Register, true).await else {
            return Ok(());
        };
        match self.client.register(data).await {
            Ok(RegistrationOutcome::Authenticated(outcome)) => {
                self.complete(Operation::Register, |inner| {
                    inner.state = AuthState::Authenticated;
                    inner.ui.is_authenticated = true;
                    inner.ui.user = outcome.profile;
                    inner.ui.error_message = Some("Registration successful! You are now logged in.".into());
                })
                .await;
                Ok(())
            }
            Ok(RegistrationOutcome::VerificationRequired { email, message, profile }) => {
                log_store(self.store.save_pending_verification_email(&email).await);
                self.complete(Operation::Register, |inner| {
                    inner.state = AuthState::AwaitingVerification { email };
                    inner.ui.is_authenticated = false;
                    inner.ui.user = profile;
                    inner.ui.error_message = Some(message);
                })
                .await;
                Ok(())
            }
            Err(e) => self.fail(Operation::Register, prior, e).await,
        }
    }

    /// Re-send the verification email. Side effect only: state is
    /// unchanged either way.
    ///
    /// # Errors
    ///
    /// The classified failure, also mirrored into the observable message.
    pub async fn resend_verification(&self, email: &str) -> Result<(), AuthError> {
        let Some(prior) = self.begin(Operation::ResendVerification, false).await else {
            return Ok(());
        };
        match self.client.resend_verification(email).await {
            Ok(outcome) => {
                self.complete(Operation::ResendVerification, |inner| {
                    inner.ui.error_message = Some(
                        outcome
                            .message
                            .unwrap_or_else(|| "Verification email re-sent successfully. Check your inbox.".into()),
                    );
                })
                .await;
                Ok(())
            }
            Err(e) => self.fail(Operation::ResendVerification, prior, e).await,
        }
    }

    /// Confirm the pending email with the one-time code.
    ///
    /// Repeating the call once already authenticated (pending context
    /// long cleared) is a successful no-op.
    ///
    /// # Errors
    ///
    /// The classified failure, also mirrored into the observable message.
    pub async fn verify_email(&self, code: &str) -> Result<(), AuthError> {
        let hint = {
            let inner = self.inner.lock().await;
            if inner.state == AuthState::Authenticated {
                debug!("already authenticated; verification is a no-op");
                return Ok(());
            }
            verification_email_hint(&inner)
        };
        let Some(prior) = self.begin(Operation::VerifyEmail, false).await else {
            return Ok(());
        };
        match self.client.verify_email(code, hint.as_deref()).await {
            Ok(outcome) => {
                log_store(self.store.clear_pending_verification_email().await);
                self.complete(Operation::VerifyEmail, |inner| {
                    inner.state = if outcome.token.is_some() {
                        inner.ui.is_authenticated = true;
                        AuthState::Authenticated
                    } else {
                        // Verified, but the server wants a fresh login.
                        AuthState::Unauthenticated
                    };
                    let mut profile = outcome.profile.or_else(|| inner.ui.user.take()).unwrap_or_default();
                    profile.email_verified = Some(true);
                    profile.is_verified = Some(true);
                    inner.ui.user = Some(profile);
                    inner.ui.error_message = outcome.message;
                })
                .await;
                Ok(())
            }
            Err(e) => self.fail(Operation::VerifyEmail, prior, e).await,
        }
    }

    /// Step 1 of password reset: request a code, enter
    /// `AwaitingResetCode`.
    ///
    /// # Errors
    ///
    /// The classified failure, also mirrored into the observable message.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        let Some(prior) = self.begin(Operation::ForgotPassword, false).await else {
            return Ok(());
        };
        match self.client.forgot_password(email).await {
            Ok(outcome) => {
                log_store(self.store.save_pending_verification_email(email).await);
                let email = email.to_owned();
                self.complete(Operation::ForgotPassword, |inner| {
                    inner.state = AuthState::AwaitingResetCode { email };
                    inner.ui.error_message =
                        Some(outcome.message.unwrap_or_else(|| "Code sent to your email.".into()));
                })
                .await;
                Ok(())
            }
            Err(e) => self.fail(Operation::ForgotPassword, prior, e).await,
        }
    }

    /// Step 2: verify the emailed code, enter `AwaitingPasswordReset`.
    ///
    /// # Errors
    ///
    /// The classified failure, also mirrored into the observable message.
    pub async fn verify_reset_code(&self, code: &str) -> Result<(), AuthError> {
        let hint = {
            let inner = self.inner.lock().await;
            match &inner.state {
                AuthState::AwaitingResetCode { email } => Some(email.clone()),
                _ => None,
            }
        };
        let Some(prior) = self.begin(Operation::VerifyResetCode, false).await else {
            return Ok(());
        };
        match self.client.verify_reset_code(code, hint.as_deref()).await {
            Ok((outcome, context)) => {
                self.complete(Operation::VerifyResetCode, |inner| {
                    inner.state = AuthState::AwaitingPasswordReset { email: context.email, code: context.code };
                    inner.ui.error_message = outcome.message;
                })
                .await;
                Ok(())
            }
            Err(e) => self.fail(Operation::VerifyResetCode, prior, e).await,
        }
    }

    /// Step 3: set the new password. Success clears all reset context
    /// and requires a fresh login.
    ///
    /// # Errors
    ///
    /// The classified failure, also mirrored into the observable message.
    pub async fn reset_password(&self, new_password: &str, confirm_password: &str) -> Result<(), AuthError> {
        let hint = {
            let inner = self.inner.lock().await;
            match &inner.state {
                AuthState::AwaitingPasswordReset { email, code } => {
                    Some(ForgotPasswordContext { email: email.clone(), code: code.clone() })
                }
                _ => None,
            }
        };
        let Some(prior) = self.begin(Operation::ResetPassword, false).await else {
            return Ok(());
        };
        match self.client.reset_password(hint.as_ref(), new_password, confirm_password).await {
            Ok(outcome) => {
                self.complete(Operation::ResetPassword, |inner| {
                    inner.state = AuthState::Unauthenticated;
                    inner.ui.is_authenticated = false;
                    inner.ui.user = None;
                    inner.ui.error_message =
                        Some(outcome.message.unwrap_or_else(|| "Password changed successfully.".into()));
                })
                .await;
                Ok(())
            }
            Err(e) => self.fail(Operation::ResetPassword, prior, e).await,
        }
    }

    /// Drop the session and every resumable record.
    pub async fn logout(&self) {
        log_store(self.store.clear_token().await);
        log_store(self.store.clear_remember_me().await);
        log_store(self.store.clear_pending_verification_email().await);
        log_store(self.store.clear_forgot_password_context().await);

        let mut inner = self.inner.lock().await;
        inner.state = AuthState::Unauthenticated;
        inner.ui = AuthUiState::default();
        self.publish(&inner);
        info!("logged out; session and flow context cleared");
    }

    /// Clear the observable message without touching anything else.
    pub async fn clear_error(&self) {
        let mut inner = self.inner.lock().await;
        inner.ui.error_message = None;
        self.publish(&inner);
    }

    // =========================================================================
    // GUARD + TRANSITION PLUMBING
    // =========================================================================

    /// Admit an operation, or `None` if one is already in flight. Returns
    /// the prior state so a failure can restore it.
    async fn begin(&self, op: Operation, authenticating: bool) -> Option<AuthState> {
        let mut inner = self.inner.lock().await;
        if !inner.in_flight.insert(op) {
            debug!(?op, "operation already in flight; ignoring duplicate");
            return None;
        }
        let prior = inner.state.clone();
        if authenticating {
            inner.state = AuthState::Authenticating;
        }
        inner.ui.is_loading = true;
        inner.ui.error_message = None;
        self.publish(&inner);
        Some(prior)
    }

    async fn complete(&self, op: Operation, apply: impl FnOnce(&mut SessionInner)) {
        let mut inner = self.inner.lock().await;
        inner.in_flight.remove(&op);
        apply(&mut inner);
        inner.ui.is_loading = false;
        self.publish(&inner);
    }

    async fn fail(&self, op: Operation, prior: AuthState, e: AuthError) -> Result<(), AuthError> {
        warn!(?op, code = e.code(), error = %e, "operation failed; state unchanged");
        let mut inner = self.inner.lock().await;
        inner.in_flight.remove(&op);
        inner.state = prior;
        inner.ui.is_loading = false;
        inner.ui.error_message = Some(e.to_string());
        self.publish(&inner);
        Err(e)
    }

    fn publish(&self, inner: &SessionInner) {
        self.tx.send_replace(inner.ui.clone());
    }
}

/// In-memory email candidates for verification: flow state first, then
/// the profile already in UI state. The client adds the persisted
/// fallback.
fn verification_email_hint(inner: &SessionInner) -> Option<String> {
    if let AuthState::AwaitingVerification { email } = &inner.state {
        return Some(email.clone());
    }
    inner.ui.user.as_ref().and_then(|user| user.email.clone())
}

fn read_or_none<T>(result: Result<T, StoreError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            error!(error = %e, "session store read failed during restore");
            None
        }
    }
}

fn log_store(result: Result<(), StoreError>) {
    if let Err(e) = result {
        error!(error = %e, "session store write failed");
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
