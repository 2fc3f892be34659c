//! authgate — authentication & session resilience client.
//!
//! ARCHITECTURE
//! ============
//! Four layers, leaves first. The transport layer executes one logical
//! HTTP call reliably: overall deadline, exponential-back-off retries,
//! and hard no-retry classes for unreachable hosts and cancellations.
//! The session store persists the token, remember-me flag, and
//! resumable-flow context through a minimal async key-value contract.
//! The auth client turns domain operations into transport calls and
//! normalizes every weakly-typed response and every failure exactly
//! once. The auth session state machine owns all UI-observable state,
//! guards against duplicate in-flight operations, and re-derives its
//! state from the store on cold start.
//!
//! The UI layer consumes [`session::AuthUiState`] through
//! [`session::AuthSession::subscribe`] and calls the session's
//! operations; nothing else is exposed.

pub mod client;
pub mod config;
pub mod error;
pub mod response;
pub mod session;
pub mod store;
pub mod transport;

pub use client::{AuthClient, RegisterData, RegistrationOutcome, VERIFICATION_PROMPT};
pub use config::{AuthConfig, ConfigError};
pub use error::AuthError;
pub use response::{AuthOutcome, UserProfile};
pub use session::{AuthSession, AuthState, AuthUiState};
pub use store::{FileStore, ForgotPasswordContext, KeyValueStore, MemoryStore, SessionStore, StoreError};
