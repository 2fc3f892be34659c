//! Durable key-value persistence for session and resumable-flow state.
//!
//! DESIGN
//! ======
//! Four logical records live here: the session token, the remember-me
//! flag, the pending-verification email, and the forgot-password context.
//! Each record's get/set/clear is atomic with respect to itself; no
//! cross-record transactionality is promised or needed. Reads of absent
//! records yield empty values, never errors, so the store is safe to
//! consult at process startup before any network activity.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

const TOKEN_KEY: &str = "auth_token";
const REMEMBER_ME_KEY: &str = "remember_me";
const PENDING_EMAIL_KEY: &str = "pending_verification_email";
const FORGOT_CONTEXT_KEY: &str = "forgot_password_context";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store i/o failed: {0}")]
    Io(String),
    #[error("store encoding failed: {0}")]
    Encoding(String),
}

/// Minimal async durable KV contract the session store is built on.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

// =============================================================================
// FILE STORE
// =============================================================================

/// File-backed store: one JSON object per file, rewritten on every write
/// through a temp file + rename.
pub struct FileStore {
    path: PathBuf,
    cells: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`, loading any existing contents. A missing
    /// file is an empty store; a corrupt file is treated as empty and
    /// logged, not raised.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] only when an existing file cannot be
    /// read at all.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let cells = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(cells) => cells,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "store file corrupt; starting empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };
        Ok(Self { path, cells: Mutex::new(cells) })
    }

    async fn flush(&self, cells: &HashMap<String, String>) -> Result<(), StoreError> {
        let encoded = serde_json::to_string_pretty(cells).map_err(|e| StoreError::Encoding(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, encoded.as_bytes())
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))
    }
}

#[async_trait::async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.cells.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut cells = self.cells.lock().await;
        cells.insert(key.to_owned(), value.to_owned());
        self.flush(&cells).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut cells = self.cells.lock().await;
        if cells.remove(key).is_some() {
            self.flush(&cells).await?;
        }
        Ok(())
    }
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    cells: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.cells.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.cells.lock().await.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.cells.lock().await.remove(key);
        Ok(())
    }
}

// =============================================================================
// SESSION STORE
// =============================================================================

/// The (email, code) pair produced by reset-code verification and
/// consumed by the final password-reset call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgotPasswordContext {
    pub email: String,
    pub code: String,
}

/// Typed facade over the four session records.
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub async fn token(&self) -> Result<Option<String>, StoreError> {
        self.kv.get(TOKEN_KEY).await
    }

    pub async fn save_token(&self, token: &str) -> Result<(), StoreError> {
        self.kv.set(TOKEN_KEY, token).await
    }

    pub async fn clear_token(&self) -> Result<(), StoreError> {
        self.kv.remove(TOKEN_KEY).await
    }

    /// Absent flag reads as `false`.
    pub async fn remember_me(&self) -> Result<bool, StoreError> {
        Ok(self.kv.get(REMEMBER_ME_KEY).await?.as_deref() == Some("true"))
    }

    pub async fn save_remember_me(&self, remember: bool) -> Result<(), StoreError> {
        self.kv.set(REMEMBER_ME_KEY, if remember { "true" } else { "false" }).await
    }

    pub async fn clear_remember_me(&self) -> Result<(), StoreError> {
        self.kv.remove(REMEMBER_ME_KEY).await
    }

    pub async fn pending_verification_email(&self) -> Result<Option<String>, StoreError> {
        Ok(self
            .kv
            .get(PENDING_EMAIL_KEY)
            .await?
            .filter(|email| !email.trim().is_empty()))
    }

    pub async fn save_pending_verification_email(&self, email: &str) -> Result<(), StoreError> {
        self.kv.set(PENDING_EMAIL_KEY, email).await
    }

    pub async fn clear_pending_verification_email(&self) -> Result<(), StoreError> {
        self.kv.remove(PENDING_EMAIL_KEY).await
    }

    /// An unreadable persisted context reads as absent; the flow restarts
    /// rather than failing startup.
    pub async fn forgot_password_context(&self) -> Result<Option<ForgotPasswordContext>, StoreError> {
        let Some(raw) = self.kv.get(FORGOT_CONTEXT_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(context) => Ok(Some(context)),
            Err(e) => {
                warn!(error = %e, "persisted forgot-password context unreadable; ignoring");
                Ok(None)
            }
        }
    }

    pub async fn save_forgot_password_context(&self, context: &ForgotPasswordContext) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(context).map_err(|e| StoreError::Encoding(e.to_string()))?;
        self.kv.set(FORGOT_CONTEXT_KEY, &encoded).await
    }

    pub async fn clear_forgot_password_context(&self) -> Result<(), StoreError> {
        self.kv.remove(FORGOT_CONTEXT_KEY).await
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
