//! Wire types for the remote auth API and their normalization.
//!
//! DESIGN
//! ======
//! The backend is weakly typed: the token may arrive as `token` or
//! `accessToken`, the user record may be top-level, nested under `user`,
//! or nested under `data`, and numeric fields sometimes arrive as
//! strings (or the reverse). All of that tolerance lives in this module,
//! applied exactly once: downstream code only ever sees [`AuthOutcome`]
//! and the canonical [`UserProfile`].

use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// REQUEST BODIES
// =============================================================================

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest<'a> {
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
    pub phone: &'a str,
    pub birth_date: &'a str,
    pub role: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct EmailRequest<'a> {
    pub email: &'a str,
}

#[derive(Debug, Serialize)]
pub struct VerifyCodeRequest<'a> {
    pub code: &'a str,
    pub email: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest<'a> {
    pub email: &'a str,
    pub code: &'a str,
    pub new_password: &'a str,
    pub confirm_password: &'a str,
}

// =============================================================================
// RESPONSE BODIES
// =============================================================================

/// Canonical user record. Every field is optional because no two
/// endpoints agree on which ones they return.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    #[serde(alias = "_id")]
    pub id: Option<String>,
    #[serde(alias = "firstName")]
    pub first_name: Option<String>,
    #[serde(alias = "lastName")]
    pub last_name: Option<String>,
    pub email: Option<String>,
    #[serde(alias = "phoneNumber", deserialize_with = "string_or_number")]
    pub phone: Option<String>,
    #[serde(alias = "birthDate")]
    pub birth_date: Option<String>,
    pub role: Option<String>,
    #[serde(alias = "emailVerified")]
    pub email_verified: Option<bool>,
    #[serde(alias = "isVerified")]
    pub is_verified: Option<bool>,
}

impl UserProfile {
    fn is_empty(&self) -> bool {
        self.id.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.role.is_none()
    }

    /// Unspecified verification flags count as verified; the backend
    /// enforces verification requirements itself.
    #[must_use]
    pub fn verified(&self) -> bool {
        self.is_verified.or(self.email_verified).unwrap_or(true)
    }
}

/// Raw auth endpoint response body. Crate-internal: [`normalize`] is the
/// only consumer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct AuthResponse {
    pub token: Option<String>,
    #[serde(alias = "accessToken")]
    pub access_token: Option<String>,
    pub user: Option<UserProfile>,
    /// Some backends wrap the user in `data`.
    pub data: Option<UserProfile>,
    pub message: Option<String>,
    /// Direct user fields, for responses that flatten the record.
    #[serde(flatten)]
    pub flat: UserProfile,
}

impl AuthResponse {
    /// Token precedence: `token` wins over `accessToken`; blanks are
    /// ignored entirely.
    pub(crate) fn bearer_token(&self) -> Option<String> {
        non_blank(self.token.as_deref()).or_else(|| non_blank(self.access_token.as_deref()))
    }

    /// Profile precedence: nested `user`, then nested `data`, then the
    /// flattened top-level fields.
    pub(crate) fn canonical_profile(&self) -> Option<UserProfile> {
        if let Some(user) = &self.user {
            return Some(user.clone());
        }
        if let Some(data) = &self.data {
            return Some(data.clone());
        }
        if self.flat.is_empty() { None } else { Some(self.flat.clone()) }
    }

    /// Email precedence: top-level, then nested `user`, then nested `data`.
    pub(crate) fn extract_email(&self) -> Option<String> {
        non_blank(self.flat.email.as_deref())
            .or_else(|| non_blank(self.user.as_ref().and_then(|u| u.email.as_deref())))
            .or_else(|| non_blank(self.data.as_ref().and_then(|d| d.email.as_deref())))
    }
}

/// Canonical result of any auth operation, produced once at the client
/// boundary.
#[derive(Debug, Clone, Default)]
pub struct AuthOutcome {
    pub token: Option<String>,
    pub profile: Option<UserProfile>,
    pub email: Option<String>,
    pub message: Option<String>,
}

pub(crate) fn normalize(raw: &AuthResponse) -> AuthOutcome {
    AuthOutcome {
        token: raw.bearer_token(),
        profile: raw.canonical_profile(),
        email: raw.extract_email(),
        message: non_blank(raw.message.as_deref()),
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_owned)
}

/// Accept strings and bare numbers for fields some backends type
/// inconsistently (phone numbers, mostly). Anything else reads as absent.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
#[path = "response_test.rs"]
mod tests;
