//! Wire types shared by the public and admin clients.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// User record returned with a session or by `GET /auth/v1/user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Token response from `/auth/v1/token` and `/auth/v1/verify`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: i64,
    /// Unix seconds. Filled from `expires_in` when the provider omits it.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub user: AuthUser,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

impl AuthSession {
    /// Expiry in Unix seconds.
    pub fn expires_at(&self) -> i64 {
        self.expires_at
            .unwrap_or_else(|| Utc::now().timestamp() + self.expires_in)
    }

    /// Pin `expires_at` so later reads do not drift.
    pub(crate) fn normalized(mut self) -> Self {
        if self.expires_at.is_none() {
            self.expires_at = Some(Utc::now().timestamp() + self.expires_in);
        }
        self
    }
}

/// Verification type for `POST /auth/v1/verify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpType {
    /// E-mail address confirmation.
    Email,
    /// Password recovery; the resulting session may only set a new password.
    Recovery,
}

impl OtpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpType::Email => "email",
            OtpType::Recovery => "recovery",
        }
    }
}
