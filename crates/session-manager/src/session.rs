//! The session of record.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use identity_client::AuthSession;
use serde::{Deserialize, Serialize};

/// Lifetime assumed for a handed-over access token whose expiry cannot be read.
const DEFAULT_LIFETIME_SECS: i64 = 3600;

/// Refresh this many seconds before the access token actually expires.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Tokens plus the user they belong to. Persisted as JSON through
/// [`SessionStorage`](crate::SessionStorage).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds.
    pub expires_at: i64,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("user_id", &self.user_id)
            .finish()
    }
}

impl From<AuthSession> for Session {
    fn from(session: AuthSession) -> Self {
        Self {
            expires_at: session.expires_at(),
            access_token: session.access_token,
            refresh_token: session.refresh_token,
            user_id: session.user.id,
            email: session.user.email,
        }
    }
}

impl Session {
    /// True once the access token is within the refresh margin of expiry.
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() + EXPIRY_MARGIN_SECS >= self.expires_at
    }
}

/// Expiry of a handed-over access token, read from its `exp` claim.
///
/// The signature is not checked; the provider validates the token on use.
pub(crate) fn token_expiry(access_token: &str) -> i64 {
    decode_exp(access_token).unwrap_or_else(|| Utc::now().timestamp() + DEFAULT_LIFETIME_SECS)
}

fn decode_exp(access_token: &str) -> Option<i64> {
    let claims = access_token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(claims.trim_end_matches('=')).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    value.get("exp")?.as_i64()
}
