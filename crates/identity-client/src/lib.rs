//! REST client for the identity provider (Supabase Auth compatible).
//!
//! Two clients with different authority:
//! - [`IdentityClient`] uses the publishable key and is safe to hold in the
//!   UI process.
//! - [`AdminClient`] holds the service-level secret and exists only in the
//!   privileged host process. It performs the account-deletion cascade.

mod admin;
mod client;
mod error;
mod pkce;
mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod stub;

pub use admin::{AdminClient, CascadeError, CascadeStep, AVATAR_BUCKET};
pub use client::IdentityClient;
pub use error::{IdentityError, IdentityResult};
pub use pkce::{challenge_for, PkcePair};
pub use types::{AuthSession, AuthUser, OtpType};

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Length and digest of a response body, for logs that must not carry
/// tokens or user data.
pub(crate) fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Pull a human-readable message out of a provider error body.
pub(crate) fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|field| value.get(field).and_then(|v| v.as_str()))
        .map(String::from)
}
