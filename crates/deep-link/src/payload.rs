//! Typed deep-link payloads and their host-to-UI push bodies.

use serde::{Deserialize, Serialize};

/// Which server-side verification a link completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationKind {
    EmailConfirm,
    PasswordRecovery,
}

impl VerificationKind {
    /// Value of the `type` query parameter the identity provider puts on the link.
    pub fn expected_type_param(&self) -> &'static str {
        match self {
            Self::EmailConfirm => "email",
            Self::PasswordRecovery => "recovery",
        }
    }

    /// Wire name used in the `deep-link.verification` push body.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::EmailConfirm => "confirm",
            Self::PasswordRecovery => "reset",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "confirm" => Some(Self::EmailConfirm),
            "reset" => Some(Self::PasswordRecovery),
            _ => None,
        }
    }
}

/// A classified, accepted deep link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeepLinkPayload {
    /// Provider redirect after an OAuth authorization in the external browser.
    OAuthCallback {
        code: Option<String>,
        error: Option<String>,
        error_description: Option<String>,
    },
    /// Token pair handed over from a browser session.
    SessionHandoff {
        access_token: String,
        refresh_token: String,
    },
    /// E-mail confirmation or password recovery link.
    VerificationLink {
        token_hash: String,
        kind: VerificationKind,
    },
}

/// Slot index of a payload in the pending buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    OAuthCallback,
    SessionHandoff,
    Verification,
}

impl PayloadKind {
    /// All kinds in flush order.
    pub const ALL: [PayloadKind; 3] = [
        PayloadKind::OAuthCallback,
        PayloadKind::SessionHandoff,
        PayloadKind::Verification,
    ];

    pub(crate) fn slot(&self) -> usize {
        match self {
            Self::OAuthCallback => 0,
            Self::SessionHandoff => 1,
            Self::Verification => 2,
        }
    }

    /// Push channel the payload is delivered on.
    pub fn channel(&self) -> &'static str {
        match self {
            Self::OAuthCallback => "deep-link.oauth-callback",
            Self::SessionHandoff => "deep-link.session",
            Self::Verification => "deep-link.verification",
        }
    }
}

/// Body of the `deep-link.oauth-callback` push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthCallbackBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// Body of the `deep-link.session` push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBody {
    pub access_token: String,
    pub refresh_token: String,
}

/// Body of the `deep-link.verification` push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationBody {
    pub token_hash: String,
    /// `"confirm"` or `"reset"`.
    pub kind: String,
}

impl DeepLinkPayload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::OAuthCallback { .. } => PayloadKind::OAuthCallback,
            Self::SessionHandoff { .. } => PayloadKind::SessionHandoff,
            Self::VerificationLink { .. } => PayloadKind::Verification,
        }
    }

    /// Push channel name for this payload.
    pub fn channel(&self) -> &'static str {
        self.kind().channel()
    }

    /// JSON body pushed to the UI process.
    pub fn push_body(&self) -> serde_json::Value {
        let value = match self {
            Self::OAuthCallback {
                code,
                error,
                error_description,
            } => serde_json::to_value(OAuthCallbackBody {
                code: code.clone(),
                error: error.clone(),
                error_description: error_description.clone(),
            }),
            Self::SessionHandoff {
                access_token,
                refresh_token,
            } => serde_json::to_value(SessionBody {
                access_token: access_token.clone(),
                refresh_token: refresh_token.clone(),
            }),
            Self::VerificationLink { token_hash, kind } => {
                serde_json::to_value(VerificationBody {
                    token_hash: token_hash.clone(),
                    kind: kind.wire_name().to_string(),
                })
            }
        };
        // Plain string fields always serialize.
        value.unwrap_or(serde_json::Value::Null)
    }

    /// Rebuild a payload from a push channel and body, as the UI side sees it.
    pub fn from_push(channel: &str, body: &serde_json::Value) -> Option<Self> {
        match channel {
            "deep-link.oauth-callback" => {
                let body: OAuthCallbackBody = serde_json::from_value(body.clone()).ok()?;
                Some(Self::OAuthCallback {
                    code: body.code,
                    error: body.error,
                    error_description: body.error_description,
                })
            }
            "deep-link.session" => {
                let body: SessionBody = serde_json::from_value(body.clone()).ok()?;
                Some(Self::SessionHandoff {
                    access_token: body.access_token,
                    refresh_token: body.refresh_token,
                })
            }
            "deep-link.verification" => {
                let body: VerificationBody = serde_json::from_value(body.clone()).ok()?;
                Some(Self::VerificationLink {
                    token_hash: body.token_hash,
                    kind: VerificationKind::from_wire_name(&body.kind)?,
                })
            }
            _ => None,
        }
    }
}

/// Result of classifying a raw URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedDeepLink {
    Accepted(DeepLinkPayload),
    /// Unknown path, foreign scheme, or malformed URL. Carries the raw input
    /// for logging.
    Rejected { raw: String, reason: String },
}

impl ParsedDeepLink {
    pub fn accepted(self) -> Option<DeepLinkPayload> {
        match self {
            Self::Accepted(payload) => Some(payload),
            Self::Rejected { .. } => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}
