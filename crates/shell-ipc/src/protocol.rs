//! IPC protocol definitions.
//!
//! Uses a JSON-RPC-like protocol over a Unix domain socket. Every message is
//! one JSON object per line. Requests carry an `id` that the response echoes;
//! pushes carry a `type` instead.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// IPC method types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    // Health
    #[serde(rename = "health")]
    Health,

    // App info
    #[serde(rename = "app.version")]
    AppVersion,
    #[serde(rename = "app.backend-port")]
    AppBackendPort,

    // Secure token vault
    #[serde(rename = "secure-store.get")]
    SecureStoreGet,
    #[serde(rename = "secure-store.set")]
    SecureStoreSet,
    #[serde(rename = "secure-store.remove")]
    SecureStoreRemove,

    // External browser
    #[serde(rename = "oauth.launch")]
    OAuthLaunch,

    // Account
    #[serde(rename = "account.delete")]
    AccountDelete,

    // Window lifecycle (streaming)
    #[serde(rename = "window.ready")]
    WindowReady,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Health => "health",
            Self::AppVersion => "app.version",
            Self::AppBackendPort => "app.backend-port",
            Self::SecureStoreGet => "secure-store.get",
            Self::SecureStoreSet => "secure-store.set",
            Self::SecureStoreRemove => "secure-store.remove",
            Self::OAuthLaunch => "oauth.launch",
            Self::AccountDelete => "account.delete",
            Self::WindowReady => "window.ready",
        }
    }
}

/// Host-to-UI push channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PushType {
    #[serde(rename = "deep-link.oauth-callback")]
    OAuthCallback,
    #[serde(rename = "deep-link.session")]
    Session,
    #[serde(rename = "deep-link.verification")]
    Verification,
    /// Restore the window if minimized, then focus it.
    #[serde(rename = "window.focus")]
    WindowFocus,
}

impl PushType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OAuthCallback => "deep-link.oauth-callback",
            Self::Session => "deep-link.session",
            Self::Verification => "deep-link.verification",
            Self::WindowFocus => "window.focus",
        }
    }

    pub fn from_channel(channel: &str) -> Option<Self> {
        match channel {
            "deep-link.oauth-callback" => Some(Self::OAuthCallback),
            "deep-link.session" => Some(Self::Session),
            "deep-link.verification" => Some(Self::Verification),
            "window.focus" => Some(Self::WindowFocus),
            _ => None,
        }
    }
}

/// Server-push message written to a `window.ready` stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Push {
    #[serde(rename = "type")]
    pub push_type: PushType,
    pub data: serde_json::Value,
}

impl Push {
    pub fn new(push_type: PushType, data: serde_json::Value) -> Self {
        Self { push_type, data }
    }

    pub fn window_focus() -> Self {
        Self::new(PushType::WindowFocus, serde_json::json!({}))
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// IPC request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation.
    pub id: String,
    /// Method to invoke.
    pub method: Method,
    /// Method parameters (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Request {
    /// Create a new request with auto-generated ID.
    pub fn new(method: Method) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            method,
            params: None,
        }
    }

    /// Create a new request with parameters.
    pub fn with_params(method: Method, params: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            method,
            params: Some(params),
        }
    }

    /// Decode `params` into a typed struct. Missing params decode as `{}`.
    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let params = self
            .params
            .clone()
            .unwrap_or_else(|| serde_json::json!({}));
        serde_json::from_value(params)
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// IPC response message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Request ID for correlation.
    pub id: String,
    /// Result data (if successful).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error information (if failed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// Error information in a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code.
    pub code: i32,
    /// Error message.
    pub message: String,
    /// Additional error data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Response {
    /// Create a successful response.
    ///
    /// A `null` result is sent as an explicit `"result":null` so the client
    /// can tell "no value" apart from a malformed response.
    pub fn success(id: &str, result: serde_json::Value) -> Self {
        Self {
            id: id.to_string(),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: &str, code: i32, message: &str) -> Self {
        Self {
            id: id.to_string(),
            result: None,
            error: Some(ErrorInfo {
                code,
                message: message.to_string(),
                data: None,
            }),
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&WireResponse::from(self))
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check if the response is successful.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Serialized shape of a response: `result` is present (possibly `null`)
/// on success and absent on error.
#[derive(Serialize)]
struct WireResponse<'a> {
    id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a ErrorInfo>,
}

impl<'a> From<&'a Response> for WireResponse<'a> {
    fn from(response: &'a Response) -> Self {
        static NULL: serde_json::Value = serde_json::Value::Null;
        let result = match (&response.result, &response.error) {
            (Some(value), _) => Some(value),
            (None, None) => Some(&NULL),
            (None, Some(_)) => None,
        };
        Self {
            id: &response.id,
            result,
            error: response.error.as_ref(),
        }
    }
}

/// `secure-store.get` / `secure-store.remove` params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyParams {
    pub key: String,
}

/// `secure-store.set` params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetParams {
    pub key: String,
    pub value: String,
}

/// `oauth.launch` params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlParams {
    pub url: String,
}

/// `account.delete` params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountDeleteParams {
    pub user_id: String,
}

/// `account.delete` result. Cascade failures are reported here, inside a
/// successful response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDeleteResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AccountDeleteResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// `window.ready` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowReadyResult {
    /// Buffered deep links delivered right after this response.
    pub flushed: usize,
}

/// `health` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResult {
    pub status: String,
    pub version: String,
}

// Standard error codes
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const CONFLICT: i32 = -32003;
    pub const UNAVAILABLE: i32 = -32004;
}
