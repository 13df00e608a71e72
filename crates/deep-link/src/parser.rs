//! Classification of raw `appscheme://` URLs.
//!
//! Dispatch is an exhaustive match over [`LinkPath`]. Anything that does not
//! resolve to one of its variants is `Rejected`, never an error or a panic.

use crate::payload::{DeepLinkPayload, ParsedDeepLink, VerificationKind};
use shell_config_and_utils::URL_SCHEME;
use std::collections::HashMap;
use tracing::{debug, warn};
use url::Url;

/// The closed set of recognized deep-link paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPath {
    /// `/auth/callback`
    OAuthCallback,
    /// `/auth/session`
    Session,
    /// `/auth/confirm`
    Confirm,
    /// `/auth/reset`
    Reset,
}

impl LinkPath {
    pub fn from_path(path: &str) -> Option<Self> {
        match path {
            "/auth/callback" => Some(Self::OAuthCallback),
            "/auth/session" => Some(Self::Session),
            "/auth/confirm" => Some(Self::Confirm),
            "/auth/reset" => Some(Self::Reset),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OAuthCallback => "/auth/callback",
            Self::Session => "/auth/session",
            Self::Confirm => "/auth/confirm",
            Self::Reset => "/auth/reset",
        }
    }

    /// Full link for this path with no query, e.g. `appscheme://auth/callback`.
    pub fn url(&self) -> String {
        format!("{}:/{}", URL_SCHEME, self.as_str())
    }
}

/// Classify a raw URL.
///
/// Both `appscheme://auth/callback` (host `auth`) and
/// `appscheme:///auth/callback` (empty host) resolve to `/auth/callback`.
pub fn parse(raw: &str) -> ParsedDeepLink {
    let trimmed = raw.trim();

    let url = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(e) => return reject(raw, format!("malformed URL: {}", e)),
    };

    if url.scheme() != URL_SCHEME {
        return reject(raw, format!("unexpected scheme '{}'", url.scheme()));
    }

    let path = dispatch_path(&url);
    let Some(link_path) = LinkPath::from_path(&path) else {
        return reject(raw, format!("unrecognized path '{}'", path));
    };

    let query = first_query_values(&url);
    let param = |name: &str| query.get(name).cloned();
    let non_empty = |name: &str| param(name).filter(|v| !v.is_empty());

    let payload = match link_path {
        LinkPath::OAuthCallback => DeepLinkPayload::OAuthCallback {
            code: non_empty("code"),
            error: non_empty("error"),
            error_description: non_empty("error_description"),
        },
        LinkPath::Session => DeepLinkPayload::SessionHandoff {
            access_token: param("access_token").unwrap_or_default(),
            refresh_token: param("refresh_token").unwrap_or_default(),
        },
        LinkPath::Confirm => verification(&query, VerificationKind::EmailConfirm),
        LinkPath::Reset => verification(&query, VerificationKind::PasswordRecovery),
    };

    debug!(path = link_path.as_str(), "Deep link accepted");
    ParsedDeepLink::Accepted(payload)
}

/// First argument that carries our scheme.
///
/// On Linux the desktop appends the URL to argv instead of raising an
/// open-URL event, possibly behind other flags.
pub fn find_in_args<I, S>(args: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let prefix = format!("{}://", URL_SCHEME);
    args.into_iter().find_map(|arg| {
        let arg = arg.as_ref().trim();
        let matches = arg
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(&prefix));
        matches.then(|| arg.to_string())
    })
}

fn verification(query: &HashMap<String, String>, kind: VerificationKind) -> DeepLinkPayload {
    if let Some(link_type) = query.get("type") {
        if link_type != kind.expected_type_param() {
            warn!(
                expected = kind.expected_type_param(),
                actual = %link_type,
                "Verification link type does not match its path"
            );
        }
    }
    DeepLinkPayload::VerificationLink {
        token_hash: query.get("token_hash").cloned().unwrap_or_default(),
        kind,
    }
}

fn dispatch_path(url: &Url) -> String {
    let host = url.host_str().unwrap_or("");
    let path = url.path();
    let joined = if host.is_empty() {
        path.to_string()
    } else {
        format!("/{}{}", host, path)
    };
    if joined.len() > 1 {
        joined.trim_end_matches('/').to_string()
    } else {
        joined
    }
}

/// Query parameters, keeping the first value of each repeated name.
fn first_query_values(url: &Url) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for (name, value) in url.query_pairs() {
        values
            .entry(name.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    values
}

fn reject(raw: &str, reason: String) -> ParsedDeepLink {
    warn!(raw = %redact_query(raw), reason = %reason, "Rejected deep link");
    ParsedDeepLink::Rejected {
        raw: raw.to_string(),
        reason,
    }
}

/// Strip the query string before logging; it may carry tokens.
fn redact_query(raw: &str) -> &str {
    raw.split_once('?').map(|(head, _)| head).unwrap_or(raw)
}
