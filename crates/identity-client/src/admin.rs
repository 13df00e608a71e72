//! Service-level client for the account-deletion cascade.
//!
//! Holds the service secret. Lives only in the privileged host process and
//! is never serialized, logged, or sent over IPC.

use crate::{error_message, summarize_response_body, IdentityError, IdentityResult};
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

/// Storage bucket holding profile pictures.
pub const AVATAR_BUCKET: &str = "avatars";

const PROFILES_TABLE: &str = "profiles";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One step of the deletion cascade, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeStep {
    RemoveAvatar,
    DeleteProfile,
    DeleteUser,
}

impl CascadeStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            CascadeStep::RemoveAvatar => "remove_avatar",
            CascadeStep::DeleteProfile => "delete_profile",
            CascadeStep::DeleteUser => "delete_user",
        }
    }
}

/// A cascade that stopped at `step`. Steps in `completed` are not rolled back.
#[derive(Debug, thiserror::Error)]
#[error("Account deletion failed at {}: {source}", step.as_str())]
pub struct CascadeError {
    pub step: CascadeStep,
    pub completed: Vec<CascadeStep>,
    #[source]
    pub source: IdentityError,
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    #[serde(default)]
    avatar_url: Option<String>,
}

/// Client authorized with the service-level secret.
#[derive(Clone)]
pub struct AdminClient {
    http_client: Client,
    base_url: Url,
    service_key: String,
}

impl std::fmt::Debug for AdminClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminClient")
            .field("base_url", &self.base_url.as_str())
            .field("service_key", &"<redacted>")
            .finish()
    }
}

impl AdminClient {
    pub fn new(base_url: &str, service_key: &str) -> IdentityResult<Self> {
        if service_key.trim().is_empty() {
            return Err(IdentityError::NotConfigured(
                "service key is empty".to_string(),
            ));
        }
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(IdentityError::NotConfigured(format!(
                "{} cannot be a base URL",
                base_url
            )));
        }

        let http_client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http_client,
            base_url,
            service_key: service_key.to_string(),
        })
    }

    /// `base_url` with `segments` appended, each percent-encoded as one
    /// path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http_client
            .request(method, url)
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
    }

    fn profile_url(&self, user_id: &str) -> Url {
        let mut url = self.endpoint(&["rest", "v1", PROFILES_TABLE]);
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{}", user_id));
        url
    }

    /// Object path of the user's avatar, if the profile has one.
    ///
    /// The path is the last two segments of `avatar_url`
    /// (`<user_id>/<file>`).
    pub async fn avatar_path(&self, user_id: &str) -> IdentityResult<Option<String>> {
        let mut url = self.profile_url(user_id);
        url.query_pairs_mut().append_pair("select", "avatar_url");
        let response = self
            .request(Method::GET, url)
            .header("Accept", "application/json")
            .send()
            .await?;
        let rows: Vec<ProfileRow> = check(response, "Profile lookup").await?.json().await?;

        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.avatar_url)
            .and_then(|avatar_url| avatar_object_path(&avatar_url)))
    }

    pub async fn remove_avatar(&self, object_path: &str) -> IdentityResult<()> {
        let url = self.endpoint(&["storage", "v1", "object", AVATAR_BUCKET]);
        let response = self
            .request(Method::DELETE, url)
            .json(&serde_json::json!({ "prefixes": [object_path] }))
            .send()
            .await?;
        check(response, "Avatar removal").await?;
        Ok(())
    }

    pub async fn delete_profile(&self, user_id: &str) -> IdentityResult<()> {
        let response = self
            .request(Method::DELETE, self.profile_url(user_id))
            .header("Prefer", "return=minimal")
            .send()
            .await?;
        check(response, "Profile delete").await?;
        Ok(())
    }

    /// Hard-delete the identity record.
    pub async fn delete_user(&self, user_id: &str) -> IdentityResult<()> {
        let url = self.endpoint(&["auth", "v1", "admin", "users", user_id]);
        let response = self.request(Method::DELETE, url).send().await?;
        check(response, "User delete").await?;
        Ok(())
    }

    /// Remove the avatar (skipped when there is none), delete the profile
    /// row, then hard-delete the user, strictly in that order.
    ///
    /// The first failure stops the cascade. Completed steps stay done.
    pub async fn delete_account(&self, user_id: &str) -> Result<Vec<CascadeStep>, CascadeError> {
        let mut completed = Vec::new();
        info!(user_id = %user_id, "Starting account deletion");

        let fail = |step: CascadeStep, completed: &Vec<CascadeStep>, source: IdentityError| {
            if completed.is_empty() {
                warn!(user_id = %user_id, step = step.as_str(), error = %source, "Account deletion failed");
            } else {
                let done: Vec<&str> = completed.iter().map(CascadeStep::as_str).collect();
                error!(
                    user_id = %user_id,
                    step = step.as_str(),
                    completed = ?done,
                    error = %source,
                    "Account deletion partially completed"
                );
            }
            CascadeError {
                step,
                completed: completed.clone(),
                source,
            }
        };

        let avatar = match self.avatar_path(user_id).await {
            Ok(avatar) => avatar,
            Err(e) => return Err(fail(CascadeStep::RemoveAvatar, &completed, e)),
        };
        match avatar {
            Some(path) => {
                if let Err(e) = self.remove_avatar(&path).await {
                    return Err(fail(CascadeStep::RemoveAvatar, &completed, e));
                }
                completed.push(CascadeStep::RemoveAvatar);
                debug!(user_id = %user_id, "Avatar removed");
            }
            None => debug!(user_id = %user_id, "No avatar to remove"),
        }

        if let Err(e) = self.delete_profile(user_id).await {
            return Err(fail(CascadeStep::DeleteProfile, &completed, e));
        }
        completed.push(CascadeStep::DeleteProfile);

        if let Err(e) = self.delete_user(user_id).await {
            return Err(fail(CascadeStep::DeleteUser, &completed, e));
        }
        completed.push(CascadeStep::DeleteUser);

        info!(user_id = %user_id, "Account deleted");
        Ok(completed)
    }
}

async fn check(response: reqwest::Response, what: &str) -> IdentityResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let body_summary = summarize_response_body(&body);
    warn!(status = %status, body_summary = %body_summary, "{} failed", what);
    Err(IdentityError::Api {
        status: status.as_u16(),
        message: error_message(&body).unwrap_or_else(|| format!("{} failed: {}", what, status)),
    })
}

/// `https://x/storage/v1/object/public/avatars/<uid>/<file>?t=1` -> `<uid>/<file>`.
fn avatar_object_path(avatar_url: &str) -> Option<String> {
    let path = match Url::parse(avatar_url) {
        Ok(url) => url.path().to_string(),
        Err(_) => avatar_url.split('?').next().unwrap_or_default().to_string(),
    };
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [.., owner, file] => Some(format!("{}/{}", owner, file)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::StubServer;
    use serde_json::json;

    const USER: &str = "8d2f0c1e-user";

    async fn admin() -> (StubServer, AdminClient) {
        let stub = StubServer::start().await.unwrap();
        let admin = AdminClient::new(&stub.url(), "service-secret").unwrap();
        (stub, admin)
    }

    fn route_all_ok(stub: &StubServer) {
        stub.route("DELETE", "/storage/v1/object/avatars", 200, json!([]));
        stub.route("DELETE", "/rest/v1/profiles", 204, json!(null));
        stub.route("DELETE", &format!("/auth/v1/admin/users/{USER}"), 200, json!({}));
    }

    #[test]
    fn avatar_path_is_last_two_segments() {
        assert_eq!(
            avatar_object_path(
                "https://x.supabase.co/storage/v1/object/public/avatars/8d2f/avatar.webp?t=17"
            )
            .as_deref(),
            Some("8d2f/avatar.webp")
        );
        assert_eq!(avatar_object_path("8d2f/a.png").as_deref(), Some("8d2f/a.png"));
        assert_eq!(avatar_object_path("a.png"), None);
    }

    #[test]
    fn debug_redacts_service_key() {
        let admin = AdminClient::new("https://x.supabase.co", "service-secret").unwrap();
        assert!(!format!("{admin:?}").contains("service-secret"));
        assert!(matches!(
            AdminClient::new("https://x.supabase.co", ""),
            Err(IdentityError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn cascade_runs_all_steps_in_order() {
        let (stub, admin) = admin().await;
        stub.route(
            "GET",
            "/rest/v1/profiles",
            200,
            json!([{"avatar_url": "https://x/storage/v1/object/public/avatars/8d2f/me.png"}]),
        );
        route_all_ok(&stub);

        let completed = admin.delete_account(USER).await.unwrap();
        assert_eq!(
            completed,
            vec![
                CascadeStep::RemoveAvatar,
                CascadeStep::DeleteProfile,
                CascadeStep::DeleteUser
            ]
        );

        let order: Vec<(String, String)> = stub
            .requests()
            .into_iter()
            .map(|r| (r.method.clone(), r.path().to_string()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("GET".to_string(), "/rest/v1/profiles".to_string()),
                ("DELETE".to_string(), "/storage/v1/object/avatars".to_string()),
                ("DELETE".to_string(), "/rest/v1/profiles".to_string()),
                ("DELETE".to_string(), format!("/auth/v1/admin/users/{USER}")),
            ]
        );

        let removal = &stub.requests_to("/storage/v1/object/avatars")[0];
        assert_eq!(removal.json(), json!({"prefixes": ["8d2f/me.png"]}));
        assert_eq!(removal.header("authorization"), Some("Bearer service-secret"));
        assert_eq!(removal.header("apikey"), Some("service-secret"));
    }

    #[tokio::test]
    async fn cascade_without_avatar_skips_removal() {
        let (stub, admin) = admin().await;
        stub.route("GET", "/rest/v1/profiles", 200, json!([{"avatar_url": null}]));
        route_all_ok(&stub);

        let completed = admin.delete_account(USER).await.unwrap();
        assert_eq!(
            completed,
            vec![CascadeStep::DeleteProfile, CascadeStep::DeleteUser]
        );
        assert!(stub.requests_to("/storage/v1/object/avatars").is_empty());
    }

    #[tokio::test]
    async fn cascade_stops_at_first_failure_without_rollback() {
        let (stub, admin) = admin().await;
        stub.route("GET", "/rest/v1/profiles", 200, json!([]));
        stub.route("DELETE", "/rest/v1/profiles", 204, json!(null));
        stub.route(
            "DELETE",
            &format!("/auth/v1/admin/users/{USER}"),
            500,
            json!({"msg": "Database error deleting user"}),
        );

        let err = admin.delete_account(USER).await.unwrap_err();
        assert_eq!(err.step, CascadeStep::DeleteUser);
        assert_eq!(err.completed, vec![CascadeStep::DeleteProfile]);
        assert!(err.to_string().contains("Database error deleting user"));
    }

    #[tokio::test]
    async fn user_id_cannot_escape_its_filter_or_segment() {
        let (stub, admin) = admin().await;
        stub.route("GET", "/rest/v1/profiles", 200, json!([]));
        stub.route("DELETE", "/rest/v1/profiles", 204, json!(null));

        let hostile = "nobody&or=(id.not.is.null)/../../users";
        let _ = admin.delete_account(hostile).await;

        let profile_deletes: Vec<_> = stub
            .requests_to("/rest/v1/profiles")
            .into_iter()
            .filter(|r| r.method == "DELETE")
            .collect();
        assert_eq!(profile_deletes.len(), 1);
        let pairs: Vec<(String, String)> =
            url::form_urlencoded::parse(profile_deletes[0].query().unwrap().as_bytes())
                .into_owned()
                .collect();
        assert_eq!(
            pairs,
            vec![("id".to_string(), format!("eq.{}", hostile))]
        );

        let user_deletes: Vec<_> = stub
            .requests()
            .into_iter()
            .filter(|r| r.path().starts_with("/auth/v1/admin/users/"))
            .collect();
        assert_eq!(user_deletes.len(), 1);
        assert_eq!(
            user_deletes[0].path(),
            "/auth/v1/admin/users/nobody&or=(id.not.is.null)%2F..%2F..%2Fusers"
        );
    }

    #[test]
    fn endpoint_encodes_each_segment() {
        let admin = AdminClient::new("https://x.supabase.co/", "k").unwrap();
        assert_eq!(
            admin.endpoint(&["auth", "v1", "admin", "users", "a/b"]).as_str(),
            "https://x.supabase.co/auth/v1/admin/users/a%2Fb"
        );
        assert!(matches!(
            AdminClient::new("mailto:ops@example.com", "k"),
            Err(IdentityError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn profile_failure_never_reaches_user_delete() {
        let (stub, admin) = admin().await;
        stub.route("GET", "/rest/v1/profiles", 200, json!([]));
        stub.route("DELETE", "/rest/v1/profiles", 403, json!({"message": "denied"}));

        let err = admin.delete_account(USER).await.unwrap_err();
        assert_eq!(err.step, CascadeStep::DeleteProfile);
        assert!(err.completed.is_empty());
        assert!(stub
            .requests_to(&format!("/auth/v1/admin/users/{USER}"))
            .is_empty());
    }
}
