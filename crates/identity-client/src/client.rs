//! Public identity client (publishable key only).

use crate::types::{AuthSession, AuthUser, OtpType};
use crate::{error_message, summarize_response_body, IdentityError, IdentityResult};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Calls the provider's `/auth/v1` endpoints on behalf of an end user.
#[derive(Clone)]
pub struct IdentityClient {
    http_client: Client,
    base_url: String,
    publishable_key: String,
}

impl std::fmt::Debug for IdentityClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl IdentityClient {
    /// Create a client for the project at `base_url`.
    pub fn new(base_url: &str, publishable_key: &str) -> IdentityResult<Self> {
        if base_url.trim().is_empty() {
            return Err(IdentityError::NotConfigured(
                "identity provider URL is empty".to_string(),
            ));
        }
        if publishable_key.trim().is_empty() {
            return Err(IdentityError::NotConfigured(
                "publishable key is empty".to_string(),
            ));
        }
        Url::parse(base_url)?;

        let http_client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            publishable_key: publishable_key.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.http_client
            .post(self.auth_url(path))
            .header("apikey", &self.publishable_key)
            .header("Content-Type", "application/json")
    }

    fn with_user(&self, builder: RequestBuilder, access_token: &str) -> RequestBuilder {
        builder.header("Authorization", format!("Bearer {}", access_token))
    }

    /// Authorize URL to open in the external browser for an OAuth sign-in.
    pub fn authorize_url(
        &self,
        provider: &str,
        redirect_to: &str,
        code_challenge: &str,
    ) -> IdentityResult<String> {
        let mut url = Url::parse(&self.auth_url("authorize"))?;
        url.query_pairs_mut()
            .append_pair("provider", provider)
            .append_pair("redirect_to", redirect_to)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256");
        Ok(url.into())
    }

    /// Exchange an authorization code plus the PKCE verifier for a session.
    pub async fn exchange_code(&self, auth_code: &str, code_verifier: &str) -> IdentityResult<AuthSession> {
        debug!("Exchanging authorization code");
        let response = self
            .post("token?grant_type=pkce")
            .json(&serde_json::json!({
                "auth_code": auth_code,
                "code_verifier": code_verifier,
            }))
            .send()
            .await?;
        let session: AuthSession = parse_json(response, "Code exchange").await?;
        info!(user_id = %session.user.id, "Authorization code exchanged");
        Ok(session.normalized())
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> IdentityResult<AuthSession> {
        debug!("Attempting email/password sign-in");
        let response = self
            .post("token?grant_type=password")
            .json(&serde_json::json!({
                "email": email,
                "password": password,
            }))
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 400 {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body_summary = %summarize_response_body(&body), "Sign-in rejected");
            return Err(IdentityError::InvalidCredentials(
                error_message(&body).unwrap_or_else(|| "Invalid login credentials".to_string()),
            ));
        }

        let session: AuthSession = parse_json(response, "Sign-in").await?;
        info!(user_id = %session.user.id, "Signed in with password");
        Ok(session.normalized())
    }

    pub async fn refresh_session(&self, refresh_token: &str) -> IdentityResult<AuthSession> {
        debug!("Refreshing session");
        let response = self
            .post("token?grant_type=refresh_token")
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        let session: AuthSession = parse_json(response, "Token refresh").await?;
        Ok(session.normalized())
    }

    /// Complete an e-mail confirmation or password-recovery link.
    pub async fn verify_otp(&self, token_hash: &str, otp_type: OtpType) -> IdentityResult<AuthSession> {
        debug!(otp_type = otp_type.as_str(), "Verifying token hash");
        let response = self
            .post("verify")
            .json(&serde_json::json!({
                "token_hash": token_hash,
                "type": otp_type,
            }))
            .send()
            .await?;
        let session: AuthSession = parse_json(response, "Verification").await?;
        info!(user_id = %session.user.id, otp_type = otp_type.as_str(), "Token hash verified");
        Ok(session.normalized())
    }

    /// Fetch the user behind an access token; fails if the token is revoked.
    pub async fn get_user(&self, access_token: &str) -> IdentityResult<AuthUser> {
        let response = self
            .with_user(
                self.http_client
                    .get(self.auth_url("user"))
                    .header("apikey", &self.publishable_key),
                access_token,
            )
            .send()
            .await?;
        parse_json(response, "User lookup").await
    }

    /// Send a password-recovery e-mail whose link redirects to `redirect_to`.
    pub async fn recover(&self, email: &str, redirect_to: &str) -> IdentityResult<()> {
        let mut url = Url::parse(&self.auth_url("recover"))?;
        url.query_pairs_mut().append_pair("redirect_to", redirect_to);

        let response = self
            .http_client
            .post(url)
            .header("apikey", &self.publishable_key)
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await?;
        ensure_success(response, "Password recovery").await?;
        info!("Password recovery e-mail requested");
        Ok(())
    }

    /// Set a new password for the user behind `access_token`.
    pub async fn update_password(&self, access_token: &str, new_password: &str) -> IdentityResult<AuthUser> {
        let response = self
            .with_user(
                self.http_client
                    .put(self.auth_url("user"))
                    .header("apikey", &self.publishable_key)
                    .header("Content-Type", "application/json"),
                access_token,
            )
            .json(&serde_json::json!({ "password": new_password }))
            .send()
            .await?;
        let user: AuthUser = parse_json(response, "Password update").await?;
        info!(user_id = %user.id, "Password updated");
        Ok(user)
    }

    /// Revoke the session server-side.
    pub async fn sign_out(&self, access_token: &str) -> IdentityResult<()> {
        let response = self
            .with_user(self.post("logout"), access_token)
            .send()
            .await?;
        ensure_success(response, "Sign-out").await?;
        debug!("Session revoked");
        Ok(())
    }
}

async fn ensure_success(response: Response, what: &str) -> IdentityResult<Response> {
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

async fn parse_json<T: DeserializeOwned>(response: Response, what: &str) -> IdentityResult<T> {
    let response = ensure_success(response, what).await?;
    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}
