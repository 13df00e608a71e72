//! Session of record with FSM-tracked transitions.
//!
//! Operations that move the FSM run one at a time under `op_lock`, so a
//! deep link that lands mid-refresh waits for the refresh instead of being
//! rejected. The std locks are never held across an await or while
//! publishing events.

use crate::auth_fsm::{AuthMachine, AuthMachineInput, AuthState};
use crate::events::{FollowUp, FollowUpScheduler, SessionEvent, SessionEventBus};
use crate::session::{token_expiry, Session};
use crate::storage::{SessionStorage, DEFAULT_STORAGE_KEY};
use crate::{SessionError, SessionResult};
use deep_link::{DeepLinkPayload, VerificationKind, URL_SCHEME};
use identity_client::{IdentityClient, OtpType, PkcePair};
use serde::Serialize;
use shell_ipc::{AccountDeleteParams, AccountDeleteResult, IpcClient, Method, UrlParams};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result of handling one delivered deep link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HandleOutcome {
    SignedIn { user_id: String },
    EmailConfirmed { user_id: String },
    /// Recovery verified; the user must now set a new password.
    Recovering { user_id: String },
    Failed { error: String },
}

impl HandleOutcome {
    fn failed(error: impl Into<String>) -> Self {
        HandleOutcome::Failed {
            error: error.into(),
        }
    }
}

/// An OAuth sign-in ready to open in the external browser.
#[derive(Clone)]
pub struct OAuthStart {
    pub url: String,
    pub verifier: String,
}

impl std::fmt::Debug for OAuthStart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthStart")
            .field("url", &self.url)
            .field("verifier", &"<redacted>")
            .finish()
    }
}

pub fn oauth_redirect() -> String {
    format!("{}://auth/callback", URL_SCHEME)
}

pub fn password_reset_redirect() -> String {
    format!("{}://auth/reset", URL_SCHEME)
}

/// Owns the in-memory session and keeps storage in step with it.
pub struct SessionManager<S: SessionStorage> {
    client: IdentityClient,
    storage: S,
    storage_key: String,
    session: Mutex<Option<Session>>,
    fsm: Mutex<AuthMachine>,
    op_lock: AsyncMutex<()>,
    events: SessionEventBus,
    follow_up_tx: mpsc::UnboundedSender<FollowUp>,
    follow_up_rx: Mutex<Option<mpsc::UnboundedReceiver<FollowUp>>>,
}

impl<S: SessionStorage> SessionManager<S> {
    pub fn new(client: IdentityClient, storage: S) -> Self {
        let (follow_up_tx, follow_up_rx) = mpsc::unbounded_channel();
        Self {
            client,
            storage,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            session: Mutex::new(None),
            fsm: Mutex::new(AuthMachine::new()),
            op_lock: AsyncMutex::new(()),
            events: SessionEventBus::default(),
            follow_up_tx,
            follow_up_rx: Mutex::new(Some(follow_up_rx)),
        }
    }

    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    fn verifier_key(&self) -> String {
        format!("{}-code-verifier", self.storage_key)
    }

    pub fn events(&self) -> &SessionEventBus {
        &self.events
    }

    pub fn scheduler(&self) -> FollowUpScheduler {
        FollowUpScheduler::new(self.follow_up_tx.clone())
    }

    /// Subscribe a session-changed listener. See [`SessionEventBus::listen`].
    pub fn on_session_event<F>(&self, listener: F) -> SessionResult<JoinHandle<()>>
    where
        F: Fn(&SessionEvent, &FollowUpScheduler) + Send + 'static,
    {
        self.events.listen(self.scheduler(), listener)
    }

    pub fn auth_state(&self) -> AuthState {
        let fsm = self.fsm.lock().unwrap_or_else(|e| e.into_inner());
        AuthState::from(fsm.state())
    }

    pub fn current_session(&self) -> Option<Session> {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn transition(&self, input: &AuthMachineInput) -> SessionResult<AuthState> {
        let mut fsm = self.fsm.lock().unwrap_or_else(|e| e.into_inner());
        let old_state = AuthState::from(fsm.state());

        fsm.consume(input).map_err(|_| {
            SessionError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;

        let new_state = AuthState::from(fsm.state());
        if old_state != new_state {
            debug!(old_state = ?old_state, new_state = ?new_state, "Auth state transition");
        }
        Ok(new_state)
    }

    /// Leave `Exchanging` after a failure, back to whatever the memory says.
    fn abandon_exchange(&self) {
        let input = if self.current_session().is_some() {
            AuthMachineInput::ExchangeAbandoned
        } else {
            AuthMachineInput::ExchangeFailed
        };
        if let Err(e) = self.transition(&input) {
            warn!(error = %e, "Could not leave exchange state");
        }
    }

    async fn install(&self, session: Session) -> SessionResult<()> {
        let json = serde_json::to_string(&session)?;
        *self.session.lock().unwrap_or_else(|e| e.into_inner()) = Some(session);
        self.storage.set_item(&self.storage_key, &json).await
    }

    async fn clear_local(&self) {
        *self.session.lock().unwrap_or_else(|e| e.into_inner()) = None;
        if let Err(e) = self.storage.remove_item(&self.storage_key).await {
            warn!(error = %e, "Failed to remove persisted session");
        }
    }

    /// Finish an exchange that produced `session`.
    async fn complete_exchange(
        &self,
        session: Session,
        success: AuthMachineInput,
    ) -> SessionResult<String> {
        let user_id = session.user_id.clone();
        if let Err(e) = self.install(session).await {
            // In memory but not persisted; still usable this run.
            warn!(error = %e, "Failed to persist session");
        }
        self.transition(&success)?;
        Ok(user_id)
    }

    /// Consume one delivered deep link. Never returns an error; failures come
    /// back as [`HandleOutcome::Failed`].
    pub async fn handle_payload(&self, payload: DeepLinkPayload) -> HandleOutcome {
        let _op = self.op_lock.lock().await;
        let kind = payload.kind();
        let outcome = match payload {
            DeepLinkPayload::OAuthCallback {
                code,
                error,
                error_description,
            } => {
                if let Some(error) = error {
                    let message = error_description.unwrap_or(error);
                    warn!(error = %message, "OAuth callback carried an error");
                    return HandleOutcome::failed(message);
                }
                match code {
                    Some(code) if !code.is_empty() => self.exchange_code(&code).await,
                    _ => HandleOutcome::failed("missing authorization code"),
                }
            }
            DeepLinkPayload::SessionHandoff {
                access_token,
                refresh_token,
            } => {
                if access_token.is_empty() || refresh_token.is_empty() {
                    return HandleOutcome::failed("incomplete session handoff");
                }
                self.install_handoff(access_token, refresh_token).await
            }
            DeepLinkPayload::VerificationLink { token_hash, kind } => {
                if token_hash.is_empty() {
                    return HandleOutcome::failed("missing token hash");
                }
                self.verify_link(&token_hash, kind).await
            }
        };
        debug!(kind = ?kind, outcome = ?outcome, "Handled deep link");
        outcome
    }

    async fn exchange_code(&self, code: &str) -> HandleOutcome {
        let verifier_key = self.verifier_key();
        let verifier = match self.storage.get_item(&verifier_key).await {
            Ok(Some(verifier)) => verifier,
            Ok(None) => return HandleOutcome::failed("no sign-in in progress"),
            Err(e) => return HandleOutcome::failed(e.user_message()),
        };
        if let Err(e) = self.transition(&AuthMachineInput::ExchangeStarted) {
            return HandleOutcome::failed(e.to_string());
        }

        let result = self.client.exchange_code(code, &verifier).await;
        // Verifier is single-use either way.
        if let Err(e) = self.storage.remove_item(&verifier_key).await {
            warn!(error = %e, "Failed to remove code verifier");
        }

        match result {
            Ok(session) => self.signed_in(session.into()).await,
            Err(e) => {
                warn!(error = %e, "Code exchange failed");
                self.abandon_exchange();
                HandleOutcome::failed(e.user_message())
            }
        }
    }

    async fn install_handoff(&self, access_token: String, refresh_token: String) -> HandleOutcome {
        if let Err(e) = self.transition(&AuthMachineInput::ExchangeStarted) {
            return HandleOutcome::failed(e.to_string());
        }
        match self.client.get_user(&access_token).await {
            Ok(user) => {
                let session = Session {
                    expires_at: token_expiry(&access_token),
                    access_token,
                    refresh_token,
                    user_id: user.id,
                    email: user.email,
                };
                self.signed_in(session).await
            }
            Err(e) => {
                warn!(error = %e, "Session handoff rejected");
                self.abandon_exchange();
                HandleOutcome::failed(e.user_message())
            }
        }
    }

    async fn verify_link(&self, token_hash: &str, kind: VerificationKind) -> HandleOutcome {
        if let Err(e) = self.transition(&AuthMachineInput::ExchangeStarted) {
            return HandleOutcome::failed(e.to_string());
        }
        let otp_type = match kind {
            VerificationKind::EmailConfirm => OtpType::Email,
            VerificationKind::PasswordRecovery => OtpType::Recovery,
        };
        let session: Session = match self.client.verify_otp(token_hash, otp_type).await {
            Ok(session) => session.into(),
            Err(e) => {
                warn!(error = %e, kind = ?kind, "Verification failed");
                self.abandon_exchange();
                return HandleOutcome::failed(e.user_message());
            }
        };

        match kind {
            VerificationKind::EmailConfirm => match self.signed_in(session).await {
                HandleOutcome::SignedIn { user_id } => HandleOutcome::EmailConfirmed { user_id },
                other => other,
            },
            VerificationKind::PasswordRecovery => {
                match self
                    .complete_exchange(session, AuthMachineInput::RecoveryVerified)
                    .await
                {
                    Ok(user_id) => {
                        info!(user_id = %user_id, "Password recovery verified");
                        self.events.publish(SessionEvent::PasswordRecovery {
                            user_id: user_id.clone(),
                        });
                        HandleOutcome::Recovering { user_id }
                    }
                    Err(e) => HandleOutcome::failed(e.to_string()),
                }
            }
        }
    }

    async fn establish(&self, session: Session) -> SessionResult<String> {
        let user_id = self
            .complete_exchange(session, AuthMachineInput::ExchangeSucceeded)
            .await?;
        info!(user_id = %user_id, "Signed in");
        self.events.publish(SessionEvent::SignedIn {
            user_id: user_id.clone(),
        });
        Ok(user_id)
    }

    async fn signed_in(&self, session: Session) -> HandleOutcome {
        match self.establish(session).await {
            Ok(user_id) => HandleOutcome::SignedIn { user_id },
            Err(e) => HandleOutcome::failed(e.to_string()),
        }
    }

    /// Start a PKCE sign-in. The verifier is persisted so the callback can
    /// complete the exchange, even after a restart.
    pub async fn begin_oauth(&self, provider: &str) -> SessionResult<OAuthStart> {
        let pkce = PkcePair::generate();
        let url = self
            .client
            .authorize_url(provider, &oauth_redirect(), &pkce.challenge)?;
        self.storage
            .set_item(&self.verifier_key(), &pkce.verifier)
            .await?;
        debug!(provider = %provider, "OAuth sign-in prepared");
        Ok(OAuthStart {
            url,
            verifier: pkce.verifier,
        })
    }

    /// [`begin_oauth`](Self::begin_oauth), then ask the host to open the
    /// authorize URL in the external browser.
    pub async fn launch_oauth(&self, provider: &str, host: &IpcClient) -> SessionResult<()> {
        let start = self.begin_oauth(provider).await?;
        let params = serde_json::to_value(UrlParams { url: start.url })?;
        let _: serde_json::Value = host.request(Method::OAuthLaunch, Some(params)).await?;
        Ok(())
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> SessionResult<Session> {
        let _op = self.op_lock.lock().await;
        self.transition(&AuthMachineInput::ExchangeStarted)?;
        match self.client.sign_in_with_password(email, password).await {
            Ok(session) => {
                let session: Session = session.into();
                self.establish(session.clone()).await?;
                Ok(session)
            }
            Err(e) => {
                self.abandon_exchange();
                Err(e.into())
            }
        }
    }

    /// Sign out locally and with the provider. Provider failures are logged;
    /// the local session is cleared regardless.
    pub async fn sign_out(&self) -> SessionResult<()> {
        let _op = self.op_lock.lock().await;
        let Some(session) = self.current_session() else {
            debug!("Sign out with no session");
            return Ok(());
        };
        self.transition(&AuthMachineInput::SignOutRequested)?;

        if let Err(e) = self.client.sign_out(&session.access_token).await {
            warn!(error = %e, "Provider sign-out failed, clearing local session anyway");
        }
        self.finish_sign_out().await
    }

    async fn finish_sign_out(&self) -> SessionResult<()> {
        self.clear_local().await;
        self.transition(&AuthMachineInput::SignOutComplete)?;
        info!("Signed out");
        self.events.publish(SessionEvent::SignedOut);
        Ok(())
    }

    /// Exchange the refresh token for a new session.
    ///
    /// A transient failure (network, 5xx, 429) keeps the current session for
    /// a later attempt. Any other failure clears it.
    pub async fn refresh(&self) -> SessionResult<Session> {
        let _op = self.op_lock.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> SessionResult<Session> {
        let session = self.current_session().ok_or(SessionError::NotSignedIn)?;
        self.transition(&AuthMachineInput::RefreshStarted)?;

        match self.client.refresh_session(&session.refresh_token).await {
            Ok(refreshed) => {
                let refreshed: Session = refreshed.into();
                if let Err(e) = self.install(refreshed.clone()).await {
                    warn!(error = %e, "Failed to persist refreshed session");
                }
                self.transition(&AuthMachineInput::RefreshSucceeded)?;
                info!(user_id = %refreshed.user_id, "Token refreshed successfully");
                self.events.publish(SessionEvent::TokenRefreshed {
                    user_id: refreshed.user_id.clone(),
                });
                Ok(refreshed)
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, "Refresh failed with transient error, keeping session");
                self.transition(&AuthMachineInput::RefreshDeferred)?;
                Err(e.into())
            }
            Err(e) => {
                warn!(error = %e, "Refresh rejected, clearing session");
                self.refresh_failed().await?;
                Err(e.into())
            }
        }
    }

    async fn refresh_failed(&self) -> SessionResult<()> {
        self.clear_local().await;
        self.transition(&AuthMachineInput::RefreshFailed)?;
        self.events.publish(SessionEvent::SignedOut);
        Ok(())
    }

    /// Send a reset e-mail whose link returns to `appscheme://auth/reset`.
    pub async fn request_password_reset(&self, email: &str) -> SessionResult<()> {
        self.client
            .recover(email, &password_reset_redirect())
            .await?;
        info!("Password reset requested");
        Ok(())
    }

    /// Set a new password. Only valid in the recovery session a reset link
    /// produced.
    pub async fn complete_password_reset(&self, new_password: &str) -> SessionResult<()> {
        let _op = self.op_lock.lock().await;
        if self.auth_state() != AuthState::Recovering {
            return Err(SessionError::NotRecovering);
        }
        let session = self.current_session().ok_or(SessionError::NotSignedIn)?;
        let user = self
            .client
            .update_password(&session.access_token, new_password)
            .await?;
        self.transition(&AuthMachineInput::PasswordUpdated)?;
        info!(user_id = %user.id, "Password updated");
        self.events
            .publish(SessionEvent::UserUpdated { user_id: user.id });
        Ok(())
    }

    /// Restore the persisted session when the app becomes visible.
    ///
    /// Does nothing when a session is already in memory. Returns whether a
    /// session was restored.
    pub async fn resync_on_visible(&self) -> SessionResult<bool> {
        let _op = self.op_lock.lock().await;
        if self.current_session().is_some() {
            return Ok(false);
        }
        let Some(json) = self.storage.get_item(&self.storage_key).await? else {
            return Ok(false);
        };
        let stored: Session = match serde_json::from_str(&json) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable persisted session");
                self.storage.remove_item(&self.storage_key).await?;
                return Ok(false);
            }
        };

        let expired = stored.is_expired();
        let user_id = stored.user_id.clone();
        {
            let mut slot = self.session.lock().unwrap_or_else(|e| e.into_inner());
            if slot.is_some() {
                return Ok(false);
            }
            *slot = Some(stored);
        }
        self.transition(&AuthMachineInput::SessionRestored)?;
        info!(user_id = %user_id, expired, "Restored persisted session");
        self.events.publish(SessionEvent::SignedIn { user_id });

        if expired {
            if let Err(e) = self.refresh_locked().await {
                warn!(error = %e, "Restored session could not be refreshed");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Delete the account after re-verifying the password.
    ///
    /// The destructive cascade runs in the host, which holds the service
    /// credential. On success the local session is discarded without a
    /// provider sign-out (the user no longer exists).
    pub async fn delete_account(&self, password: &str, host: &IpcClient) -> SessionResult<()> {
        let _op = self.op_lock.lock().await;
        let session = self.current_session().ok_or(SessionError::NotSignedIn)?;
        let email = session.email.as_deref().ok_or(SessionError::MissingEmail)?;

        self.client.sign_in_with_password(email, password).await?;

        let params = serde_json::to_value(AccountDeleteParams {
            user_id: session.user_id.clone(),
        })?;
        let result: AccountDeleteResult = host.request(Method::AccountDelete, Some(params)).await?;
        if !result.success {
            let error = result
                .error
                .unwrap_or_else(|| "account deletion failed".to_string());
            warn!(user_id = %session.user_id, error = %error, "Host refused account deletion");
            return Err(SessionError::AccountDeletion(error));
        }

        info!(user_id = %session.user_id, "Account deleted");
        self.transition(&AuthMachineInput::SignOutRequested)?;
        self.finish_sign_out().await
    }
}

impl<S: SessionStorage + 'static> SessionManager<S> {
    /// Start the task that runs scheduled follow-ups. Returns `None` if it
    /// was already started.
    ///
    /// The worker holds only a weak reference and exits once the manager is
    /// dropped.
    pub fn spawn_follow_up_worker(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut rx = self
            .follow_up_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()?;
        let manager: Weak<Self> = Arc::downgrade(self);

        Some(tokio::spawn(async move {
            while let Some(follow_up) = rx.recv().await {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.run_follow_up(follow_up).await;
            }
            debug!("Follow-up worker stopped");
        }))
    }

    async fn run_follow_up(&self, follow_up: FollowUp) {
        debug!(follow_up = ?follow_up, "Running follow-up");
        let result = match follow_up {
            FollowUp::Refresh => self.refresh().await.map(|_| ()),
            FollowUp::Resync => self.resync_on_visible().await.map(|_| ()),
        };
        if let Err(e) = result {
            warn!(follow_up = ?follow_up, error = %e, "Follow-up failed");
        }
    }
}
