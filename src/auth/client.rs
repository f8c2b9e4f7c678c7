use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::auth::providers::{create_provider, ProviderAdapter};
use crate::auth::session::{AuthEvent, AuthState, Session};
use crate::auth::session_manager::{AuthRedirect, IdentitySessionManager, OidcSessionManager};
use crate::auth::storage::{create_storage, SessionStorage};
use crate::auth::store::SessionStore;
use crate::auth::user::StandardizedUser;
use crate::common::single_flight::SingleFlight;
use crate::config::AuthConfig;
use crate::error::{AuthError, Result};

/// Storage key of the flag recording that the session may be renewed silently
pub const CAN_REFRESH_KEY: &str = "authCanRefreshKey";

/// Backend lookup of the signed-in user, used to verify a restored session
#[async_trait]
pub trait CurrentUserSource: Send + Sync {
    async fn current_user(&self) -> Result<Value>;
}

/// Token lifecycle for the signed-in user.
///
/// Construct one per application, call [`AuthClient::init`] once at startup and
/// share it by reference with the request pipeline. Concurrent refreshes are
/// collapsed into one call to the identity provider.
pub struct AuthClient {
    provider: Arc<dyn ProviderAdapter>,
    sessions: Arc<dyn IdentitySessionManager>,
    storage: Arc<dyn SessionStorage>,
    store: Arc<SessionStore>,
    refresh: SingleFlight<(), Infallible>,
    loaded: watch::Sender<bool>,
}

impl AuthClient {
    pub fn new(
        provider: Arc<dyn ProviderAdapter>,
        sessions: Arc<dyn IdentitySessionManager>,
        storage: Arc<dyn SessionStorage>,
        store: Arc<SessionStore>,
    ) -> Self {
        let (loaded, _) = watch::channel(false);
        Self {
            provider,
            sessions,
            storage,
            store,
            refresh: SingleFlight::new(),
            loaded,
        }
    }

    /// Wire up the provider, storage and OIDC session manager named by `config`
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let provider = create_provider(config)?;
        let storage = create_storage(config);
        let sessions = OidcSessionManager::new(
            Arc::clone(&provider),
            Arc::clone(&storage),
            config.request_timeout(),
        )
        .map_err(|e| AuthError::identity(e.to_string()))?;

        Ok(Self::new(
            provider,
            Arc::new(sessions),
            storage,
            Arc::new(SessionStore::new()),
        ))
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn provider(&self) -> &Arc<dyn ProviderAdapter> {
        &self.provider
    }

    /// Load the stored session and publish the current user.
    ///
    /// With a `verifier` the restored session is checked against the backend and
    /// the backend's profile is merged into the user; if the check fails the
    /// session is discarded. [`AuthClient::is_loaded`] resolves once this returns.
    pub async fn init(&self, verifier: Option<&dyn CurrentUserSource>) {
        self.store.set_state(AuthState::Loading);

        match self.read_session().await {
            Some(session) => {
                let user = self.provider.standardize_user(&session.raw_user());
                match verifier {
                    Some(verifier) => match verifier.current_user().await {
                        Ok(profile) => {
                            info!(provider = self.provider.name(), "Restored session verified");
                            self.store
                                .set_user(Some(StandardizedUser::merge(profile, user)));
                        }
                        Err(e) => {
                            warn!(error = %e, "Restored session failed verification, discarding it");
                            self.clear_session().await;
                        }
                    },
                    None => self.store.set_user(Some(user)),
                }
            }
            None => {
                debug!("No stored session");
                self.remove_can_refresh_flag().await;
                self.store.set_user(None);
            }
        }

        self.loaded.send_replace(true);
    }

    /// Undo [`AuthClient::init`] so the instance can be initialised again
    pub fn dispose(&self) {
        self.loaded.send_replace(false);
        self.store.reset();
    }

    /// Wait until the initial session load has completed
    pub async fn is_loaded(&self) -> bool {
        let mut loaded = self.loaded.subscribe();
        let ready = loaded.wait_for(|loaded| *loaded).await.is_ok();
        ready
    }

    /// Whether the initial session load has completed, without waiting
    pub fn loaded(&self) -> bool {
        *self.loaded.borrow()
    }

    /// Start an interactive sign-in
    pub fn login(&self) -> Result<AuthRedirect> {
        let state = uuid::Uuid::new_v4().simple().to_string();
        let redirect = self
            .sessions
            .signin_redirect(&state)
            .map_err(|e| AuthError::identity(e.to_string()))?;
        info!(provider = %redirect.provider, "Redirecting to sign-in");
        Ok(redirect)
    }

    /// Store the session produced by a completed sign-in and publish its user
    pub async fn complete_login(&self, session: Session) -> Result<StandardizedUser> {
        self.sessions
            .persist_session(&session)
            .await
            .map_err(|e| AuthError::storage(e.to_string()))?;
        if self.provider.can_silently_refresh() {
            self.storage
                .set_item(CAN_REFRESH_KEY, "true")
                .await
                .map_err(|e| AuthError::storage(e.to_string()))?;
        }

        let user = self.provider.standardize_user(&session.raw_user());
        self.store.set_user(Some(user.clone()));
        info!(provider = self.provider.name(), "Sign-in completed");
        Ok(user)
    }

    /// Discard the local session and return the provider's sign-out page
    pub async fn logout(&self) -> AuthRedirect {
        self.clear_session().await;
        info!(provider = self.provider.name(), "Signed out");
        self.sessions.signout_redirect()
    }

    /// Current access token, refreshing first if the stored session has none
    pub async fn get_access_token(&self) -> Result<String> {
        if let Some(token) = self.stored_access_token().await {
            return Ok(token);
        }
        self.refresh_access_token().await
    }

    /// Renew the access token, failing with [`AuthError::LoginRequired`] when
    /// that is not possible.
    ///
    /// Concurrent callers share a single refresh. Every failure on this path,
    /// including transient ones, ends the session.
    pub async fn refresh_access_token(&self) -> Result<String> {
        let session = self.read_session().await;
        let has_refresh_token = session.as_ref().and_then(Session::refresh_token).is_some();

        // The flag alone is never enough; the provider must support silent renewal too
        let refreshable = has_refresh_token
            || (self.provider.can_silently_refresh() && self.can_refresh_flag().await);

        if refreshable {
            if let Err(never) = self.refresh.execute(|| self.perform_token_refresh()).await {
                match *never {}
            }
            if let Some(token) = self.stored_access_token().await {
                return Ok(token);
            }
        } else {
            debug!("Session cannot be refreshed");
        }

        self.clear_session().await;
        Err(AuthError::LoginRequired)
    }

    /// One silent refresh. Failures end the session instead of propagating, so
    /// the caller decides what to report by re-reading the session.
    async fn perform_token_refresh(&self) -> std::result::Result<(), Infallible> {
        let previous = self.store.state();
        self.store.set_state(AuthState::Refreshing);
        debug!(provider = self.provider.name(), "Refreshing session");

        match self.sessions.refresh_silently().await {
            Ok(()) => {
                if self.provider.can_silently_refresh() {
                    if let Err(e) = self.storage.set_item(CAN_REFRESH_KEY, "true").await {
                        warn!(error = %e, "Failed to record silent refresh capability");
                    }
                }
                self.store.set_state(if self.store.user_is_logged_in() {
                    AuthState::LoggedIn
                } else {
                    previous
                });
                self.store.publish(AuthEvent::RefreshSucceeded);
                info!(provider = self.provider.name(), "Session refreshed");
            }
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "Session refresh failed");
                self.store.publish(AuthEvent::RefreshFailed {
                    reason: e.to_string(),
                });
                self.clear_session().await;
            }
        }
        Ok(())
    }

    /// Corrupt the stored access token so the backend rejects it
    #[cfg(any(test, feature = "diagnostics"))]
    pub async fn expire_access_token(&self) -> Result<()> {
        self.corrupt_session(|session| {
            session.access_token = Some(format!(
                "x{}x",
                session.access_token.as_deref().unwrap_or_default()
            ));
        })
        .await
    }

    /// Corrupt the stored refresh token so the identity provider rejects it
    #[cfg(any(test, feature = "diagnostics"))]
    pub async fn expire_refresh_token(&self) -> Result<()> {
        self.corrupt_session(|session| {
            session.refresh_token = Some(format!(
                "x{}x",
                session.refresh_token.as_deref().unwrap_or_default()
            ));
        })
        .await
    }

    #[cfg(any(test, feature = "diagnostics"))]
    async fn corrupt_session(&self, corrupt: impl FnOnce(&mut Session) + Send) -> Result<()> {
        if let Some(mut session) = self.read_session().await {
            corrupt(&mut session);
            self.sessions
                .persist_session(&session)
                .await
                .map_err(|e| AuthError::storage(e.to_string()))?;
            warn!("Stored session corrupted on request");
        }
        Ok(())
    }

    async fn read_session(&self) -> Option<Session> {
        match self.sessions.get_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Failed to read stored session");
                None
            }
        }
    }

    async fn stored_access_token(&self) -> Option<String> {
        self.read_session()
            .await
            .and_then(|session| session.access_token().map(str::to_string))
    }

    async fn can_refresh_flag(&self) -> bool {
        match self.storage.get_item(CAN_REFRESH_KEY).await {
            Ok(value) => value.is_some_and(|v| !v.is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to read silent refresh flag");
                false
            }
        }
    }

    async fn remove_can_refresh_flag(&self) {
        if let Err(e) = self.storage.remove_item(CAN_REFRESH_KEY).await {
            warn!(error = %e, "Failed to clear silent refresh flag");
        }
    }

    /// Remove the session and the refresh flag, then publish a signed-out user
    async fn clear_session(&self) {
        if let Err(e) = self.sessions.remove_session().await {
            warn!(error = %e, "Failed to remove stored session");
        }
        self.remove_can_refresh_flag().await;
        self.store.set_user(None);
    }
}

#[async_trait]
impl crate::api::TokenSource for AuthClient {
    async fn access_token(&self) -> Result<String> {
        self.get_access_token().await
    }

    async fn refresh_access_token(&self) -> Result<String> {
        AuthClient::refresh_access_token(self).await
    }
}
