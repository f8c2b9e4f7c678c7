use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::auth::providers::ProviderAdapter;
use crate::auth::session::{session_storage_key, Session, TokenResponse};
use crate::auth::storage::SessionStorage;

/// Where to send the user for an interactive sign-in or sign-out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRedirect {
    pub url: String,
    /// Opaque value echoed back on the sign-in callback
    pub state: Option<String>,
    pub provider: String,
}

/// Owns the persisted session and talks to the identity provider's token endpoint
#[async_trait]
pub trait IdentitySessionManager: Send + Sync {
    /// Stored session, if any. An undecodable stored session is removed and
    /// reported as absent.
    async fn get_session(&self) -> Result<Option<Session>>;

    async fn persist_session(&self, session: &Session) -> Result<()>;

    async fn remove_session(&self) -> Result<()>;

    /// Renew the stored session without user interaction. Fails if that is not possible.
    async fn refresh_silently(&self) -> Result<()>;

    /// Authorization URL that starts an interactive sign-in
    fn signin_redirect(&self, state: &str) -> Result<AuthRedirect>;

    /// End-session URL for an interactive sign-out
    fn signout_redirect(&self) -> AuthRedirect;
}

/// OpenID Connect session manager backed by [`SessionStorage`]
pub struct OidcSessionManager {
    provider: Arc<dyn ProviderAdapter>,
    storage: Arc<dyn SessionStorage>,
    http: Client,
    storage_key: String,
}

impl OidcSessionManager {
    pub fn new(
        provider: Arc<dyn ProviderAdapter>,
        storage: Arc<dyn SessionStorage>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build identity HTTP client")?;
        Ok(Self::with_client(provider, storage, http))
    }

    pub fn with_client(
        provider: Arc<dyn ProviderAdapter>,
        storage: Arc<dyn SessionStorage>,
        http: Client,
    ) -> Self {
        let config = provider.config();
        let storage_key = session_storage_key(&config.authority, &config.client_id);
        Self {
            provider,
            storage,
            http,
            storage_key,
        }
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Exchange an authorization code from the sign-in callback for a session.
    /// The session is returned, not stored.
    pub async fn exchange_code(&self, code: &str) -> Result<Session> {
        let config = self.provider.config();
        let response = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("client_id", config.client_id.as_str()),
                ("redirect_uri", config.redirect_uri.as_str()),
                ("code", code),
            ])
            .await?;

        if response.access_token.as_deref().map_or(true, str::is_empty) {
            return Err(anyhow!("Token response did not include an access token"));
        }
        info!(provider = self.provider.name(), "Authorization code exchanged");
        Session::from_token_response(response)
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let endpoint = &self.provider.config().metadata.token_endpoint;
        let response = self
            .http
            .post(endpoint)
            .form(form)
            .send()
            .await
            .with_context(|| format!("Token request to {} failed", endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Token endpoint returned {}: {}", status, body));
        }

        response
            .json::<TokenResponse>()
            .await
            .context("Failed to parse token response")
    }
}

#[async_trait]
impl IdentitySessionManager for OidcSessionManager {
    async fn get_session(&self) -> Result<Option<Session>> {
        let Some(raw) = self.storage.get_item(&self.storage_key).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<Session>(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(error = %e, "Stored session is unreadable, removing it");
                self.storage.remove_item(&self.storage_key).await?;
                Ok(None)
            }
        }
    }

    async fn persist_session(&self, session: &Session) -> Result<()> {
        let raw = serde_json::to_string(session).context("Failed to serialize session")?;
        self.storage.set_item(&self.storage_key, &raw).await
    }

    async fn remove_session(&self) -> Result<()> {
        debug!("Removing stored session");
        self.storage.remove_item(&self.storage_key).await
    }

    async fn refresh_silently(&self) -> Result<()> {
        let mut session = self
            .get_session()
            .await?
            .ok_or_else(|| anyhow!("No stored session to refresh"))?;

        // Outside a browser there is no hidden-iframe renewal; only a refresh token works
        let refresh_token = session
            .refresh_token()
            .ok_or_else(|| anyhow!("Stored session has no refresh token"))?
            .to_string();

        let config = self.provider.config();
        let response = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("client_id", config.client_id.as_str()),
                ("refresh_token", refresh_token.as_str()),
            ])
            .await?;

        if response.access_token.as_deref().map_or(true, str::is_empty) {
            return Err(anyhow!("Refresh response did not include an access token"));
        }

        session.apply_refresh(response)?;
        self.persist_session(&session).await?;
        info!(provider = self.provider.name(), "Session refreshed silently");
        Ok(())
    }

    fn signin_redirect(&self, state: &str) -> Result<AuthRedirect> {
        let config = self.provider.config();
        let mut url = Url::parse(&config.metadata.authorization_endpoint)
            .context("Invalid authorization endpoint")?;
        url.query_pairs_mut()
            .append_pair("client_id", &config.client_id)
            .append_pair("redirect_uri", &config.redirect_uri)
            .append_pair("response_type", &config.response_type)
            .append_pair("scope", &config.scope)
            .append_pair("state", state);

        Ok(AuthRedirect {
            url: url.to_string(),
            state: Some(state.to_string()),
            provider: self.provider.name().to_string(),
        })
    }

    fn signout_redirect(&self) -> AuthRedirect {
        AuthRedirect {
            url: self.provider.config().metadata.end_session_endpoint.clone(),
            state: None,
            provider: self.provider.name().to_string(),
        }
    }
}
