use std::sync::Arc;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::auth::user::StandardizedUser;
use crate::config::{AuthConfig, ProviderKind};
use crate::error::AuthError;

pub mod auth0;
pub mod cognito;

pub use auth0::Auth0Provider;
pub use cognito::CognitoProvider;

/// Scope requested from every provider
pub const DEFAULT_SCOPE: &str = "openid profile email";

/// Endpoints of an identity provider. Neither supported provider publishes an
/// end-session endpoint through discovery, so everything is spelled out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    pub end_session_endpoint: String,
}

/// Settings the session manager needs to talk to a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub authority: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: String,
    pub scope: String,
    pub metadata: ProviderMetadata,
}

/// Capabilities that differ between identity providers
pub trait ProviderAdapter: Send + Sync {
    /// Provider name, for logging
    fn name(&self) -> &str;

    fn config(&self) -> &ProviderConfig;

    /// Project the provider's raw user (`{"profile": {...claims}}`) onto a
    /// [`StandardizedUser`]
    fn standardize_user(&self, raw_user: &Value) -> StandardizedUser;

    /// Whether the provider can renew a session without user interaction
    fn can_silently_refresh(&self) -> bool;
}

/// Build the adapter selected by configuration
pub fn create_provider(config: &AuthConfig) -> Result<Arc<dyn ProviderAdapter>, AuthError> {
    let provider: Arc<dyn ProviderAdapter> = match config.provider {
        ProviderKind::Auth0 => Arc::new(Auth0Provider::new(config)?),
        ProviderKind::Cognito => Arc::new(CognitoProvider::new(config)?),
    };
    info!(
        provider = provider.name(),
        silent_refresh = provider.can_silently_refresh(),
        "Identity provider configured"
    );
    Ok(provider)
}

/// `base` + `path` with `params` appended as an encoded query string
pub(crate) fn endpoint_with_query(
    base: &str,
    path: &str,
    params: &[(&str, &str)],
) -> Result<String, AuthError> {
    let mut url = Url::parse(&format!("{}{}", base.trim_end_matches('/'), path)).map_err(|e| {
        AuthError::Config {
            reason: format!("invalid endpoint URL {}{}: {}", base, path, e),
        }
    })?;
    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params.iter().copied());
    }
    Ok(url.to_string())
}

/// `base` + `path` without validation beyond trimming a trailing slash
pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// String claim from a raw user's profile
pub(crate) fn profile_claim(raw_user: &Value, claim: &str) -> Option<String> {
    raw_user
        .get("profile")
        .and_then(|profile| profile.get(claim))
        .and_then(Value::as_str)
        .map(str::to_string)
}
