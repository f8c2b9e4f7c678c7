use serde_json::Value;

use super::{
    endpoint, endpoint_with_query, profile_claim, ProviderAdapter, ProviderConfig,
    ProviderMetadata, DEFAULT_SCOPE,
};
use crate::auth::user::StandardizedUser;
use crate::config::AuthConfig;
use crate::error::AuthError;

/// Auth0 tenant
pub struct Auth0Provider {
    config: ProviderConfig,
}

impl Auth0Provider {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let endpoints = &config.auth_endpoint_domain;
        let metadata = ProviderMetadata {
            issuer: format!("{}/", config.auth_domain.trim_end_matches('/')),
            authorization_endpoint: endpoint(endpoints, "/authorize"),
            token_endpoint: endpoint(endpoints, "/oauth/token"),
            userinfo_endpoint: endpoint(endpoints, "/userinfo"),
            jwks_uri: endpoint(&config.auth_domain, "/.well-known/jwks.json"),
            end_session_endpoint: endpoint_with_query(
                endpoints,
                "/v2/logout",
                &[("returnTo", config.post_logout_redirect_url.as_str())],
            )?,
        };

        Ok(Self {
            config: ProviderConfig {
                authority: config.auth_domain.clone(),
                client_id: config.client_id.clone(),
                redirect_uri: config.redirect_url.clone(),
                response_type: "id_token token".to_string(),
                scope: DEFAULT_SCOPE.to_string(),
                metadata,
            },
        })
    }
}

impl ProviderAdapter for Auth0Provider {
    fn name(&self) -> &str {
        "auth0"
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    // Auth0 puts the login email in `name` and the display name in `nickname`
    fn standardize_user(&self, raw_user: &Value) -> StandardizedUser {
        StandardizedUser::new(
            profile_claim(raw_user, "nickname"),
            profile_claim(raw_user, "name"),
            profile_claim(raw_user, "picture"),
        )
    }

    fn can_silently_refresh(&self) -> bool {
        true
    }
}
