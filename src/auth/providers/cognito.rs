use serde_json::Value;

use super::{
    endpoint, endpoint_with_query, profile_claim, ProviderAdapter, ProviderConfig,
    ProviderMetadata, DEFAULT_SCOPE,
};
use crate::auth::user::StandardizedUser;
use crate::config::AuthConfig;
use crate::error::AuthError;

/// AWS Cognito user pool.
///
/// Cognito does not support `prompt=none`, so a session can only be renewed
/// with a refresh token.
pub struct CognitoProvider {
    config: ProviderConfig,
}

impl CognitoProvider {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let endpoints = &config.auth_endpoint_domain;
        let metadata = ProviderMetadata {
            issuer: config.auth_domain.clone(),
            authorization_endpoint: endpoint(endpoints, "/oauth2/authorize"),
            token_endpoint: endpoint(endpoints, "/oauth2/token"),
            userinfo_endpoint: endpoint(endpoints, "/oauth2/userinfo"),
            jwks_uri: endpoint(&config.auth_domain, "/.well-known/jwks.json"),
            end_session_endpoint: endpoint_with_query(
                endpoints,
                "/logout",
                &[
                    ("client_id", config.client_id.as_str()),
                    ("logout_uri", config.post_logout_redirect_url.as_str()),
                ],
            )?,
        };

        Ok(Self {
            config: ProviderConfig {
                authority: config.auth_domain.clone(),
                client_id: config.client_id.clone(),
                redirect_uri: config.redirect_url.clone(),
                response_type: "code".to_string(),
                scope: DEFAULT_SCOPE.to_string(),
                metadata,
            },
        })
    }
}

impl ProviderAdapter for CognitoProvider {
    fn name(&self) -> &str {
        "cognito"
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn standardize_user(&self, raw_user: &Value) -> StandardizedUser {
        StandardizedUser::new(
            profile_claim(raw_user, "name"),
            profile_claim(raw_user, "email"),
            None,
        )
    }

    fn can_silently_refresh(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;
    use crate::config::ProviderKind;
    use serde_json::json;

    #[test]
    fn test_metadata() {
        let provider = CognitoProvider::new(&sample_config(ProviderKind::Cognito)).unwrap();
        let config = provider.config();

        assert_eq!(config.metadata.issuer, "https://ourroots.auth.example");
        assert_eq!(
            config.metadata.authorization_endpoint,
            "https://login.ourroots.example/oauth2/authorize"
        );
        assert_eq!(
            config.metadata.end_session_endpoint,
            "https://login.ourroots.example/logout?client_id=client-123&logout_uri=http%3A%2F%2Flocalhost%3A8080%2F"
        );
        assert_eq!(config.response_type, "code");
        assert!(!provider.can_silently_refresh());
    }

    #[test]
    fn test_standardize_user() {
        let provider = CognitoProvider::new(&sample_config(ProviderKind::Cognito)).unwrap();
        let user = provider.standardize_user(&json!({
            "profile": { "name": "Jane Doe", "email": "jane@example.org", "picture": "ignored" }
        }));

        assert_eq!(user.name.as_deref(), Some("Jane Doe"));
        assert_eq!(user.email.as_deref(), Some("jane@example.org"));
        assert_eq!(user.picture, None);
    }
}
