//! Integration test harness.
//! Runs the real OIDC session manager and reqwest transport against a mockito server
//! that plays both the identity provider and the backend API.

use std::sync::Arc;

use base64::Engine as _;
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::{json, Value};

use ourroots_auth::auth::session::session_storage_key;
use ourroots_auth::auth::{
    create_provider, AuthClient, MemoryStorage, OidcSessionManager, Session, SessionStorage,
    SessionStore,
};
use ourroots_auth::common::RetryPolicy;
use ourroots_auth::config::{AuthConfig, ProviderKind};
use ourroots_auth::transport::ReqwestTransport;
use ourroots_auth::ApiClient;

/// Everything a test needs, wired to one mock server
pub struct TestEnvironment {
    pub server: ServerGuard,
    pub config: AuthConfig,
    pub storage: Arc<MemoryStorage>,
    pub auth: Arc<AuthClient>,
    pub api: ApiClient,
}

impl TestEnvironment {
    pub async fn new(provider: ProviderKind) -> Self {
        let server = mockito::Server::new_async().await;
        let config = test_config(&server.url(), provider);

        let storage = Arc::new(MemoryStorage::new());
        let provider = create_provider(&config).expect("provider");
        let sessions = OidcSessionManager::new(
            Arc::clone(&provider),
            storage.clone(),
            config.request_timeout(),
        )
        .expect("session manager");
        let auth = Arc::new(AuthClient::new(
            provider,
            Arc::new(sessions),
            storage.clone(),
            Arc::new(SessionStore::new()),
        ));

        let transport = ReqwestTransport::new(config.request_timeout()).expect("transport");
        let api = ApiClient::new(config.api_base_url.clone(), auth.clone(), Arc::new(transport))
            .with_retry_policy(RetryPolicy::immediate(3));

        Self {
            server,
            config,
            storage,
            auth,
            api,
        }
    }

    pub fn session_key(&self) -> String {
        session_storage_key(&self.config.auth_domain, &self.config.client_id)
    }

    /// Put a session into storage as if a previous run had signed in
    pub async fn store_session(&self, session: &Session) {
        let raw = serde_json::to_string(session).expect("session json");
        self.storage
            .set_item(&self.session_key(), &raw)
            .await
            .expect("store session");
    }

    pub async fn stored_session(&self) -> Option<Session> {
        self.storage
            .get_item(&self.session_key())
            .await
            .expect("read session")
            .map(|raw| serde_json::from_str(&raw).expect("session json"))
    }

    /// Token endpoint answering a refresh-token grant for `refresh_token`,
    /// expected to be hit exactly `hits` times
    pub async fn mock_refresh(
        &mut self,
        refresh_token: &str,
        status: usize,
        body: Value,
        hits: usize,
    ) -> Mock {
        let path = match self.config.provider {
            ProviderKind::Auth0 => "/oauth/token",
            ProviderKind::Cognito => "/oauth2/token",
        };
        self.server
            .mock("POST", path)
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), refresh_token.into()),
                Matcher::UrlEncoded("client_id".into(), self.config.client_id.clone()),
            ]))
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .expect(hits)
            .create_async()
            .await
    }

    /// Backend endpoint answering requests that carry `token`
    pub async fn mock_api(
        &mut self,
        method: &str,
        path: &str,
        token: &str,
        status: usize,
        body: Value,
        hits: usize,
    ) -> Mock {
        self.server
            .mock(method, format!("/api{}", path).as_str())
            .match_header("authorization", format!("Bearer {}", token).as_str())
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .expect(hits)
            .create_async()
            .await
    }
}

pub fn test_config(server_url: &str, provider: ProviderKind) -> AuthConfig {
    let provider = provider.to_string();
    let api_base = format!("{}/api", server_url);
    AuthConfig::from_lookup(|key| {
        let value = match key {
            "OURROOTS_AUTH_PROVIDER" => provider.as_str(),
            "OURROOTS_AUTH_DOMAIN" => server_url,
            "OURROOTS_AUTH_ENDPOINT_DOMAIN" => server_url,
            "OURROOTS_AUTH_CLIENT_ID" => "integration-client",
            "OURROOTS_AUTH_REDIRECT_URL" => "http://localhost:8080/callback",
            "OURROOTS_AUTH_POST_LOGOUT_REDIRECT_URL" => "http://localhost:8080/",
            "OURROOTS_API_BASE_URL" => api_base.as_str(),
            "OURROOTS_SESSION_STORAGE" => "session",
            "OURROOTS_REQUEST_TIMEOUT_SECS" => "5",
            _ => return None,
        };
        Some(value.to_string())
    })
    .expect("test config")
}

/// Unsigned JWT carrying `claims`
pub fn id_token(claims: Value) -> String {
    let encode = |v: &[u8]| base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(v);
    format!(
        "{}.{}.signature",
        encode(br#"{"alg":"RS256","typ":"JWT"}"#),
        encode(claims.to_string().as_bytes())
    )
}

pub fn session(access_token: Option<&str>, refresh_token: Option<&str>) -> Session {
    let id_token = id_token(json!({
        "sub": "auth0|42",
        "nickname": "jane",
        "name": "jane@example.org",
        "email": "jane@example.org"
    }));
    let mut session = Session {
        access_token: access_token.map(str::to_string),
        refresh_token: refresh_token.map(str::to_string),
        token_type: Some("Bearer".to_string()),
        ..Default::default()
    };
    session.profile = ourroots_auth::auth::session::decode_id_token_claims(&id_token)
        .expect("claims");
    session.id_token = Some(id_token);
    session
}
