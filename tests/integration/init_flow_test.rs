use mockito::Matcher;
use serde_json::json;

use ourroots_auth::auth::{
    create_provider, AuthLevel, AuthState, IdentitySessionManager, OidcSessionManager,
    SessionStorage, CAN_REFRESH_KEY,
};
use ourroots_auth::config::ProviderKind;

use crate::test_harness::{id_token, session, TestEnvironment};

#[tokio::test]
async fn test_restored_session_verified_against_backend() {
    let mut env = TestEnvironment::new(ProviderKind::Auth0).await;
    env.store_session(&session(Some("good"), Some("rt-1"))).await;

    let current_user = env
        .mock_api(
            "GET",
            "/currentuser",
            "good",
            200,
            json!({"id": "/users/7", "level": 4, "name": "backend name"}),
            1,
        )
        .await;

    env.auth.init(Some(&env.api)).await;

    assert!(env.auth.is_loaded().await);
    current_user.assert_async().await;
    let user = env.auth.store().current_user().unwrap();
    assert_eq!(user.name.as_deref(), Some("jane"));
    assert_eq!(user.email.as_deref(), Some("jane@example.org"));
    assert_eq!(user.level(), Some(AuthLevel::Admin));
    assert_eq!(env.auth.store().user_id(), 7);
    assert_eq!(env.auth.store().state(), AuthState::LoggedIn);
}

#[tokio::test]
async fn test_rejected_session_discarded_on_init() {
    let mut env = TestEnvironment::new(ProviderKind::Cognito).await;
    env.store_session(&session(Some("revoked"), None)).await;

    let current_user = env
        .mock_api("GET", "/currentuser", "revoked", 401, json!({}), 1)
        .await;

    env.auth.init(Some(&env.api)).await;

    assert!(env.auth.loaded());
    current_user.assert_async().await;
    assert!(!env.auth.store().user_is_logged_in());
    assert_eq!(env.auth.store().state(), AuthState::LoggedOut);
    assert!(env.stored_session().await.is_none());
    assert!(env.storage.is_empty());
}

#[tokio::test]
async fn test_init_without_session_skips_backend() {
    let mut env = TestEnvironment::new(ProviderKind::Auth0).await;
    env.storage.set_item(CAN_REFRESH_KEY, "true").await.unwrap();

    let current_user = env
        .mock_api("GET", "/currentuser", "anything", 200, json!({}), 0)
        .await;

    env.auth.init(Some(&env.api)).await;

    assert!(env.auth.is_loaded().await);
    current_user.assert_async().await;
    assert_eq!(env.auth.store().state(), AuthState::LoggedOut);
    // A stale flag must not outlive the session it described
    assert!(env.storage.is_empty());
}

#[tokio::test]
async fn test_code_exchange_completes_login() {
    let mut env = TestEnvironment::new(ProviderKind::Cognito).await;
    let provider = create_provider(&env.config).unwrap();
    let sessions =
        OidcSessionManager::new(provider, env.storage.clone(), env.config.request_timeout())
            .unwrap();

    let token = env
        .server
        .mock("POST", "/oauth2/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("code".into(), "code-xyz".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "access_token": "first",
                "refresh_token": "rt-1",
                "id_token": id_token(json!({"name": "Jane Doe", "email": "jane@example.org"})),
                "token_type": "Bearer",
                "expires_in": 3600
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let session = sessions.exchange_code("code-xyz").await.unwrap();
    let user = env.auth.complete_login(session).await.unwrap();

    token.assert_async().await;
    assert_eq!(user.name.as_deref(), Some("Jane Doe"));
    assert!(env.auth.store().user_is_logged_in());
    assert_eq!(env.auth.get_access_token().await.unwrap(), "first");
    assert_eq!(
        sessions.get_session().await.unwrap().unwrap().refresh_token.as_deref(),
        Some("rt-1")
    );
    // Cognito cannot renew silently, so no capability flag is recorded
    assert_eq!(env.storage.get_item(CAN_REFRESH_KEY).await.unwrap(), None);

    let signout = env.auth.logout().await;
    assert!(signout.url.contains("/logout?client_id=integration-client"));
    assert!(env.storage.is_empty());
    assert!(!env.auth.store().user_is_logged_in());
}
