use futures::future::join_all;
use serde_json::{json, Value};

use ourroots_auth::auth::AuthState;
use ourroots_auth::config::ProviderKind;
use ourroots_auth::ErrorCode;

use crate::test_harness::{session, TestEnvironment};

#[tokio::test]
async fn test_expired_token_refreshed_once_and_request_retried() {
    let mut env = TestEnvironment::new(ProviderKind::Cognito).await;
    env.store_session(&session(Some("expired"), Some("rt-1"))).await;

    let rejected = env
        .mock_api("GET", "/records/1", "expired", 401, json!({"error": "expired"}), 1)
        .await;
    let refresh = env
        .mock_refresh(
            "rt-1",
            200,
            json!({"access_token": "fresh", "token_type": "Bearer", "expires_in": 3600}),
            1,
        )
        .await;
    let accepted = env
        .mock_api("GET", "/records/1", "fresh", 200, json!({"id": 1, "name": "Census 1850"}), 1)
        .await;

    let record: Value = env.api.get("/records/1", &[]).await.unwrap();
    assert_eq!(record["name"], "Census 1850");

    rejected.assert_async().await;
    refresh.assert_async().await;
    accepted.assert_async().await;

    // The refresh response carried no refresh token, so the old one is kept
    let stored = env.stored_session().await.unwrap();
    assert_eq!(stored.access_token.as_deref(), Some("fresh"));
    assert_eq!(stored.refresh_token.as_deref(), Some("rt-1"));
}

#[tokio::test]
async fn test_concurrent_token_requests_share_one_refresh() {
    let mut env = TestEnvironment::new(ProviderKind::Auth0).await;
    env.store_session(&session(None, Some("rt-1"))).await;

    let refresh = env
        .mock_refresh(
            "rt-1",
            200,
            json!({"access_token": "fresh", "refresh_token": "rt-2", "expires_in": 3600}),
            1,
        )
        .await;

    let tokens = join_all((0..5).map(|_| env.auth.get_access_token())).await;

    for token in tokens {
        assert_eq!(token.unwrap(), "fresh");
    }
    refresh.assert_async().await;
    let stored = env.stored_session().await.unwrap();
    assert_eq!(stored.refresh_token.as_deref(), Some("rt-2"));
}

#[tokio::test]
async fn test_rejected_refresh_ends_session() {
    let mut env = TestEnvironment::new(ProviderKind::Auth0).await;
    env.store_session(&session(Some("expired"), Some("revoked"))).await;
    env.auth.init(None).await;
    assert!(env.auth.store().user_is_logged_in());

    let rejected = env
        .mock_api("PUT", "/records/1", "expired", 401, json!({}), 1)
        .await;
    let refresh = env
        .mock_refresh("revoked", 400, json!({"error": "invalid_grant"}), 1)
        .await;

    let err = env
        .api
        .put::<_, Value>("/records/1", &json!({"name": "x"}))
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::LoginRequired);
    rejected.assert_async().await;
    refresh.assert_async().await;
    assert!(env.stored_session().await.is_none());
    assert!(!env.auth.store().user_is_logged_in());
    assert_eq!(env.auth.store().state(), AuthState::LoggedOut);
}

#[tokio::test]
async fn test_server_errors_retried_for_idempotent_requests() {
    let mut env = TestEnvironment::new(ProviderKind::Cognito).await;
    env.store_session(&session(Some("good"), None)).await;

    let unavailable = env
        .mock_api("GET", "/societies", "good", 503, json!({"error": "busy"}), 4)
        .await;

    let err = env.api.get::<Value>("/societies", &[]).await.unwrap_err();

    assert_eq!(err.status().map(|s| s.as_u16()), Some(503));
    unavailable.assert_async().await;
}

#[tokio::test]
async fn test_post_not_retried_on_server_error() {
    let mut env = TestEnvironment::new(ProviderKind::Cognito).await;
    env.store_session(&session(Some("good"), None)).await;

    let failing = env
        .mock_api("POST", "/posts", "good", 500, json!({}), 1)
        .await;

    let err = env
        .api
        .post::<_, Value>("/posts", &json!({"name": "new"}))
        .await
        .unwrap_err();

    assert_eq!(err.status().map(|s| s.as_u16()), Some(500));
    failing.assert_async().await;
}
