//! Authenticated request pipeline.
//!
//! Every request to the backend carries a bearer token. A 401 triggers one
//! token refresh and one retry; idempotent requests are additionally retried on
//! network failures and 5xx responses.

use std::sync::Arc;

use async_trait::async_trait;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderValue, Method, StatusCode};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use crate::auth::client::CurrentUserSource;
use crate::common::retry::{retry_if, RetryPolicy};
use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};

/// Supplies bearer tokens to the pipeline
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Current token, refreshing first if there is none
    async fn access_token(&self) -> Result<String>;

    /// A renewed token, or [`AuthError::LoginRequired`]
    async fn refresh_access_token(&self) -> Result<String>;
}

/// A pre-issued token that cannot be renewed
#[derive(Debug, Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String> {
        if self.token.is_empty() {
            return Err(AuthError::LoginRequired);
        }
        Ok(self.token.clone())
    }

    async fn refresh_access_token(&self) -> Result<String> {
        Err(AuthError::LoginRequired)
    }
}

/// Client for the backend REST API
pub struct ApiClient {
    base_url: String,
    tokens: Arc<dyn TokenSource>,
    transport: Arc<dyn HttpTransport>,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
            transport,
            retry: RetryPolicy::default(),
        }
    }

    /// Client over reqwest using the configured base URL, timeout and retry count
    pub fn from_config(config: &AuthConfig, tokens: Arc<dyn TokenSource>) -> Result<Self> {
        let transport = ReqwestTransport::new(config.request_timeout())?;
        Ok(Self::new(config.api_base_url.clone(), tokens, Arc::new(transport))
            .with_retry_policy(RetryPolicy::default().with_max_retries(config.max_retries)))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for `path`. Absolute URLs pass through untouched; they only
    /// carry the user's token when they point at the backend origin.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    /// Whether `url` has the same scheme, host and port as the base URL
    pub fn is_backend_url(&self, url: &str) -> bool {
        match (Url::parse(&self.base_url), Url::parse(url)) {
            (Ok(base), Ok(target)) => base.origin() == target.origin(),
            _ => false,
        }
    }

    /// Request builder for `path` relative to the base URL
    pub fn build(&self, method: Method, path: &str) -> ApiRequest {
        ApiRequest::new(method, self.url(path))
    }

    /// Send `request` with a bearer token, refreshing and retrying once on 401.
    ///
    /// A caller-supplied `Authorization` header is sent as is. Requests to
    /// another origin are sent without a token and never trigger a refresh.
    /// Non-2xx responses come back as [`AuthError::Status`].
    pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse> {
        let span = info_span!(
            "api_request",
            request_id = %Uuid::new_v4(),
            method = %request.method,
            url = %request.url
        );

        async move {
            if !self.is_backend_url(&request.url) {
                debug!("Request leaves the backend origin, sending it without a token");
                return self.send(&request, None).await?.error_for_status();
            }

            let token = self.tokens.access_token().await?;
            let response = self.send(&request, Some(&token)).await?;
            if response.status != StatusCode::UNAUTHORIZED {
                return response.error_for_status();
            }

            debug!("Request unauthorized, refreshing token");
            let token = self.tokens.refresh_access_token().await?;
            let response = self.send(&request, Some(&token)).await?;
            if response.status == StatusCode::UNAUTHORIZED {
                warn!("Request still unauthorized after refresh");
            }
            response.error_for_status()
        }
        .instrument(span)
        .await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let mut request = self.build(Method::GET, path);
        for (key, value) in query {
            request = request.query(*key, *value);
        }
        self.request(request).await?.json()
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let request = self.build(Method::POST, path).json(body)?;
        self.request(request).await?.json()
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let request = self.build(Method::PUT, path).json(body)?;
        self.request(request).await?.json()
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.request(self.build(Method::DELETE, path)).await?;
        Ok(())
    }

    /// The signed-in user's backend profile
    pub async fn current_user(&self) -> Result<Value> {
        self.get("currentuser", &[]).await
    }

    async fn send(&self, request: &ApiRequest, token: Option<&str>) -> Result<ApiResponse> {
        let mut request = request.clone();
        if let Some(token) = token {
            if !request.headers.contains_key(AUTHORIZATION) {
                let value = HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|_| AuthError::LoginRequired)?;
                request.headers.insert(AUTHORIZATION, value);
            }
        }
        let json = HeaderValue::from_static("application/json");
        request.headers.entry(ACCEPT).or_insert_with(|| json.clone());
        request.headers.entry(CONTENT_TYPE).or_insert(json);

        if !request.is_idempotent() {
            return self.transport.send(&request).await;
        }

        let response = retry_if(
            &self.retry,
            "API request",
            || send_once(self.transport.as_ref(), &request),
            |err: &AuthError| err.category().is_retryable(),
        )
        .await;

        // A 5xx that survived every retry is still a response to the caller
        match response {
            Err(AuthError::Status { status, body }) => Ok(ApiResponse::new(status, body)),
            other => other,
        }
    }
}

/// One attempt, with 5xx responses surfaced as errors so they can be retried
async fn send_once(transport: &dyn HttpTransport, request: &ApiRequest) -> Result<ApiResponse> {
    let response = transport.send(request).await?;
    if response.status.is_server_error() {
        return Err(AuthError::Status {
            status: response.status,
            body: response.text(),
        });
    }
    Ok(response)
}

#[async_trait]
impl CurrentUserSource for ApiClient {
    async fn current_user(&self) -> Result<Value> {
        ApiClient::current_user(self).await
    }
}
