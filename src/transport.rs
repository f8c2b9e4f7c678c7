use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{AuthError, Result};

/// One outbound HTTP request
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Add a header. Invalid names or values are rejected.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| AuthError::Config {
            reason: format!("invalid header name {:?}: {}", name, e),
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| AuthError::Config {
            reason: format!("invalid value for header {}: {}", name, e),
        })?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Serialize `body` as the JSON request body
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let encoded = serde_json::to_vec(body).map_err(|e| AuthError::Config {
            reason: format!("failed to encode request body: {}", e),
        })?;
        self.body = Some(Bytes::from(encoded));
        Ok(self)
    }

    /// Whether repeating the request has the same effect as sending it once
    pub fn is_idempotent(&self) -> bool {
        matches!(
            self.method,
            Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS
        )
    }
}

/// A response that arrived, whatever its status
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parse the body as JSON. An empty body parses as JSON `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let body: &[u8] = if self.body.is_empty() { b"null" } else { &self.body };
        serde_json::from_slice(body)
            .map_err(|e| AuthError::decode(format!("invalid JSON response: {}", e)))
    }

    /// Turn a non-2xx response into [`AuthError::Status`]
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(AuthError::Status {
                status: self.status,
                body: self.text(),
            })
        }
    }
}

/// Sends requests. An `Err` means no response was received at all.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

/// [`HttpTransport`] over reqwest
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AuthError::transport(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| AuthError::transport(format!("failed to read response body: {}", e)))?;

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotent_methods() {
        assert!(ApiRequest::new(Method::GET, "/a").is_idempotent());
        assert!(ApiRequest::new(Method::PUT, "/a").is_idempotent());
        assert!(ApiRequest::new(Method::DELETE, "/a").is_idempotent());
        assert!(!ApiRequest::new(Method::POST, "/a").is_idempotent());
        assert!(!ApiRequest::new(Method::PATCH, "/a").is_idempotent());
    }

    #[test]
    fn test_response_helpers() {
        let ok = ApiResponse::new(StatusCode::OK, "{\"id\": 3}");
        let value: serde_json::Value = ok.json().unwrap();
        assert_eq!(value["id"], 3);

        let empty = ApiResponse::new(StatusCode::NO_CONTENT, Bytes::new());
        assert_eq!(empty.json::<serde_json::Value>().unwrap(), serde_json::Value::Null);

        let garbled = ApiResponse::new(StatusCode::OK, "<html>");
        let err = garbled.json::<serde_json::Value>().unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::DecodeFailed);
        assert!(!err.category().is_retryable());

        let conflict = ApiResponse::new(StatusCode::CONFLICT, "stale");
        let err = conflict.error_for_status().unwrap_err();
        assert!(err.is_edit_conflict());
    }

    #[test]
    fn test_invalid_header_rejected() {
        assert!(ApiRequest::new(Method::GET, "/a").header("bad header", "x").is_err());
        let request = ApiRequest::new(Method::GET, "/a")
            .header("X-Society", "12")
            .unwrap();
        assert_eq!(request.headers["x-society"], "12");
    }
}
