use anyhow::{anyhow, Context, Result};
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::user::StandardizedUser;

/// Storage key prefix used for persisted sessions
pub const SESSION_KEY_PREFIX: &str = "oidc.user";

/// Key under which the session for one authority/client pair is persisted
pub fn session_storage_key(authority: &str, client_id: &str) -> String {
    format!("{}:{}:{}", SESSION_KEY_PREFIX, authority, client_id)
}

/// Tokens and profile held for the signed-in user.
///
/// The shape mirrors what the identity provider hands back from a sign-in or
/// refresh, and it is persisted as an opaque JSON blob. Expiry is informational
/// only: nothing checks it before use, an expired token is discovered by the
/// backend answering 401.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Claims from the id token
    #[serde(default)]
    pub profile: Map<String, Value>,
    /// Unix timestamp (seconds) at which the access token expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl Session {
    /// Build a session from a token endpoint response
    pub fn from_token_response(response: TokenResponse) -> Result<Self> {
        let profile = match &response.id_token {
            Some(id_token) => decode_id_token_claims(id_token)?,
            None => Map::new(),
        };

        Ok(Self {
            id_token: response.id_token,
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            token_type: response.token_type,
            scope: response.scope,
            profile,
            expires_at: response
                .expires_in
                .map(|secs| Utc::now().timestamp() + secs as i64),
        })
    }

    /// Apply a refresh response. Fields the response leaves out keep their old values.
    pub fn apply_refresh(&mut self, response: TokenResponse) -> Result<()> {
        if let Some(id_token) = response.id_token {
            self.profile = decode_id_token_claims(&id_token)?;
            self.id_token = Some(id_token);
        }
        self.access_token = response.access_token;
        if response.refresh_token.is_some() {
            self.refresh_token = response.refresh_token;
        }
        if response.token_type.is_some() {
            self.token_type = response.token_type;
        }
        if response.scope.is_some() {
            self.scope = response.scope;
        }
        self.expires_at = response
            .expires_in
            .map(|secs| Utc::now().timestamp() + secs as i64);
        Ok(())
    }

    /// Access token, if one is present and non-empty
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Refresh token, if one is present and non-empty
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expires_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }

    pub fn is_expired(&self) -> bool {
        self.expiration().is_some_and(|exp| exp <= Utc::now())
    }

    /// The raw user as the provider adapters see it
    pub fn raw_user(&self) -> Value {
        serde_json::json!({ "profile": Value::Object(self.profile.clone()) })
    }
}

/// Token endpoint response body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Decode the payload of a JWT. The signature is not checked here; the backend
/// validates tokens on every request.
pub fn decode_id_token_claims(id_token: &str) -> Result<Map<String, Value>> {
    let mut parts = id_token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_)) => payload,
        _ => return Err(anyhow!("id token is not a JWT")),
    };

    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .context("Invalid id token payload encoding")?;

    match serde_json::from_slice(&bytes).context("Invalid id token payload JSON")? {
        Value::Object(claims) => Ok(claims),
        _ => Err(anyhow!("id token payload is not a JSON object")),
    }
}

/// Lifecycle of the signed-in session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthState {
    /// `init` has not run
    Unloaded,
    /// The stored session is being read and verified
    Loading,
    LoggedOut,
    LoggedIn,
    /// A silent refresh is in flight
    Refreshing,
}

impl AuthState {
    pub fn is_logged_in(&self) -> bool {
        matches!(self, AuthState::LoggedIn)
    }
}

/// Session changes published to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    StateChanged { from: AuthState, to: AuthState },
    /// The current user was replaced. `None` means signed out.
    UserChanged { user: Option<StandardizedUser> },
    RefreshSucceeded,
    /// A refresh failed and the session was cleared
    RefreshFailed { reason: String },
}
