use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// The signed-in user as the rest of the application sees it.
///
/// `name`, `email` and `picture` come from the identity provider. Everything the
/// backend adds (numeric id, level, ...) lands in `profile`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardizedUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

impl StandardizedUser {
    pub fn new(name: Option<String>, email: Option<String>, picture: Option<String>) -> Self {
        Self {
            name,
            email,
            picture,
            profile: Map::new(),
        }
    }

    /// Combine the backend's view of the user with the provider projection.
    /// Provider fields win where both are set. Backend fields of an unexpected
    /// type stay in `profile` untouched.
    pub fn merge(backend: Value, provider: StandardizedUser) -> Self {
        let mut profile = match backend {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                warn!(backend = %other, "Backend user is not an object, ignoring it");
                Map::new()
            }
        };

        let name = take_string(&mut profile, "name");
        let email = take_string(&mut profile, "email");
        let picture = take_string(&mut profile, "picture");
        profile.extend(provider.profile);

        Self {
            name: provider.name.or(name),
            email: provider.email.or(email),
            picture: provider.picture.or(picture),
            profile,
        }
    }

    /// Backend user id, or 0 when the user has none yet.
    ///
    /// Accepts a plain number, a numeric string, or the `/users/<n>` form.
    pub fn id(&self) -> u64 {
        match self.profile.get("id") {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
            Some(Value::String(s)) => s
                .trim_start_matches("/users/")
                .parse()
                .unwrap_or(0),
            _ => 0,
        }
    }

    /// Authorization level reported by the backend, if any
    pub fn level(&self) -> Option<AuthLevel> {
        self.profile
            .get("level")
            .and_then(Value::as_u64)
            .and_then(AuthLevel::from_level)
    }
}

/// Society authorization levels, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum AuthLevel {
    Guest = 0,
    Reader = 1,
    Contributor = 2,
    Editor = 3,
    Admin = 4,
}

impl AuthLevel {
    pub const ALL: [AuthLevel; 5] = [
        AuthLevel::Guest,
        AuthLevel::Reader,
        AuthLevel::Contributor,
        AuthLevel::Editor,
        AuthLevel::Admin,
    ];

    pub fn from_level(level: u64) -> Option<Self> {
        Self::ALL.get(usize::try_from(level).ok()?).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            AuthLevel::Guest => "Guest",
            AuthLevel::Reader => "Reader",
            AuthLevel::Contributor => "Contributor",
            AuthLevel::Editor => "Editor",
            AuthLevel::Admin => "Admin",
        }
    }

    /// Levels an administrator may assign to society members
    pub fn options() -> [AuthLevel; 2] {
        [AuthLevel::Editor, AuthLevel::Admin]
    }
}

impl From<AuthLevel> for u8 {
    fn from(level: AuthLevel) -> Self {
        level as u8
    }
}

impl TryFrom<u8> for AuthLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        AuthLevel::from_level(value as u64).ok_or_else(|| format!("unknown auth level {}", value))
    }
}

/// Remove `key` from `profile` if it holds a string. Any other non-null value is left in place.
fn take_string(profile: &mut Map<String, Value>, key: &str) -> Option<String> {
    match profile.remove(key) {
        Some(Value::String(value)) => Some(value),
        Some(Value::Null) | None => None,
        Some(other) => {
            warn!(field = key, "Backend user field is not a string, keeping it in the profile");
            profile.insert(key.to_string(), other);
            None
        }
    }
}

impl fmt::Display for AuthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
