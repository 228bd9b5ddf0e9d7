use serde::{Serialize, Serializer};
use serde_json::Value;
use stratus_core::{api::Session, StratusError};

/// The capability section the server publishes granted scopes under
pub const APP_ECOSYSTEM_CAPABILITY: &str = "app_ecosystem_v2";

/// Groups of server APIs an application can ask to be granted. Sent to the
/// server as their numeric ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ApiScope {
    System = 2,
    /// The file base
    Dav = 3,
    UserInfo = 10,
    UserStatus = 11,
    Notifications = 12,
    WeatherStatus = 13,
    FilesSharing = 14,
}

impl Serialize for ApiScope {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(*self as u8)
    }
}

impl ApiScope {
    /// Whether the server has granted this scope, going by the session's
    /// cached capability document. Mostly useful for optional scopes.
    pub async fn is_allowed(self, session: &Session) -> Result<bool, StratusError> {
        Ok(scope_granted(&session.capabilities().await?, self))
    }
}

/// Whether `capabilities` lists `scope` among the scopes granted to this
/// application. Without the app ecosystem section nothing is granted.
pub fn scope_granted(capabilities: &Value, scope: ApiScope) -> bool {
    capabilities
        .get(APP_ECOSYSTEM_CAPABILITY)
        .and_then(|section| section.get("scopes"))
        .and_then(Value::as_array)
        .map(|granted| {
            granted
                .iter()
                .any(|id| id.as_u64() == Some(scope as u64))
        })
        .unwrap_or(false)
}

/// The scopes an application declares at `/scopes`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ApiScopes {
    pub required: Vec<ApiScope>,
    pub optional: Vec<ApiScope>,
}

impl ApiScopes {
    pub fn new(required: &[ApiScope], optional: &[ApiScope]) -> Self {
        ApiScopes {
            required: required.to_vec(),
            optional: optional.to_vec(),
        }
    }
}
