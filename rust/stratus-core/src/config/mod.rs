//! Resolution and validation of the settings a session runs with.
//!
//! A [Configuration] is built once, either directly or through the
//! [CredentialResolver], and never changes afterwards. It holds exactly one
//! set of [Credentials]: the [AuthMode] is a property of the record, not a
//! runtime toggle.

mod error;
mod key;
mod resolver;

pub use error::*;
pub use key::*;
pub use resolver::*;

use std::{fmt::Debug, path::PathBuf, time::Duration};

use http::HeaderValue;
use strum_macros::Display;
use url::Url;

pub const DEFAULT_DAV_URL_SUFFIX: &str = "/remote.php/dav";
pub const DEFAULT_AE_VERSION: &str = "1.0.0";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(50);
/// File transfers get this many times the plain HTTP timeout by default
pub const DAV_TIMEOUT_FACTOR: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthMode {
    Basic,
    AppToken,
}

/// The identity of a registered external application, including the secret
/// it shares with the server.
#[derive(Clone, PartialEq, Eq)]
pub struct AppIdentity {
    pub app_id: String,
    pub app_version: String,
    pub ae_version: String,
    secret: Vec<u8>,
}

impl AppIdentity {
    pub fn new(app_id: &str, app_version: &str, app_secret: &str) -> Self {
        AppIdentity {
            app_id: app_id.into(),
            app_version: app_version.into(),
            ae_version: DEFAULT_AE_VERSION.into(),
            secret: app_secret.as_bytes().to_vec(),
        }
    }

    pub fn with_ae_version(mut self, ae_version: &str) -> Self {
        self.ae_version = ae_version.into();
        self
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }
}

impl Debug for AppIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppIdentity")
            .field("app_id", &self.app_id)
            .field("app_version", &self.app_version)
            .field("ae_version", &self.ae_version)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic { user: String, password: String },
    AppToken(AppIdentity),
}

impl Credentials {
    pub fn basic(user: &str, password: &str) -> Self {
        Credentials::Basic {
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn auth_mode(&self) -> AuthMode {
        match self {
            Credentials::Basic { .. } => AuthMode::Basic,
            Credentials::AppToken(_) => AuthMode::AppToken,
        }
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        let fields: Vec<(ConfigKey, &str)> = match self {
            Credentials::Basic { user, password } => vec![
                (ConfigKey::NcAuthUser, user.as_str()),
                (ConfigKey::NcAuthPass, password.as_str()),
            ],
            Credentials::AppToken(identity) => {
                if identity.secret.is_empty() {
                    return Err(ConfigurationError::Missing(ConfigKey::AppSecret));
                }
                vec![
                    (ConfigKey::AppId, identity.app_id.as_str()),
                    (ConfigKey::AppVersion, identity.app_version.as_str()),
                    (ConfigKey::AeVersion, identity.ae_version.as_str()),
                ]
            }
        };

        for (key, value) in fields {
            if value.is_empty() {
                return Err(ConfigurationError::Missing(key));
            }
            if key != ConfigKey::NcAuthPass && HeaderValue::from_str(value).is_err() {
                return Err(ConfigurationError::Invalid {
                    key,
                    reason: "value contains characters that cannot be sent in a header".into(),
                });
            }
        }

        Ok(())
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Basic { user, .. } => f
                .debug_struct("Basic")
                .field("user", user)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::AppToken(identity) => f.debug_tuple("AppToken").field(identity).finish(),
        }
    }
}

/// How the server's certificate is checked
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TlsVerification {
    #[default]
    Enabled,
    /// For local development against self-signed certificates only
    Disabled,
    /// Verify against the PEM bundle at this path
    CaBundle(PathBuf),
}

impl TlsVerification {
    pub fn is_disabled(&self) -> bool {
        matches!(self, TlsVerification::Disabled)
    }
}

impl std::fmt::Display for TlsVerification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsVerification::Enabled => write!(f, "enabled"),
            TlsVerification::Disabled => write!(f, "disabled"),
            TlsVerification::CaBundle(path) => write!(f, "ca-bundle:{}", path.display()),
        }
    }
}

/// Request timeouts; `None` waits forever, which is only sensible while
/// debugging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    pub http: Option<Duration>,
    pub dav: Option<Duration>,
}

impl Timeouts {
    pub fn disabled() -> Self {
        Timeouts {
            http: None,
            dav: None,
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            http: Some(DEFAULT_TIMEOUT),
            dav: Some(DEFAULT_TIMEOUT * DAV_TIMEOUT_FACTOR),
        }
    }
}

/// Where the external application's HTTP server binds
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppServerSettings {
    pub host: String,
    pub port: Option<u16>,
}

/// The immutable record every session is built from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Configuration {
    base_url: String,
    dav_url_suffix: String,
    credentials: Credentials,
    verify_tls: TlsVerification,
    timeouts: Timeouts,
}

impl Configuration {
    pub fn new(base_url: &str, credentials: Credentials) -> Result<Self, ConfigurationError> {
        credentials.validate()?;

        Ok(Configuration {
            base_url: normalize_base_url(base_url)?,
            dav_url_suffix: DEFAULT_DAV_URL_SUFFIX.into(),
            credentials,
            verify_tls: TlsVerification::default(),
            timeouts: Timeouts::default(),
        })
    }

    /// Resolve a configuration from the process environment alone
    pub fn from_env() -> Result<Self, ConfigurationError> {
        CredentialResolver::new().with_process_env().resolve()
    }

    pub fn with_verify_tls(mut self, verify_tls: TlsVerification) -> Self {
        self.verify_tls = verify_tls;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_dav_url_suffix(mut self, suffix: &str) -> Self {
        let suffix = suffix.trim_end_matches('/');
        self.dav_url_suffix = if suffix.starts_with('/') {
            suffix.to_string()
        } else {
            format!("/{suffix}")
        };
        self
    }

    /// The server's base URL, never with a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn dav_url_suffix(&self) -> &str {
        &self.dav_url_suffix
    }

    pub fn dav_endpoint(&self) -> String {
        format!("{}{}", self.base_url, self.dav_url_suffix)
    }

    pub fn auth_mode(&self) -> AuthMode {
        self.credentials.auth_mode()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// The basic-credentials user; `None` in application mode
    pub fn user(&self) -> Option<&str> {
        match &self.credentials {
            Credentials::Basic { user, .. } => Some(user),
            Credentials::AppToken(_) => None,
        }
    }

    pub fn password(&self) -> Option<&str> {
        match &self.credentials {
            Credentials::Basic { password, .. } => Some(password),
            Credentials::AppToken(_) => None,
        }
    }

    /// The application identity; `None` in basic mode
    pub fn app_identity(&self) -> Option<&AppIdentity> {
        match &self.credentials {
            Credentials::AppToken(identity) => Some(identity),
            Credentials::Basic { .. } => None,
        }
    }

    pub fn verify_tls(&self) -> &TlsVerification {
        &self.verify_tls
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }
}

/// Strip any trailing `/index.php` and slashes so paths can be appended
/// verbatim.
pub fn normalize_base_url(base_url: &str) -> Result<String, ConfigurationError> {
    let trimmed = base_url.trim().trim_end_matches('/');
    let trimmed = trimmed
        .strip_suffix("/index.php")
        .unwrap_or(trimmed)
        .trim_end_matches('/');

    if trimmed.is_empty() {
        return Err(ConfigurationError::Missing(ConfigKey::NextcloudUrl));
    }

    let url = Url::parse(trimmed).map_err(|error| ConfigurationError::Invalid {
        key: ConfigKey::NextcloudUrl,
        reason: error.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        scheme => Err(ConfigurationError::Invalid {
            key: ConfigKey::NextcloudUrl,
            reason: format!("unsupported scheme {scheme:?}"),
        }),
    }
}
