use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// The closed set of configuration keys understood by the
/// [super::CredentialResolver]. Names are matched case-insensitively and
/// always rendered in upper case.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, AsRefStr, EnumString, EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ConfigKey {
    /// Base URL of the server
    NextcloudUrl,
    NcAuthUser,
    NcAuthPass,
    AppId,
    AppSecret,
    AppVersion,
    /// Version of the application-ecosystem protocol spoken by the server
    AeVersion,
    DavUrlSuffix,
    /// `true`, `false` or a path to a PEM CA bundle
    NcVerifyTls,
    /// Seconds; `0` or `none` disables the timeout
    NcTimeout,
    NcTimeoutDav,
    AppHost,
    AppPort,
    AppPersistentStorage,
}

impl ConfigKey {
    /// Look up a key by its (case-insensitive) name
    pub fn from_name(name: &str) -> Option<ConfigKey> {
        name.trim().to_ascii_uppercase().parse().ok()
    }

    /// The keys that, when present, mean the process runs as a registered
    /// external application
    pub fn application_keys() -> [ConfigKey; 3] {
        [ConfigKey::AppId, ConfigKey::AppSecret, ConfigKey::AppVersion]
    }
}
