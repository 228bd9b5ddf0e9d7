use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

use super::{
    AppIdentity, AppServerSettings, ConfigKey, Configuration, ConfigurationError, Credentials,
    Timeouts, TlsVerification, DAV_TIMEOUT_FACTOR, DEFAULT_AE_VERSION, DEFAULT_DAV_URL_SUFFIX,
    DEFAULT_TIMEOUT,
};

pub const DEFAULT_APP_HOST: &str = "127.0.0.1";

/// Layers explicit values, environment variables and a `.env` style file
/// into a single [Configuration]. Earlier layers win: explicit, then
/// environment, then file, then defaults. An empty value is treated as if
/// the key were absent.
#[derive(Clone, Debug, Default)]
pub struct CredentialResolver {
    explicit: HashMap<ConfigKey, String>,
    environment: HashMap<ConfigKey, String>,
    file: HashMap<ConfigKey, String>,
}

impl CredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: ConfigKey, value: &str) -> Self {
        self.explicit.insert(key, value.to_string());
        self
    }

    /// Add environment variables; names that are not [ConfigKey]s are ignored
    pub fn with_env_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (name, value) in vars {
            if let Some(key) = ConfigKey::from_name(name.as_ref()) {
                self.environment.insert(key, value.into());
            }
        }
        self
    }

    pub fn with_process_env(self) -> Self {
        self.with_env_vars(std::env::vars())
    }

    /// Read a dotenv file without touching the process environment
    pub fn with_env_file(mut self, path: &Path) -> Result<Self, ConfigurationError> {
        let env_file_error = |reason: String| ConfigurationError::EnvFile {
            path: path.to_path_buf(),
            reason,
        };

        let entries = dotenvy::from_path_iter(path).map_err(|error| env_file_error(error.to_string()))?;

        for entry in entries {
            let (name, value) = entry.map_err(|error| env_file_error(error.to_string()))?;
            if let Some(key) = ConfigKey::from_name(&name) {
                self.file.insert(key, value);
            }
        }

        Ok(self)
    }

    /// Like [CredentialResolver::with_env_file], but a missing file is not an
    /// error
    pub fn with_optional_env_file(self, path: &Path) -> Result<Self, ConfigurationError> {
        if path.exists() {
            self.with_env_file(path)
        } else {
            debug!("No environment file at {}", path.display());
            Ok(self)
        }
    }

    /// The effective value for a key across all layers
    pub fn lookup(&self, key: ConfigKey) -> Option<&str> {
        [&self.explicit, &self.environment, &self.file]
            .into_iter()
            .filter_map(|layer| layer.get(&key))
            .map(|value| value.trim())
            .find(|value| !value.is_empty())
    }

    fn require(&self, key: ConfigKey) -> Result<&str, ConfigurationError> {
        self.lookup(key).ok_or(ConfigurationError::Missing(key))
    }

    pub fn resolve(&self) -> Result<Configuration, ConfigurationError> {
        let base_url = self.require(ConfigKey::NextcloudUrl)?;

        let app_present = ConfigKey::application_keys().map(|key| self.lookup(key).is_some());
        let app_any = app_present.iter().any(|present| *present);
        let app_full = app_present.iter().all(|present| *present);
        let basic_full = self.lookup(ConfigKey::NcAuthUser).is_some()
            && self.lookup(ConfigKey::NcAuthPass).is_some();

        let credentials = if basic_full && app_full {
            return Err(ConfigurationError::ConflictingCredentials);
        } else if app_any {
            let identity = AppIdentity::new(
                self.require(ConfigKey::AppId)?,
                self.require(ConfigKey::AppVersion)?,
                self.require(ConfigKey::AppSecret)?,
            )
            .with_ae_version(
                self.lookup(ConfigKey::AeVersion)
                    .unwrap_or(DEFAULT_AE_VERSION),
            );
            Credentials::AppToken(identity)
        } else if basic_full {
            Credentials::basic(
                self.require(ConfigKey::NcAuthUser)?,
                self.require(ConfigKey::NcAuthPass)?,
            )
        } else {
            return Err(ConfigurationError::NoCredentials);
        };

        let configuration = Configuration::new(base_url, credentials)?
            .with_dav_url_suffix(
                self.lookup(ConfigKey::DavUrlSuffix)
                    .unwrap_or(DEFAULT_DAV_URL_SUFFIX),
            )
            .with_verify_tls(self.verify_tls()?)
            .with_timeouts(self.timeouts()?);

        debug!(
            "Resolved configuration for {} ({} mode)",
            configuration.base_url(),
            configuration.auth_mode()
        );

        Ok(configuration)
    }

    /// Host and port for the external application's own HTTP server
    pub fn resolve_app_server(&self) -> Result<AppServerSettings, ConfigurationError> {
        let host = self
            .lookup(ConfigKey::AppHost)
            .unwrap_or(DEFAULT_APP_HOST)
            .to_string();
        let port = self
            .lookup(ConfigKey::AppPort)
            .map(|port| {
                port.parse::<u16>()
                    .map_err(|error| ConfigurationError::Invalid {
                        key: ConfigKey::AppPort,
                        reason: error.to_string(),
                    })
            })
            .transpose()?;

        Ok(AppServerSettings { host, port })
    }

    fn verify_tls(&self) -> Result<TlsVerification, ConfigurationError> {
        let Some(value) = self.lookup(ConfigKey::NcVerifyTls) else {
            return Ok(TlsVerification::Enabled);
        };

        Ok(match value.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => TlsVerification::Enabled,
            "false" | "0" | "no" | "off" => TlsVerification::Disabled,
            _ => {
                let path = PathBuf::from(value);
                if !path.is_file() {
                    return Err(ConfigurationError::Invalid {
                        key: ConfigKey::NcVerifyTls,
                        reason: format!("expected true, false or a CA bundle path, got {value:?}"),
                    });
                }
                TlsVerification::CaBundle(path)
            }
        })
    }

    fn timeouts(&self) -> Result<Timeouts, ConfigurationError> {
        let http = match self.lookup(ConfigKey::NcTimeout) {
            Some(value) => parse_timeout(ConfigKey::NcTimeout, value)?,
            None => Some(DEFAULT_TIMEOUT),
        };

        let dav = match self.lookup(ConfigKey::NcTimeoutDav) {
            Some(value) => parse_timeout(ConfigKey::NcTimeoutDav, value)?,
            None => match http {
                Some(timeout) => Some(timeout.checked_mul(DAV_TIMEOUT_FACTOR).ok_or_else(
                    || ConfigurationError::Invalid {
                        key: ConfigKey::NcTimeout,
                        reason: format!(
                            "too large to derive {} from",
                            ConfigKey::NcTimeoutDav
                        ),
                    },
                )?),
                None => None,
            },
        };

        Ok(Timeouts { http, dav })
    }
}

/// Seconds (fractions allowed); `0` or `none` means no timeout
fn parse_timeout(key: ConfigKey, value: &str) -> Result<Option<Duration>, ConfigurationError> {
    if value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }

    let invalid = || ConfigurationError::Invalid {
        key,
        reason: format!("expected a number of seconds or \"none\", got {value:?}"),
    };

    let seconds = value.parse::<f64>().map_err(|_| invalid())?;
    if seconds == 0.0 {
        return Ok(None);
    }

    Duration::try_from_secs_f64(seconds)
        .map(Some)
        .map_err(|_| invalid())
}
