use std::path::PathBuf;

use thiserror::Error;

use super::ConfigKey;

/// Raised while building a [super::Configuration]. These are fatal: nothing
/// about the environment will change by asking again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Both basic credentials and application credentials are configured; only one set may be present")]
    ConflictingCredentials,

    #[error("No credentials configured")]
    NoCredentials,

    #[error("Missing configuration: {0}")]
    Missing(ConfigKey),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: ConfigKey, reason: String },

    #[error("The {0} value cannot be sent as an HTTP header")]
    InvalidHeaderValue(&'static str),

    #[error("Unable to read environment file {path:?}: {reason}")]
    EnvFile { path: PathBuf, reason: String },
}
