mod serve;
mod sign;

pub use serve::*;
pub use sign::*;

use std::path::{Path, PathBuf};

use anyhow::Result;
use stratus_core::config::CredentialResolver;

const DEFAULT_ENV_FILE: &str = ".env";

/// The environment, layered over an explicit env file or a `.env` in the
/// working directory if there is one
pub fn resolver(env_file: Option<&Path>) -> Result<CredentialResolver> {
    let resolver = CredentialResolver::new().with_process_env();
    Ok(match env_file {
        Some(path) => resolver.with_env_file(path)?,
        None => resolver.with_optional_env_file(&PathBuf::from(DEFAULT_ENV_FILE))?,
    })
}
