use std::path::PathBuf;

use directories::BaseDirs;
use stratus_core::config::{ConfigKey, CredentialResolver};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("APP_ID is required to derive a storage directory")]
    MissingAppId,

    #[error("No cache directory is available for this platform")]
    NoCacheDirectory,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A directory that survives application updates: `APP_PERSISTENT_STORAGE`
/// if set, otherwise `<platform cache dir>/<APP_ID>`. The directory is
/// created if needed.
pub fn persistent_storage() -> Result<PathBuf, StorageError> {
    persistent_storage_from(&CredentialResolver::new().with_process_env())
}

pub fn persistent_storage_from(resolver: &CredentialResolver) -> Result<PathBuf, StorageError> {
    let path = match resolver.lookup(ConfigKey::AppPersistentStorage) {
        Some(path) => PathBuf::from(path),
        None => {
            let app_id = resolver
                .lookup(ConfigKey::AppId)
                .ok_or(StorageError::MissingAppId)?;
            let base_dirs = BaseDirs::new().ok_or(StorageError::NoCacheDirectory)?;
            base_dirs.cache_dir().join(app_id)
        }
    };

    std::fs::create_dir_all(&path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_prefers_the_configured_directory() -> anyhow::Result<()> {
        let root = tempfile::TempDir::new()?;
        let configured = root.path().join("persistent");

        let resolver = CredentialResolver::new()
            .with_value(ConfigKey::AppId, "skeleton")
            .with_value(ConfigKey::AppPersistentStorage, &configured.to_string_lossy());

        assert_eq!(persistent_storage_from(&resolver)?, configured);
        assert!(configured.is_dir());

        Ok(())
    }

    #[test]
    fn it_needs_an_app_id_without_a_configured_directory() {
        assert!(matches!(
            persistent_storage_from(&CredentialResolver::new()),
            Err(StorageError::MissingAppId)
        ));
    }
}
