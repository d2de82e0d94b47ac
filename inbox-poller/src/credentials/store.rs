//! Credential persistence.
//!
//! The session persists every renewed or re-acquired credential through a
//! [`CredentialStore`]. Stores are single-writer: one session owns one store.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::debug;

use super::error::StorageError;
use super::types::Credential;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the persisted credential, `None` if nothing was saved yet.
    async fn load(&self) -> Result<Option<Credential>, StorageError>;

    /// Replace the persisted credential entirely.
    async fn save(&self, credential: &Credential) -> Result<(), StorageError>;
}

/// JSON token file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<Credential>, StorageError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StorageError::Io {
                    op: "reading",
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let credential =
            serde_json::from_str(&content).map_err(|source| StorageError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        debug!(path = %self.path.display(), "Loaded persisted credential");
        Ok(Some(credential))
    }

    async fn save(&self, credential: &Credential) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(credential)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomically(&path, json.as_bytes()))
            .await
            .map_err(|e| StorageError::Io {
                op: "writing",
                path: self.path.clone(),
                source: std::io::Error::other(e),
            })??;

        debug!(path = %self.path.display(), "Credential persisted");
        Ok(())
    }
}

/// Write into a temp file next to `path`, then rename it over `path`.
fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let io_err = |op: &'static str| {
        let path = path.to_path_buf();
        move |source| StorageError::Io { op, path, source }
    };

    std::fs::create_dir_all(&parent).map_err(io_err("creating directory for"))?;

    let mut temp = NamedTempFile::new_in(&parent).map_err(io_err("creating temp file for"))?;
    restrict_permissions(temp.as_file()).map_err(io_err("setting permissions on"))?;
    temp.write_all(contents).map_err(io_err("writing"))?;
    temp.as_file().sync_all().map_err(io_err("syncing"))?;

    temp.persist(path).map_err(|e| StorageError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(file: &std::fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &std::fs::File) -> std::io::Result<()> {
    Ok(())
}

/// In-process store for tests and embedders.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credential: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            credential: Mutex::new(Some(credential)),
        }
    }

    /// Current value without going through the async trait.
    pub fn snapshot(&self) -> Option<Credential> {
        self.credential.lock().clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<Credential>, StorageError> {
        Ok(self.credential.lock().clone())
    }

    async fn save(&self, credential: &Credential) -> Result<(), StorageError> {
        *self.credential.lock() = Some(credential.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    use super::*;

    fn credential() -> Credential {
        Credential::new("access")
            .with_refresh_token("refresh")
            .with_expiry(Utc::now() + Duration::hours(1))
            .with_scopes(vec!["scope".to_string()])
    }

    #[tokio::test]
    async fn test_file_store_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FileCredentialStore::new(dir.path().join("token.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = FileCredentialStore::new(dir.path().join("nested").join("token.json"));

        let first = credential();
        store.save(&first).await.unwrap();
        let second = Credential::new("other");
        store.save(&second).await.unwrap();

        assert_eq!(store.load().await.unwrap(), Some(second));

        // Only the target remains; temp files were renamed away.
        let entries = std::fs::read_dir(dir.path().join("nested")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        FileCredentialStore::new(&path).save(&credential()).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = FileCredentialStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_file_store_save_failure_leaves_previous_value() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        let store = FileCredentialStore::new(&path);
        store.save(&credential()).await.unwrap();

        // A directory in place of the parent makes the write fail.
        let blocked = FileCredentialStore::new(path.join("token.json"));
        assert!(blocked.save(&Credential::new("x")).await.is_err());

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.token, "access");
        assert_eq!(loaded.refresh_token.as_deref(), Some("refresh"));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryCredentialStore::new();
        assert!(store.load().await.unwrap().is_none());
        store.save(&Credential::new("a")).await.unwrap();
        assert_eq!(store.snapshot().map(|c| c.token), Some("a".to_string()));
    }
}
