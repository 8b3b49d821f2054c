//! Credential storage backends
//!
//! [`FileSecureStore`] keeps one file per key inside a directory owned by the
//! service. File names are the URL-safe base64 of the key, so identities such
//! as email addresses never have to be sanitized. On unix the files are
//! readable by the owner only.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SecureStore,
};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

const SECRET_EXTENSION: &str = "secret";

/// File-backed secure storage
pub struct FileSecureStore {
    root: PathBuf,
}

impl FileSecureStore {
    /// Open (and create if needed) the store directory.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        debug!(path = %root.display(), "Opened file secure store");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(key.as_bytes()),
            SECRET_EXTENSION
        ))
    }

    fn key_from_path(path: &Path) -> Option<String> {
        if path.extension()?.to_str()? != SECRET_EXTENSION {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let raw = URL_SAFE_NO_PAD.decode(stem).ok()?;
        String::from_utf8(raw).ok()
    }
}

#[async_trait]
impl SecureStore for FileSecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        let staging = path.with_extension("tmp");

        // A leftover staging file would keep its old permissions.
        match tokio::fs::remove_file(&staging).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(BridgeError::Io(e)),
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&staging).await?;
        file.write_all(value).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&staging, &path).await?;

        debug!("Stored secret on disk");
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BridgeError::Io(e)),
        }
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BridgeError::Io(e)),
        }
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut keys = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            match Self::key_from_path(&entry.path()) {
                Some(key) => keys.push(key),
                None => warn!(path = %entry.path().display(), "Ignoring foreign file in secure store"),
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn clear_all(&self) -> Result<()> {
        for key in self.list_keys().await? {
            self.delete_secret(&key).await?;
        }
        Ok(())
    }
}

/// In-memory secure storage. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemorySecureStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecureStore for MemorySecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn clear_all(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecureStore::open(dir.path()).await.unwrap();
        let key = "oauth_tokens:user@example.com";

        assert_eq!(store.get_secret(key).await.unwrap(), None);

        store.set_secret(key, b"{\"token\":1}").await.unwrap();
        assert_eq!(
            store.get_secret(key).await.unwrap(),
            Some(b"{\"token\":1}".to_vec())
        );
        assert!(store.has_secret(key).await.unwrap());

        store.set_secret(key, b"replaced").await.unwrap();
        assert_eq!(store.get_secret(key).await.unwrap(), Some(b"replaced".to_vec()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileSecureStore::open(dir.path()).await.unwrap();
        store.set_secret("oauth_tokens:a@b.c", b"{}").await.unwrap();
        store.set_secret("oauth_tokens:a@b.c", b"{\"v\":2}").await.unwrap();

        let mode = std::fs::metadata(store.path_for("oauth_tokens:a@b.c"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileSecureStore::open(dir.path()).await.unwrap();
            store.set_secret("a/b:c", b"value").await.unwrap();
        }

        let reopened = FileSecureStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.list_keys().await.unwrap(), vec!["a/b:c".to_string()]);
        assert_eq!(
            reopened.get_secret("a/b:c").await.unwrap(),
            Some(b"value".to_vec())
        );
    }

    #[tokio::test]
    async fn test_file_store_delete_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecureStore::open(dir.path().join("nested")).await.unwrap();

        store.set_secret("one", b"1").await.unwrap();
        store.set_secret("two", b"2").await.unwrap();

        store.delete_secret("one").await.unwrap();
        store.delete_secret("one").await.unwrap();
        assert_eq!(store.list_keys().await.unwrap(), vec!["two".to_string()]);

        store.clear_all().await.unwrap();
        assert!(store.list_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemorySecureStore::new();

        store.set_secret("k", b"v").await.unwrap();
        assert_eq!(store.get_secret("k").await.unwrap(), Some(b"v".to_vec()));

        store.delete_secret("k").await.unwrap();
        assert!(!store.has_secret("k").await.unwrap());
    }
}
