use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::storage::{BlobStore, Result, StorageError};

/// Directory-backed blob store. Keys are relative paths under a root
/// directory; parent directories are created on demand.
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a key under the root. Absolute keys and keys containing
    /// parent-dir components must not escape the root.
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let path = Path::new(key);
        let escapes = path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
        if key.is_empty() || path.is_absolute() || escapes {
            return Err(StorageError::Backend(format!("invalid storage key: {}", key)));
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl BlobStore for LocalDirStore {
    async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    async fn upload(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write-then-rename so a reader never observes a partial blob
        let temp_path = PathBuf::from(format!("{}.tmpupload", path.display()));
        tokio::fs::write(&temp_path, bytes).await?;
        if let Err(err) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(err));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    fn storage_type(&self) -> &str {
        "local"
    }
}
