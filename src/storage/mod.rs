pub mod local;
pub mod sftp;

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{StorageConfig, StorageKind};

/// Blob-storage errors
#[derive(Debug)]
pub enum StorageError {
    /// Key does not exist in the backend
    NotFound(String),
    /// Backend rejected or failed the operation
    Backend(String),
    /// Local I/O failure
    Io(std::io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound(key) => write!(f, "Blob not found: {}", key),
            StorageError::Backend(msg) => write!(f, "Backend error: {}", msg),
            StorageError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl StdError for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Capability interface over blob storage.
///
/// Implementations are keyed by opaque storage paths; callers never see the
/// backend's own layout.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn download(&self, key: &str) -> Result<Vec<u8>>;
    async fn upload(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// Backend tag recorded on rows that reference this store
    fn storage_type(&self) -> &str;
}

/// Resolves the blob store serving a given account
pub trait StorageProvider: Send + Sync {
    fn for_owner(&self, owner_id: i64) -> Result<Arc<dyn BlobStore>>;
}

/// Single-backend provider driven by server configuration. Every account
/// resolves to the same configured backend.
pub struct ConfigStorageProvider {
    backend: Arc<dyn BlobStore>,
}

impl ConfigStorageProvider {
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let backend: Arc<dyn BlobStore> = match config.kind {
            StorageKind::Local => {
                let root = config.root_dir.clone().ok_or_else(|| {
                    StorageError::Backend("local storage requires root_dir".to_string())
                })?;
                Arc::new(local::LocalDirStore::new(root))
            }
            StorageKind::Sftp => {
                let sftp_config = config.sftp.as_ref().ok_or_else(|| {
                    StorageError::Backend("sftp storage requires [storage.sftp] section".to_string())
                })?;
                let settings = sftp::SftpSettings::from_config(sftp_config)
                    .map_err(StorageError::Backend)?;
                Arc::new(sftp::SftpStore::new(settings))
            }
        };
        Ok(Self { backend })
    }
}

impl StorageProvider for ConfigStorageProvider {
    fn for_owner(&self, _owner_id: i64) -> Result<Arc<dyn BlobStore>> {
        Ok(self.backend.clone())
    }
}
