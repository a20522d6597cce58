use ssh2::{Session, Sftp};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::config::SftpStorageConfig;
use crate::storage::{BlobStore, Result, StorageError};

/// Authentication method for the SFTP backend
#[derive(Debug, Clone)]
pub enum SftpAuth {
    /// Password-based authentication
    Password(String),
    /// Public key authentication with private key file
    KeyFile(PathBuf),
}

/// Connection settings for the SFTP backend
#[derive(Debug, Clone)]
pub struct SftpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: SftpAuth,
    /// Remote directory all storage keys are resolved under
    pub remote_dir: String,
}

impl SftpSettings {
    /// Build settings from the `[storage.sftp]` config section. Exactly one
    /// of password / key_file must be configured.
    pub fn from_config(config: &SftpStorageConfig) -> std::result::Result<Self, String> {
        let auth = match (&config.password, &config.key_file) {
            (Some(password), None) => SftpAuth::Password(password.clone()),
            (None, Some(key_file)) => SftpAuth::KeyFile(key_file.clone()),
            (Some(_), Some(_)) => {
                return Err("sftp storage: configure either password or key_file, not both".to_string())
            }
            (None, None) => {
                return Err("sftp storage: either password or key_file is required".to_string())
            }
        };

        Ok(Self {
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            auth,
            remote_dir: config.remote_dir.clone(),
        })
    }
}

/// SFTP-backed blob store for deployments keeping audio on a remote host.
///
/// ssh2 is blocking, so every operation opens its own session inside
/// `spawn_blocking`. Recordings are personal-scale; connection reuse is not
/// worth the shared-session bookkeeping.
pub struct SftpStore {
    settings: SftpSettings,
}

impl SftpStore {
    pub fn new(settings: SftpSettings) -> Self {
        Self { settings }
    }

    fn remote_path(settings: &SftpSettings, key: &str) -> PathBuf {
        Path::new(&settings.remote_dir).join(key)
    }
}

fn ssh_err(err: ssh2::Error) -> StorageError {
    StorageError::Backend(format!("ssh2: {}", err))
}

/// One connected session; lives only inside a blocking closure
struct SftpSession {
    sftp: Sftp,
    _session: Session,
}

impl SftpSession {
    fn connect(settings: &SftpSettings) -> Result<Self> {
        let addr = format!("{}:{}", settings.host, settings.port);
        let tcp = TcpStream::connect(&addr)
            .map_err(|e| StorageError::Backend(format!("Failed to connect to {}: {}", addr, e)))?;

        let mut session = Session::new().map_err(ssh_err)?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(ssh_err)?;

        match &settings.auth {
            SftpAuth::Password(password) => {
                session
                    .userauth_password(&settings.username, password)
                    .map_err(|e| {
                        StorageError::Backend(format!(
                            "Password authentication failed for user '{}': {}",
                            settings.username, e
                        ))
                    })?;
            }
            SftpAuth::KeyFile(key_path) => {
                session
                    .userauth_pubkey_file(&settings.username, None, key_path, None)
                    .map_err(|e| {
                        StorageError::Backend(format!(
                            "Key-based authentication failed for user '{}' with key '{}': {}",
                            settings.username,
                            key_path.display(),
                            e
                        ))
                    })?;
            }
        }

        if !session.authenticated() {
            return Err(StorageError::Backend(
                "Authentication failed (session not authenticated)".to_string(),
            ));
        }

        let sftp = session.sftp().map_err(ssh_err)?;
        Ok(Self {
            sftp,
            _session: session,
        })
    }

    /// Create a directory recursively, similar to `mkdir -p`
    fn mkdir_p(&self, path: &Path) -> Result<()> {
        let mut current = PathBuf::new();
        for component in path.components() {
            current.push(component);
            if self.sftp.mkdir(&current, 0o755).is_err() {
                match self.sftp.stat(&current) {
                    Ok(stat) if stat.is_dir() => {}
                    Ok(_) => {
                        return Err(StorageError::Backend(format!(
                            "'{}' exists but is not a directory",
                            current.display()
                        )))
                    }
                    Err(e) => {
                        return Err(StorageError::Backend(format!(
                            "Failed to create directory '{}': {}",
                            current.display(),
                            e
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    /// Upload to a temp name, verify size, then rename into place so a
    /// reader never observes a partial blob.
    fn upload(&self, remote_path: &Path, bytes: &[u8]) -> Result<()> {
        let temp_path = PathBuf::from(format!("{}.tmpupload", remote_path.display()));

        if let Some(parent) = temp_path.parent() {
            if !parent.as_os_str().is_empty() {
                self.mkdir_p(parent)?;
            }
        }

        let mut remote_file = self.sftp.create(&temp_path).map_err(|e| {
            StorageError::Backend(format!(
                "Failed to create remote file '{}': {}",
                temp_path.display(),
                e
            ))
        })?;
        remote_file.write_all(bytes).map_err(|e| {
            StorageError::Backend(format!(
                "Failed to write remote file '{}': {}",
                temp_path.display(),
                e
            ))
        })?;
        remote_file.flush().map_err(|e| {
            StorageError::Backend(format!(
                "Failed to flush remote file '{}': {}",
                temp_path.display(),
                e
            ))
        })?;
        drop(remote_file);

        let stat = self.sftp.stat(&temp_path).map_err(ssh_err)?;
        let remote_size = stat.size.unwrap_or(0);
        if remote_size != bytes.len() as u64 {
            let _ = self.sftp.unlink(&temp_path);
            return Err(StorageError::Backend(format!(
                "Size mismatch after upload: expected {} bytes, got {}",
                bytes.len(),
                remote_size
            )));
        }

        self.sftp.rename(&temp_path, remote_path, None).map_err(|e| {
            StorageError::Backend(format!(
                "Failed to rename temp file to '{}': {}",
                remote_path.display(),
                e
            ))
        })
    }

    fn download(&self, remote_path: &Path) -> Result<Vec<u8>> {
        let mut remote_file = self
            .sftp
            .open(remote_path)
            .map_err(|_| StorageError::NotFound(remote_path.display().to_string()))?;
        let mut buffer = Vec::new();
        remote_file.read_to_end(&mut buffer).map_err(|e| {
            StorageError::Backend(format!(
                "Failed to read remote file '{}': {}",
                remote_path.display(),
                e
            ))
        })?;
        Ok(buffer)
    }

    fn remove(&self, remote_path: &Path) -> Result<()> {
        self.sftp.unlink(remote_path).map_err(|e| {
            StorageError::Backend(format!(
                "Failed to remove remote file '{}': {}",
                remote_path.display(),
                e
            ))
        })
    }
}

fn join_err(err: tokio::task::JoinError) -> StorageError {
    StorageError::Backend(format!("sftp task failed: {}", err))
}

#[async_trait]
impl BlobStore for SftpStore {
    async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let settings = self.settings.clone();
        let path = Self::remote_path(&settings, key);
        tokio::task::spawn_blocking(move || {
            let session = SftpSession::connect(&settings)?;
            session.download(&path)
        })
        .await
        .map_err(join_err)?
    }

    async fn upload(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<()> {
        let settings = self.settings.clone();
        let path = Self::remote_path(&settings, key);
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || {
            let session = SftpSession::connect(&settings)?;
            session.upload(&path, &bytes)
        })
        .await
        .map_err(join_err)?
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let settings = self.settings.clone();
        let path = Self::remote_path(&settings, key);
        tokio::task::spawn_blocking(move || {
            let session = SftpSession::connect(&settings)?;
            session.remove(&path)
        })
        .await
        .map_err(join_err)?
    }

    fn storage_type(&self) -> &str {
        "sftp"
    }
}
