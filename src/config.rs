use serde::Deserialize;
use std::path::{Path, PathBuf};

fn default_api_port() -> u16 {
    3000
}

fn default_segment_minutes() -> i64 {
    30
}

fn default_db_port() -> u16 {
    5432
}

fn default_sftp_port() -> u16 {
    22
}

fn default_ffmpeg_binary() -> String {
    "ffmpeg".to_string()
}

fn default_segmenter_timeout() -> u64 {
    300
}

/// Server configuration file structure (TOML)
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// API server port (default: 3000)
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// PostgreSQL connection settings (maps to [database] section)
    pub database: DatabaseConfig,
    /// Blob storage backend (maps to [storage] section)
    pub storage: StorageConfig,
    /// Fallback segment length in minutes for accounts without a preference
    /// (default: 30)
    #[serde(default = "default_segment_minutes")]
    pub default_segment_minutes: i64,
    /// Segmentation process settings (maps to [segmenter] section)
    #[serde(default)]
    pub segmenter: SegmenterConfig,
}

/// PostgreSQL connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Blobs in a directory on the local filesystem
    Local,
    /// Blobs on a remote host over SFTP
    Sftp,
}

/// Blob storage backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub kind: StorageKind,
    /// Root directory for local storage
    pub root_dir: Option<PathBuf>,
    /// SFTP settings (maps to [storage.sftp] section)
    pub sftp: Option<SftpStorageConfig>,
}

/// SFTP storage settings
#[derive(Debug, Clone, Deserialize)]
pub struct SftpStorageConfig {
    pub host: String,
    #[serde(default = "default_sftp_port")]
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub key_file: Option<PathBuf>,
    /// Remote directory all storage keys are resolved under
    pub remote_dir: String,
}

/// Segmentation process settings
#[derive(Debug, Clone, Deserialize)]
pub struct SegmenterConfig {
    /// ffmpeg binary to invoke (default: "ffmpeg" from PATH)
    #[serde(default = "default_ffmpeg_binary")]
    pub binary: String,
    /// Wall-clock bound on one segmentation run, in seconds (default: 300)
    #[serde(default = "default_segmenter_timeout")]
    pub timeout_seconds: u64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            binary: default_ffmpeg_binary(),
            timeout_seconds: default_segmenter_timeout(),
        }
    }
}

impl ServerConfig {
    /// Read and parse a TOML config file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config '{}': {}", path.display(), e))?;
        let config: ServerConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config '{}': {}", path.display(), e))?;
        Ok(config)
    }

    /// Cross-field checks that serde cannot express
    pub fn validate(&self) -> Result<(), String> {
        match self.storage.kind {
            StorageKind::Local => {
                if self.storage.root_dir.is_none() {
                    return Err("storage kind is 'local' but root_dir is missing".to_string());
                }
            }
            StorageKind::Sftp => {
                let sftp = self
                    .storage
                    .sftp
                    .as_ref()
                    .ok_or_else(|| "storage kind is 'sftp' but [storage.sftp] section is missing".to_string())?;
                if sftp.password.is_none() && sftp.key_file.is_none() {
                    return Err(
                        "[storage.sftp] requires either password or key_file".to_string()
                    );
                }
            }
        }

        if self.default_segment_minutes < 1 {
            return Err("default_segment_minutes must be at least 1".to_string());
        }
        if self.segmenter.timeout_seconds == 0 {
            return Err("segmenter timeout_seconds must be positive".to_string());
        }

        Ok(())
    }
}
