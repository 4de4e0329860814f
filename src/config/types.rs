// Configuration types module
// Defines all configuration-related data structures

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// Storage configuration: where files are served from and how uploads are accepted
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Root of `/`, `/static/*` and every unmatched GET path
    pub static_dir: PathBuf,
    /// Destination of uploads and root of `/images/*`
    pub upload_dir: PathBuf,
    /// Upload ceiling in bytes
    pub max_file_size: u64,
    /// Lower-cased extensions including the leading dot, in display order
    pub allowed_extensions: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            static_dir: PathBuf::from("static"),
            upload_dir: PathBuf::from("images"),
            max_file_size: super::DEFAULT_MAX_FILE_SIZE,
            allowed_extensions: super::DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common or json)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    pub log_dir: PathBuf,
    pub log_file: String,
    /// Rotate once the log file would grow past this many bytes
    pub max_log_size: u64,
    /// Number of rotated files kept next to the active one
    pub backup_count: u32,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}

impl LoggingConfig {
    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join(&self.log_file)
    }
}

/// Performance configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    pub keep_alive: bool,
    /// Upper bound for a whole connection, in seconds
    pub request_timeout: u64,
    pub max_connections: Option<u64>,
}
