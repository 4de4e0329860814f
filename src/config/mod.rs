// Configuration module entry point
// Loads the layered configuration and owns the per-process application state

mod state;
mod types;

use std::net::SocketAddr;

pub use state::AppState;
pub use types::{Config, StorageConfig};

/// 5 MiB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 4] = [".jpg", ".jpeg", ".png", ".gif"];

/// Environment variable prefix, e.g. `IMGHOST_SERVER__PORT=9000`
const ENV_PREFIX: &str = "IMGHOST";

impl Config {
    /// Load configuration from `config.toml` in the working directory
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from specified file path (extension optional)
    /// A missing file is not an error; defaults and environment still apply
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("storage.allowed_extensions")
                    .try_parsing(true),
            )
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("storage.static_dir", "static")?
            .set_default("storage.upload_dir", "images")?
            .set_default("storage.max_file_size", DEFAULT_MAX_FILE_SIZE)?
            .set_default(
                "storage.allowed_extensions",
                DEFAULT_ALLOWED_EXTENSIONS.to_vec(),
            )?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("logging.access_log_format", "combined")?
            .set_default("logging.log_dir", "logs")?
            .set_default("logging.log_file", "app.log")?
            .set_default("logging.max_log_size", 1_048_576)? // 1MB
            .set_default("logging.backup_count", 5)?
            .set_default("performance.keep_alive", true)?
            .set_default("performance.request_timeout", 30)?
            .build()?;

        let cfg: Self = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }

    /// Reject settings the upload path cannot work with
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let storage = &self.storage;
        if storage.max_file_size == 0 {
            return Err(config::ConfigError::Message(
                "storage.max_file_size must be greater than zero".to_string(),
            ));
        }
        if storage.allowed_extensions.is_empty() {
            return Err(config::ConfigError::Message(
                "storage.allowed_extensions must not be empty".to_string(),
            ));
        }
        if let Some(ext) = storage
            .allowed_extensions
            .iter()
            .find(|ext| !ext.starts_with('.') || ext.len() < 2)
        {
            return Err(config::ConfigError::Message(format!(
                "storage.allowed_extensions entry '{ext}' must look like '.png'"
            )));
        }
        if !matches!(
            self.logging.access_log_format.as_str(),
            "combined" | "common" | "json"
        ) {
            return Err(config::ConfigError::Message(format!(
                "logging.access_log_format '{}' is not one of combined, common, json",
                self.logging.access_log_format
            )));
        }
        Ok(())
    }
}
