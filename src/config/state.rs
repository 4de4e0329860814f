// Application state module
// Holds the configuration and the upload components built from it

use std::path::PathBuf;

use super::types::Config;
use crate::upload::{StorageWriter, UploadValidator};

/// Application state shared by every connection
pub struct AppState {
    pub config: Config,
    pub static_root: PathBuf,
    pub upload_root: PathBuf,
    pub validator: UploadValidator,
    pub storage: StorageWriter,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let storage_config = &config.storage;
        Self {
            config: config.clone(),
            static_root: storage_config.static_dir.clone(),
            upload_root: storage_config.upload_dir.clone(),
            validator: UploadValidator::new(storage_config),
            storage: StorageWriter::new(storage_config.upload_dir.clone()),
        }
    }

    pub const fn access_log(&self) -> bool {
        self.config.logging.access_log
    }
}
