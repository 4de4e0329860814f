//! Startup directory creation
//!
//! The request path only needs the directories to exist; creating them is
//! done once here before the listener opens.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Error)]
#[error("failed to create directory '{path}': {source}")]
pub struct BootstrapError {
    path: PathBuf,
    source: io::Error,
}

/// Create the upload, static and log directories if missing
pub fn ensure_directories(config: &Config) -> Result<(), BootstrapError> {
    [
        config.storage.upload_dir.as_path(),
        config.storage.static_dir.as_path(),
        config.logging.log_dir.as_path(),
    ]
    .into_iter()
    .try_for_each(create_dir)
}

fn create_dir(path: &Path) -> Result<(), BootstrapError> {
    std::fs::create_dir_all(path).map_err(|source| BootstrapError {
        path: path.to_path_buf(),
        source,
    })
}
