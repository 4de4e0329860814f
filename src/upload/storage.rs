//! Upload persistence
//!
//! Every upload is stored under a fresh random name. Bytes go to a hidden
//! temporary file first, which is linked into place only once complete. The
//! temporary file is removed when dropped, so an error, a panic or a
//! cancelled request never leaves a partial image behind.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::task::JoinError;
use uuid::Uuid;

/// Attempts before giving up on finding an unused name
const MAX_NAME_ATTEMPTS: usize = 3;

const TEMP_PREFIX: &str = ".";
const TEMP_SUFFIX: &str = ".part";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to write '{path}': {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("no unused filename after {0} attempts")]
    NameExhausted(usize),
    #[error("storage task did not complete: {0}")]
    Task(#[from] JoinError),
}

/// A successfully stored upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub filename: String,
    pub path: PathBuf,
    pub size: usize,
}

impl StoredImage {
    /// Public URL the image is served under
    pub fn url(&self) -> String {
        format!("/images/{}", self.filename)
    }
}

/// Writes uploads into one directory
#[derive(Debug, Clone)]
pub struct StorageWriter {
    upload_dir: PathBuf,
}

impl StorageWriter {
    pub const fn new(upload_dir: PathBuf) -> Self {
        Self { upload_dir }
    }

    /// Store `content` under a generated name ending in `extension`
    ///
    /// The write runs on the blocking pool and is not interrupted when the
    /// caller is dropped: it either completes or cleans up after itself.
    pub async fn store(&self, content: Vec<u8>, extension: &str) -> Result<StoredImage, StorageError> {
        let upload_dir = self.upload_dir.clone();
        let extension = extension.to_string();
        tokio::task::spawn_blocking(move || store_blocking(&upload_dir, &content, &extension)).await?
    }
}

fn store_blocking(
    upload_dir: &Path,
    content: &[u8],
    extension: &str,
) -> Result<StoredImage, StorageError> {
    for _ in 0..MAX_NAME_ATTEMPTS {
        let filename = generate_filename(extension);
        let path = upload_dir.join(&filename);

        match write_atomically(upload_dir, &path, content) {
            Ok(()) => {
                return Ok(StoredImage {
                    filename,
                    path,
                    size: content.len(),
                })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(source) => return Err(StorageError::Write { path, source }),
        }
    }
    Err(StorageError::NameExhausted(MAX_NAME_ATTEMPTS))
}

/// 32 lowercase hex characters followed by the extension
pub fn generate_filename(extension: &str) -> String {
    format!("{}{extension}", Uuid::new_v4().simple())
}

/// Write into a temporary file in `dir`, then link it to `target`
///
/// Fails with `AlreadyExists` instead of replacing an existing `target`.
fn write_atomically(dir: &Path, target: &Path, content: &[u8]) -> io::Result<()> {
    let mut temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(TEMP_SUFFIX)
        .tempfile_in(dir)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    persist(temp, target)
}

fn persist(temp: NamedTempFile, target: &Path) -> io::Result<()> {
    // on failure the returned handle is dropped here, deleting the temp file
    temp.persist_noclobber(target).map(drop).map_err(|e| e.error)
}
