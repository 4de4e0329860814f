//! JSON envelope returned by `POST /upload`

use serde::Serialize;

use super::storage::StoredImage;

pub const SUCCESS_MESSAGE: &str = "File uploaded successfully";
pub const FAILURE_MESSAGE: &str = "An error occurred while processing the file.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UploadResult {
    Success {
        message: String,
        filename: String,
        original_name: String,
        url: String,
        size: usize,
    },
    Error {
        message: String,
    },
}

impl UploadResult {
    pub fn success(stored: &StoredImage, original_name: &str) -> Self {
        Self::Success {
            message: SUCCESS_MESSAGE.to_string(),
            filename: stored.filename.clone(),
            original_name: original_name.to_string(),
            url: stored.url(),
            size: stored.size,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
