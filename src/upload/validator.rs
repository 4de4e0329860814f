//! Upload validation
//!
//! Enforces the size ceiling and the extension allow-list, in that order.

use std::path::Path;

use thiserror::Error;

use super::multipart::ParsedFilePart;
use crate::config::StorageConfig;

/// Client-side reasons an upload is refused
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("File exceeds the maximum size of {}MB.", mebibytes(.limit))]
    SizeExceeded { declared: u64, limit: u64 },
    #[error("File not found in request")]
    NoFile,
    #[error("Unsupported file format. Allowed: {}", .allowed.join(", "))]
    UnsupportedFormat {
        filename: String,
        allowed: Vec<String>,
    },
    #[error("Malformed multipart request: {0}")]
    Malformed(&'static str),
}

impl Rejection {
    /// Short tag used in log lines
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::SizeExceeded { .. } => "size exceeded",
            Self::NoFile => "no file in request",
            Self::UnsupportedFormat { .. } => "unsupported format",
            Self::Malformed(_) => "malformed request",
        }
    }

    /// Reason plus the client-supplied detail that triggered it
    pub fn log_detail(&self) -> String {
        match self {
            Self::SizeExceeded { declared, limit } => {
                format!("{} ({declared} bytes, limit {limit})", self.reason())
            }
            Self::UnsupportedFormat { filename, .. } => format!("{} ({filename})", self.reason()),
            Self::NoFile => self.reason().to_string(),
            Self::Malformed(what) => format!("{} ({what})", self.reason()),
        }
    }
}

#[allow(clippy::cast_precision_loss, clippy::trivially_copy_pass_by_ref)]
fn mebibytes(bytes: &u64) -> String {
    format!("{:.0}", *bytes as f64 / (1024.0 * 1024.0))
}

/// Size and extension checks built from the storage configuration
#[derive(Debug, Clone)]
pub struct UploadValidator {
    max_file_size: u64,
    allowed_extensions: Vec<String>,
}

impl UploadValidator {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|ext| ext.to_lowercase())
                .collect(),
        }
    }

    pub const fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Early check against the declared `Content-Length`, before the body is read
    pub fn check_declared_size(&self, content_length: u64) -> Result<(), Rejection> {
        if content_length > self.max_file_size {
            return Err(Rejection::SizeExceeded {
                declared: content_length,
                limit: self.max_file_size,
            });
        }
        Ok(())
    }

    /// Check the extension of `filename`, returning it lower-cased with its dot
    pub fn check_extension(&self, filename: &str) -> Result<String, Rejection> {
        let extension = extension_of(filename);
        if self.allowed_extensions.iter().any(|ext| *ext == extension) {
            Ok(extension)
        } else {
            Err(Rejection::UnsupportedFormat {
                filename: filename.to_string(),
                allowed: self.allowed_extensions.clone(),
            })
        }
    }

    /// Run every check in precedence order: size, presence, extension
    pub fn validate(
        &self,
        content_length: u64,
        file: Option<&ParsedFilePart>,
    ) -> Result<String, Rejection> {
        self.check_declared_size(content_length)?;
        let file = file.ok_or(Rejection::NoFile)?;
        self.check_extension(&file.original_filename)
    }
}

/// Lower-cased suffix after the last dot, including the dot
///
/// Empty when there is none. A leading dot alone (".png") is a hidden
/// file name, not an extension.
pub fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> UploadValidator {
        UploadValidator::new(&StorageConfig::default())
    }

    fn file(name: &str) -> ParsedFilePart {
        ParsedFilePart {
            original_filename: name.to_string(),
            content: vec![1, 2, 3],
        }
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("cat.png"), ".png");
        assert_eq!(extension_of("CAT.JPEG"), ".jpeg");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("noext"), "");
        assert_eq!(extension_of(".png"), "");
    }

    #[test]
    fn test_size_limit_is_inclusive() {
        let v = validator();
        assert!(v.check_declared_size(5_242_880).is_ok());
        assert_eq!(
            v.check_declared_size(5_242_881),
            Err(Rejection::SizeExceeded {
                declared: 5_242_881,
                limit: 5_242_880
            })
        );
    }

    #[test]
    fn test_precedence() {
        let v = validator();
        // size wins over a missing file and a bad extension
        assert!(matches!(
            v.validate(10_000_000, Some(&file("a.exe"))),
            Err(Rejection::SizeExceeded { .. })
        ));
        assert_eq!(v.validate(100, None), Err(Rejection::NoFile));
        assert!(matches!(
            v.validate(100, Some(&file("a.exe"))),
            Err(Rejection::UnsupportedFormat { .. })
        ));
        assert_eq!(v.validate(100, Some(&file("a.GIF"))), Ok(".gif".to_string()));
    }

    #[test]
    fn test_messages() {
        let v = validator();
        let err = v.check_extension("doc.pdf").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unsupported file format. Allowed: .jpg, .jpeg, .png, .gif"
        );
        assert_eq!(err.reason(), "unsupported format");
        assert_eq!(err.log_detail(), "unsupported format (doc.pdf)");

        let err = v.check_declared_size(6_000_000).unwrap_err();
        assert_eq!(err.to_string(), "File exceeds the maximum size of 5MB.");
        assert_eq!(Rejection::NoFile.to_string(), "File not found in request");
    }
}
