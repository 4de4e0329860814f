//! Static file and stored image serving
//!
//! Maps GET paths onto the static root or the upload directory, confines the
//! result to that root and answers with the file bytes.

use std::io;
use std::path::{Path, PathBuf};

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::Response;
use tokio::fs;

use crate::config::AppState;
use crate::http::{self, mime};
use crate::logger::{self, Level};

const STATIC_PREFIX: &str = "/static/";
const IMAGES_PREFIX: &str = "/images/";
const INDEX_FILE: &str = "index.html";

/// Which root a GET path resolves under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Static,
    Image,
}

/// A GET path mapped onto a root directory
#[derive(Debug, PartialEq, Eq)]
pub struct Resolved<'a> {
    pub origin: Origin,
    pub root: &'a Path,
    pub relative: PathBuf,
}

/// Map a request path onto its root directory
///
/// Image paths keep only their final `/`-separated segment.
pub fn resolve<'a>(path: &str, static_root: &'a Path, upload_root: &'a Path) -> Resolved<'a> {
    if path == "/" {
        return Resolved {
            origin: Origin::Static,
            root: static_root,
            relative: PathBuf::from(INDEX_FILE),
        };
    }
    if let Some(rest) = path.strip_prefix(IMAGES_PREFIX) {
        let name = rest.rsplit('/').next().unwrap_or_default();
        return Resolved {
            origin: Origin::Image,
            root: upload_root,
            relative: PathBuf::from(name),
        };
    }
    let relative = path
        .strip_prefix(STATIC_PREFIX)
        .unwrap_or_else(|| path.trim_start_matches('/'));
    Resolved {
        origin: Origin::Static,
        root: static_root,
        relative: PathBuf::from(relative),
    }
}

/// Why a resolved path could not be served
#[derive(Debug)]
pub enum Lookup {
    NotFound,
    Escaped(PathBuf),
    Unreadable(io::Error),
}

/// Canonicalize `root/relative`, check it stays under `root` and read it
pub async fn load_confined(root: &Path, relative: &Path) -> Result<(Vec<u8>, PathBuf), Lookup> {
    let root_canonical = fs::canonicalize(root).await.map_err(|e| {
        logger::log_warning(&format!(
            "Directory not found or inaccessible '{}': {e}",
            root.display()
        ));
        Lookup::NotFound
    })?;

    // File not found is common (404), no need to log at warning level
    let file_canonical = fs::canonicalize(root.join(relative))
        .await
        .map_err(|_| Lookup::NotFound)?;
    if !file_canonical.starts_with(&root_canonical) {
        return Err(Lookup::Escaped(file_canonical));
    }

    let metadata = fs::metadata(&file_canonical)
        .await
        .map_err(|_| Lookup::NotFound)?;
    if !metadata.is_file() {
        return Err(Lookup::NotFound);
    }

    let content = fs::read(&file_canonical).await.map_err(Lookup::Unreadable)?;
    Ok((content, file_canonical))
}

/// Serve a GET request
pub async fn serve(path: &str, state: &AppState) -> Response<Full<Bytes>> {
    let resolved = resolve(path, &state.static_root, &state.upload_root);

    match load_confined(resolved.root, &resolved.relative).await {
        Ok((content, file_path)) => {
            let content_type = mime::content_type_for(&file_path);
            match resolved.origin {
                Origin::Image => logger::log_action(Level::Info, &format!("served image: {path}")),
                Origin::Static => {
                    logger::log_action(Level::Info, &format!("served static file: {path}"));
                }
            }
            http::build_file_response(content, content_type)
        }
        Err(Lookup::NotFound) => {
            logger::log_action(Level::Warn, &format!("file not found: {path}"));
            http::build_404_response()
        }
        Err(Lookup::Escaped(target)) => {
            logger::log_action(
                Level::Warn,
                &format!(
                    "path traversal blocked: {path} -> {}",
                    target.display()
                ),
            );
            http::build_404_response()
        }
        Err(Lookup::Unreadable(e)) => {
            logger::log_action(
                Level::Error,
                &format!(
                    "failed to read {}: {e}",
                    resolved.root.join(&resolved.relative).display()
                ),
            );
            http::build_500_response()
        }
    }
}
