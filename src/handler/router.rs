//! Request routing dispatch module
//!
//! Entry point for HTTP request processing: dispatches on method and path,
//! then writes the access log line.

use crate::config::AppState;
use crate::handler::{static_files, upload};
use crate::http;
use crate::logger::{self, AccessLogEntry, Level};
use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::{Method, Request, Response, Version};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

pub const UPLOAD_PATH: &str = "/upload";

/// Main entry point for HTTP request handling
///
/// Never fails: every error is turned into a response here so one bad
/// request cannot take the connection task down with it.
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let started = Instant::now();
    let access_log = state.access_log().then(|| {
        let mut entry = AccessLogEntry::new(
            peer_addr.to_string(),
            req.method().to_string(),
            req.uri().path().to_string(),
        );
        entry.http_version = version_label(req.version()).to_string();
        entry.user_agent = req
            .headers()
            .get(hyper::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        entry
    });

    let response = route(req, &state).await;

    if let Some(mut entry) = access_log {
        entry.status = response.status().as_u16();
        entry.body_bytes = response
            .body()
            .size_hint()
            .exact()
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or_default();
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

/// Dispatch on method and path
async fn route<B>(req: Request<B>, state: &AppState) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    match method {
        Method::GET => static_files::serve(&path, state).await,
        Method::POST if path == UPLOAD_PATH => upload::handle_upload(req, state).await,
        Method::POST => {
            logger::log_action(Level::Warn, &format!("unknown POST path: {path}"));
            http::build_404_response()
        }
        Method::OPTIONS => http::build_options_response(),
        _ => {
            logger::log_action(Level::Warn, &format!("method not allowed: {method}"));
            http::build_405_response()
        }
    }
}

fn version_label(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2",
        Version::HTTP_3 => "3",
        _ => "1.1",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use http_body_util::BodyExt;
    use hyper::StatusCode;
    use std::path::Path;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR\x00\x00\x00\x01\r\n";

    struct TestServer {
        _dir: tempfile::TempDir,
        state: Arc<AppState>,
    }

    impl TestServer {
        fn new() -> Self {
            Self::with_limit(5 * 1024 * 1024)
        }

        fn with_limit(max_file_size: u64) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let mut cfg = Config::load_from("does-not-exist/config").unwrap();
            cfg.storage.static_dir = dir.path().join("static");
            cfg.storage.upload_dir = dir.path().join("images");
            cfg.storage.max_file_size = max_file_size;
            cfg.logging.access_log = false;
            std::fs::create_dir_all(&cfg.storage.static_dir).unwrap();
            std::fs::create_dir_all(&cfg.storage.upload_dir).unwrap();
            Self {
                _dir: dir,
                state: Arc::new(AppState::new(&cfg)),
            }
        }

        fn static_dir(&self) -> &Path {
            &self.state.static_root
        }

        async fn send(&self, req: Request<Full<Bytes>>) -> (StatusCode, hyper::HeaderMap, Bytes) {
            let peer: SocketAddr = "127.0.0.1:40000".parse().unwrap();
            let response = handle_request(req, Arc::clone(&self.state), peer)
                .await
                .unwrap();
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.into_body().collect().await.unwrap().to_bytes();
            (status, headers, body)
        }

        async fn get(&self, path: &str) -> (StatusCode, hyper::HeaderMap, Bytes) {
            let req = Request::get(path).body(Full::new(Bytes::new())).unwrap();
            self.send(req).await
        }

        async fn upload(&self, filename: &str, content: &[u8]) -> (StatusCode, serde_json::Value) {
            let body = multipart_body("XYZ", filename, content);
            let req = Request::post(UPLOAD_PATH)
                .header("Content-Type", "multipart/form-data; boundary=XYZ")
                .header("Content-Length", body.len())
                .body(Full::new(Bytes::from(body)))
                .unwrap();
            let (status, _, body) = self.send(req).await;
            (status, serde_json::from_slice(&body).unwrap())
        }
    }

    fn multipart_body(boundary: &str, filename: &str, content: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        body
    }

    fn assert_cors(headers: &hyper::HeaderMap) {
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(headers["access-control-allow-methods"], "GET, POST, OPTIONS");
        assert_eq!(headers["access-control-allow-headers"], "Content-Type");
    }

    #[tokio::test]
    async fn test_upload_round_trip() {
        let server = TestServer::new();

        let (status, json) = server.upload("cat.png", PNG).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "success");
        assert_eq!(json["original_name"], "cat.png");
        assert_eq!(json["size"], PNG.len());

        let filename = json["filename"].as_str().unwrap();
        assert!(filename.ends_with(".png"));
        assert_eq!(json["url"], format!("/images/{filename}"));

        let (status, headers, body) = server.get(json["url"].as_str().unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-type"], "image/png");
        assert_cors(&headers);
        assert_eq!(body.as_ref(), PNG);
    }

    #[tokio::test]
    async fn test_upload_keeps_lowercased_extension() {
        let server = TestServer::new();
        let (status, json) = server.upload("Photo.JPEG", b"jpegdata").await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["filename"].as_str().unwrap().ends_with(".jpeg"));

        let (_, headers, _) = server.get(json["url"].as_str().unwrap()).await;
        assert_eq!(headers["content-type"], "image/jpeg");
    }

    #[tokio::test]
    async fn test_concurrent_uploads_do_not_mix() {
        let server = TestServer::new();
        let ((_, a), (_, b)) = tokio::join!(
            server.upload("a.gif", b"first image"),
            server.upload("b.gif", b"second image"),
        );
        assert_ne!(a["filename"], b["filename"]);

        let (_, _, body_a) = server.get(a["url"].as_str().unwrap()).await;
        let (_, _, body_b) = server.get(b["url"].as_str().unwrap()).await;
        assert_eq!(body_a.as_ref(), b"first image");
        assert_eq!(body_b.as_ref(), b"second image");
    }

    #[tokio::test]
    async fn test_unsupported_extension() {
        let server = TestServer::new();
        let (status, json) = server.upload("notes.txt", b"hello").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["status"], "error");
        assert_eq!(
            json["message"],
            "Unsupported file format. Allowed: .jpg, .jpeg, .png, .gif"
        );
        assert_eq!(std::fs::read_dir(&server.state.upload_root).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_declared_size_rejected_before_body() {
        let server = TestServer::new();
        // the body is tiny and not even multipart: only the header is checked
        let req = Request::post(UPLOAD_PATH)
            .header("Content-Type", "multipart/form-data; boundary=XYZ")
            .header("Content-Length", "5242881")
            .body(Full::new(Bytes::from_static(b"garbage")))
            .unwrap();
        let (status, headers, body) = server.send(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_cors(&headers);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "File exceeds the maximum size of 5MB.");
    }

    #[tokio::test]
    async fn test_actual_size_capped() {
        let server = TestServer::with_limit(64);
        let body = multipart_body("XYZ", "big.png", &[0u8; 128]);
        // under-reported length must not let the body through
        let req = Request::post(UPLOAD_PATH)
            .header("Content-Type", "multipart/form-data; boundary=XYZ")
            .header("Content-Length", "10")
            .body(Full::new(Bytes::from(body)))
            .unwrap();
        let (status, _, _) = server.send(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(std::fs::read_dir(&server.state.upload_root).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_upload_without_file_part() {
        let server = TestServer::new();
        let body = b"--XYZ\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhi\r\n--XYZ--\r\n";
        let req = Request::post(UPLOAD_PATH)
            .header("Content-Type", "multipart/form-data; boundary=XYZ")
            .header("Content-Length", body.len())
            .body(Full::new(Bytes::from_static(body)))
            .unwrap();
        let (status, _, body) = server.send(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "File not found in request");
    }

    #[tokio::test]
    async fn test_upload_without_boundary() {
        let server = TestServer::new();
        let req = Request::post(UPLOAD_PATH)
            .header("Content-Type", "multipart/form-data")
            .body(Full::new(Bytes::from_static(b"x")))
            .unwrap();
        let (status, _, body) = server.send(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "error");
    }

    #[tokio::test]
    async fn test_storage_failure_is_500() {
        let server = TestServer::new();
        std::fs::remove_dir_all(&server.state.upload_root).unwrap();

        logger::capture::start();
        let (status, json) = server.upload("cat.png", PNG).await;
        let lines = logger::capture::finish();

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["status"], "error");
        assert_eq!(
            json["message"],
            crate::upload::result::FAILURE_MESSAGE
        );
        assert!(lines
            .iter()
            .any(|(level, line)| *level == Level::Error && line.starts_with("Action: upload failed")));
    }

    #[tokio::test]
    async fn test_index_and_static_files() {
        let server = TestServer::new();
        std::fs::write(server.static_dir().join("index.html"), "<h1>hi</h1>").unwrap();
        std::fs::create_dir(server.static_dir().join("css")).unwrap();
        std::fs::write(server.static_dir().join("css/site.css"), "body{}").unwrap();

        let (status, headers, body) = server.get("/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-type"], "text/html");
        assert_eq!(body, "<h1>hi</h1>");

        let (status, headers, body) = server.get("/static/css/site.css").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-type"], "text/css");
        assert_eq!(body, "body{}");

        // any other path is static-root relative
        let (status, _, body) = server.get("/css/site.css").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "body{}");
    }

    #[tokio::test]
    async fn test_missing_file_is_404() {
        let server = TestServer::new();
        for path in ["/", "/nope.html", "/images/missing.png", "/static/"] {
            let (status, headers, body) = server.get(path).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
            assert_eq!(body, "404 Not Found");
            assert_cors(&headers);
        }
    }

    #[tokio::test]
    async fn test_traversal_is_404() {
        let server = TestServer::new();
        let outside = server.static_dir().parent().unwrap().join("secret.txt");
        std::fs::write(&outside, "secret").unwrap();

        let (status, _, body) = server.get("/static/../secret.txt").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "404 Not Found");

        let (status, _, _) = server.get("/../secret.txt").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_images_use_last_segment() {
        let server = TestServer::new();
        std::fs::write(server.state.upload_root.join("x.gif"), b"GIF89a").unwrap();

        let (status, headers, body) = server.get("/images/some/dir/x.gif").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-type"], "image/gif");
        assert_eq!(body.as_ref(), b"GIF89a");
    }

    #[tokio::test]
    async fn test_options_and_unknown_routes() {
        let server = TestServer::new();

        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/anything")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let (status, headers, body) = server.send(req).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
        assert_cors(&headers);

        let req = Request::post("/elsewhere")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let (status, headers, body) = server.send(req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "404 Not Found");
        assert_cors(&headers);

        logger::capture::start();
        let req = Request::delete("/").body(Full::new(Bytes::new())).unwrap();
        let (status, _, _) = server.send(req).await;
        let lines = logger::capture::finish();

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert!(lines.contains(&(Level::Warn, "Action: method not allowed: DELETE".to_string())));
    }
}
