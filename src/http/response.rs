//! HTTP response building module
//!
//! Every response leaves through one of these builders so the cross-origin
//! headers are always present.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE,
};
use hyper::http::response::Builder;
use hyper::{Response, StatusCode};
use serde::Serialize;

pub const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";

const ALLOWED_ORIGIN: &str = "*";
const ALLOWED_HEADERS: &str = "Content-Type";
const FALLBACK_BODY: &str = "500 Internal Server Error";

/// Response builder preloaded with the permissive CORS headers
fn cors_builder(status: StatusCode) -> Builder {
    Response::builder()
        .status(status)
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, ALLOWED_ORIGIN)
        .header(ACCESS_CONTROL_ALLOW_METHODS, ALLOWED_METHODS)
        .header(ACCESS_CONTROL_ALLOW_HEADERS, ALLOWED_HEADERS)
}

/// Plain-text 500 assembled without the fallible builder
///
/// Used when a builder rejects its input; only static header values are set.
fn fallback_response(what: &str, error: &hyper::http::Error) -> Response<Full<Bytes>> {
    crate::logger::log_error(&format!("Failed to build {what} response: {error}"));

    let mut response = Response::new(Full::new(Bytes::from_static(FALLBACK_BODY.as_bytes())));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static(ALLOWED_ORIGIN));
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOWED_METHODS));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOWED_HEADERS));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

fn build_plain_text(status: StatusCode, text: &'static str) -> Response<Full<Bytes>> {
    cors_builder(status)
        .header("Content-Type", "text/plain")
        .header("Content-Length", text.len())
        .body(Full::new(Bytes::from_static(text.as_bytes())))
        .unwrap_or_else(|e| fallback_response(status.as_str(), &e))
}

/// Build 200 response carrying a file's bytes
pub fn build_file_response(data: Vec<u8>, content_type: &str) -> Response<Full<Bytes>> {
    let content_length = data.len();
    cors_builder(StatusCode::OK)
        .header("Content-Type", content_type)
        .header("Content-Length", content_length)
        .body(Full::new(Bytes::from(data)))
        .unwrap_or_else(|e| fallback_response("file", &e))
}

/// Build 404 Not Found response
pub fn build_404_response() -> Response<Full<Bytes>> {
    build_plain_text(StatusCode::NOT_FOUND, "404 Not Found")
}

/// Build 405 Method Not Allowed response
pub fn build_405_response() -> Response<Full<Bytes>> {
    let mut response = build_plain_text(StatusCode::METHOD_NOT_ALLOWED, "405 Method Not Allowed");
    response.headers_mut().insert(
        hyper::header::ALLOW,
        hyper::header::HeaderValue::from_static(ALLOWED_METHODS),
    );
    response
}

/// Build 500 Internal Server Error response
pub fn build_500_response() -> Response<Full<Bytes>> {
    build_plain_text(StatusCode::INTERNAL_SERVER_ERROR, FALLBACK_BODY)
}

/// Build OPTIONS response (preflight request)
pub fn build_options_response() -> Response<Full<Bytes>> {
    cors_builder(StatusCode::OK)
        .header("Content-Length", 0)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|e| fallback_response("OPTIONS", &e))
}

/// Build JSON response
pub fn build_json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = match serde_json::to_vec(body) {
        Ok(j) => j,
        Err(e) => {
            crate::logger::log_error(&format!("Failed to serialize response: {e}"));
            return build_500_response();
        }
    };

    cors_builder(status)
        .header("Content-Type", "application/json")
        .header("Content-Length", json.len())
        .body(Full::new(Bytes::from(json)))
        .unwrap_or_else(|e| fallback_response(status.as_str(), &e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    fn assert_cors(response: &Response<Full<Bytes>>) {
        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(headers["access-control-allow-methods"], "GET, POST, OPTIONS");
        assert_eq!(headers["access-control-allow-headers"], "Content-Type");
    }

    async fn body_bytes(response: Response<Full<Bytes>>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_every_builder_sets_cors() {
        let responses = vec![
            build_file_response(b"abc".to_vec(), "image/png"),
            build_404_response(),
            build_405_response(),
            build_500_response(),
            build_options_response(),
            build_json_response(StatusCode::BAD_REQUEST, &serde_json::json!({"a": 1})),
        ];
        for response in &responses {
            assert_cors(response);
        }
    }

    #[tokio::test]
    async fn test_plain_text_bodies() {
        let response = build_404_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["content-type"], "text/plain");
        assert_eq!(body_bytes(response).await, "404 Not Found");

        let response = build_500_response();
        assert_eq!(body_bytes(response).await, "500 Internal Server Error");

        let response = build_405_response();
        assert_eq!(response.headers()["allow"], ALLOWED_METHODS);
    }

    #[tokio::test]
    async fn test_rejected_header_still_gets_cors() {
        // a control character makes the builder refuse the Content-Type
        let response = build_file_response(b"abc".to_vec(), "image/png\n");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_cors(&response);
        assert_eq!(response.headers()["content-type"], "text/plain");
        assert_eq!(body_bytes(response).await, "500 Internal Server Error");
    }

    #[tokio::test]
    async fn test_options_is_empty_200() {
        let response = build_options_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_json_response() {
        let response = build_json_response(StatusCode::OK, &serde_json::json!({"status": "ok"}));
        assert_eq!(response.headers()["content-type"], "application/json");
        assert_eq!(body_bytes(response).await, r#"{"status":"ok"}"#);
    }
}
