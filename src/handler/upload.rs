//! `POST /upload` handling
//!
//! Drives the upload pipeline: declared size check, body read, multipart
//! parse, validation, storage. Every exit is logged with an `Action:` tag
//! and answered with a JSON [`UploadResult`].

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{HeaderMap, Request, Response, StatusCode};
use thiserror::Error;

use crate::config::AppState;
use crate::http;
use crate::logger::{self, Level};
use crate::upload::{
    boundary_from_content_type, result::FAILURE_MESSAGE, MultipartParser, Rejection,
    StorageError, UploadResult,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Everything that can end an upload early
#[derive(Debug, Error)]
pub enum UploadFailure {
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error("failed to read request body: {0}")]
    Body(BoxError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl UploadFailure {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Rejected(_) => StatusCode::BAD_REQUEST,
            Self::Body(_) | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show the client
    pub fn client_message(&self) -> String {
        match self {
            Self::Rejected(rejection) => rejection.to_string(),
            Self::Body(_) | Self::Storage(_) => FAILURE_MESSAGE.to_string(),
        }
    }
}

/// Handle an upload request and build the JSON response
pub async fn handle_upload<B>(req: Request<B>, state: &AppState) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    match process_upload(req, state).await {
        Ok(result) => http::build_json_response(StatusCode::OK, &result),
        Err(failure) => {
            match &failure {
                UploadFailure::Rejected(rejection) => logger::log_action(
                    Level::Warn,
                    &format!("upload rejected - {}", rejection.log_detail()),
                ),
                UploadFailure::Body(_) | UploadFailure::Storage(_) => {
                    logger::log_action(
                        Level::Error,
                        &format!("upload failed - {failure}"),
                    );
                }
            }
            http::build_json_response(
                failure.status(),
                &UploadResult::error(failure.client_message()),
            )
        }
    }
}

async fn process_upload<B>(req: Request<B>, state: &AppState) -> Result<UploadResult, UploadFailure>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let validator = &state.validator;

    // Reject on the declared length before touching the body
    let content_length = declared_length(req.headers())?;
    validator.check_declared_size(content_length)?;

    let boundary = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(boundary_from_content_type)
        .map(ToString::to_string)
        .ok_or(Rejection::Malformed("missing multipart boundary"))?;

    let body = read_body(req.into_body(), validator.max_file_size()).await?;

    let parsed = MultipartParser::new(&boundary).parse(&body);
    if let Err(e) = &parsed {
        logger::log_debug(&format!("No file part in upload body: {e}"));
    }
    let file = parsed.ok();
    let extension = validator.validate(content_length, file.as_ref())?;
    let Some(file) = file else {
        return Err(Rejection::NoFile.into());
    };

    let stored = state.storage.store(file.content, &extension).await?;

    logger::log_debug(&format!("Upload written to {}", stored.path.display()));
    logger::log_action(
        Level::Info,
        &format!(
            "image '{}' (stored as '{}') uploaded successfully. URL: {}",
            file.original_filename,
            stored.filename,
            stored.url()
        ),
    );
    Ok(UploadResult::success(&stored, &file.original_filename))
}

/// Declared `Content-Length`; absent counts as zero
fn declared_length(headers: &HeaderMap) -> Result<u64, Rejection> {
    headers.get(CONTENT_LENGTH).map_or(Ok(0), |value| {
        value
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .ok_or(Rejection::Malformed("invalid Content-Length"))
    })
}

/// Read the whole body, refusing to buffer more than `limit` bytes
///
/// The declared length is only a claim; this caps what is actually read.
async fn read_body<B>(body: B, limit: u64) -> Result<Bytes, UploadFailure>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let cap = usize::try_from(limit).unwrap_or(usize::MAX);
    match Limited::new(body, cap).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(UploadFailure::Rejected(Rejection::SizeExceeded {
                declared: limit.saturating_add(1),
                limit,
            }))
        }
        Err(e) => Err(UploadFailure::Body(e)),
    }
}
