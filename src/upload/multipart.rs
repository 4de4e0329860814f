//! Multipart body parsing
//!
//! A small two-stage tokenizer for `multipart/form-data` bodies: the body is
//! first split on the `--{boundary}` delimiter, then each segment is split
//! into its header block and content at the first blank line.
//!
//! Only what a single-image upload form needs is supported. There is no
//! `Content-Transfer-Encoding` decoding and nested multipart bodies are not
//! recognised.

use thiserror::Error;

const FILENAME_MARKER: &[u8] = b"filename=\"";
const HEADER_SEPARATOR: &[u8] = b"\r\n\r\n";
const CRLF: &[u8] = b"\r\n";

/// Reasons a body yields no usable file part
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MultipartError {
    #[error("no part carries a filename")]
    NoFilePart,
    #[error("file part has no blank line between headers and content")]
    MissingHeaderSeparator,
    #[error("filename header is malformed")]
    MalformedFilename,
    #[error("filename is empty")]
    EmptyFilename,
    #[error("file content is empty")]
    EmptyContent,
}

/// The file extracted from an upload body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFilePart {
    pub original_filename: String,
    pub content: Vec<u8>,
}

/// One segment of a multipart body
#[derive(Debug, PartialEq, Eq)]
pub enum Part<'a> {
    /// A segment with a `filename="` marker
    File(&'a [u8]),
    /// Any other form field
    Field(&'a [u8]),
}

/// Extract the boundary token from a `Content-Type` header value
///
/// Accepts both bare and quoted tokens: `boundary=XYZ`, `boundary="XYZ"`.
pub fn boundary_from_content_type(content_type: &str) -> Option<&str> {
    let (_, rest) = content_type.split_once("boundary=")?;
    let token = rest.split(';').next().unwrap_or_default().trim();
    let token = token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(token);
    (!token.is_empty()).then_some(token)
}

/// Tokenizer bound to one boundary
pub struct MultipartParser {
    delimiter: Vec<u8>,
}

impl MultipartParser {
    pub fn new(boundary: &str) -> Self {
        let mut delimiter = Vec::with_capacity(boundary.len() + 2);
        delimiter.extend_from_slice(b"--");
        delimiter.extend_from_slice(boundary.as_bytes());
        Self { delimiter }
    }

    /// Split a body into its non-empty segments
    ///
    /// The preamble before the first delimiter and the closing `--` epilogue
    /// are dropped.
    pub fn parts<'a>(&self, body: &'a [u8]) -> Vec<Part<'a>> {
        split_on(body, &self.delimiter)
            .into_iter()
            .filter(|segment| !is_filler(segment))
            .map(|segment| {
                if contains(segment, FILENAME_MARKER) {
                    Part::File(segment)
                } else {
                    Part::Field(segment)
                }
            })
            .collect()
    }

    /// Extract the first file part of `body`
    pub fn parse(&self, body: &[u8]) -> Result<ParsedFilePart, MultipartError> {
        let segment = self
            .parts(body)
            .into_iter()
            .find_map(|part| match part {
                Part::File(segment) => Some(segment),
                Part::Field(_) => None,
            })
            .ok_or(MultipartError::NoFilePart)?;

        let split_at =
            find(segment, HEADER_SEPARATOR).ok_or(MultipartError::MissingHeaderSeparator)?;
        let headers = &segment[..split_at];
        let content = strip_delimiter_crlf(&segment[split_at + HEADER_SEPARATOR.len()..]);

        let original_filename = extract_filename(headers)?;
        if content.is_empty() {
            return Err(MultipartError::EmptyContent);
        }

        Ok(ParsedFilePart {
            original_filename,
            content: content.to_vec(),
        })
    }
}

/// The CRLF before a delimiter belongs to the delimiter, not to the content
fn strip_delimiter_crlf(content: &[u8]) -> &[u8] {
    content
        .strip_suffix(b"\r\n--")
        .or_else(|| content.strip_suffix(CRLF))
        .unwrap_or(content)
}

fn extract_filename(headers: &[u8]) -> Result<String, MultipartError> {
    let line = headers
        .split(|&b| b == b'\n')
        .find(|line| contains(line, FILENAME_MARKER))
        .ok_or(MultipartError::MalformedFilename)?;

    let start = find(line, FILENAME_MARKER).ok_or(MultipartError::MalformedFilename)?
        + FILENAME_MARKER.len();
    let rest = &line[start..];
    let end = rest
        .iter()
        .position(|&b| b == b'"')
        .ok_or(MultipartError::MalformedFilename)?;

    let name = std::str::from_utf8(&rest[..end]).map_err(|_| MultipartError::MalformedFilename)?;
    if name.is_empty() {
        return Err(MultipartError::EmptyFilename);
    }
    Ok(name.to_string())
}

/// Preamble CRLFs and the `--\r\n` closing marker carry no data
fn is_filler(segment: &[u8]) -> bool {
    segment
        .iter()
        .all(|b| matches!(b, b'\r' | b'\n' | b'-' | b' ' | b'\t'))
}

fn split_on<'a>(haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut segments = Vec::new();
    let mut rest = haystack;
    while let Some(pos) = find(rest, needle) {
        segments.push(&rest[..pos]);
        rest = &rest[pos + needle.len()..];
    }
    segments.push(rest);
    segments
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    find(haystack, needle).is_some()
}
