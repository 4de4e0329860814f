//! Upload pipeline
//!
//! Multipart parsing, validation and storage of uploaded images. Nothing in
//! here knows about HTTP; the handler layer drives these pieces in order.

pub mod multipart;
pub mod result;
pub mod storage;
pub mod validator;

pub use multipart::{boundary_from_content_type, MultipartParser};
pub use result::UploadResult;
pub use storage::{StorageError, StorageWriter};
pub use validator::{Rejection, UploadValidator};
