//! Request handler module
//!
//! Responsible for request routing dispatch and business logic processing:
//! static files, stored images and uploads.

pub mod router;
pub mod static_files;
pub mod upload;

// Re-export main entry point
pub use router::handle_request;
