//! HTTP protocol layer module
//!
//! Content-Type lookup and response builders, decoupled from routing and
//! the upload pipeline.

pub mod mime;
pub mod response;

// Re-export commonly used builders
pub use response::{
    build_404_response, build_405_response, build_500_response, build_file_response,
    build_json_response, build_options_response,
};
