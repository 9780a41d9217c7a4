//! HTTP protocol layer module
//!
//! Response builders and the shared body type, decoupled from routing.

pub mod response;

// Re-export commonly used types
pub use response::{
    build_404_response, build_405_response, build_413_response, build_file_response,
    build_health_response, build_html_response, build_options_response, error_response,
    json_response, RelayBody,
};
